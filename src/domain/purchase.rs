use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

/// Outcome recorded for a gift-claim attempt. Append-only; the partial unique
/// index on (account_id, status = 'gifted') is what makes claims one-shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AttemptStatus {
    Gifted,
    AlreadyClaimed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseAttempt {
    pub id: Uuid,
    pub account_id: Uuid,
    pub package_id: String,
    pub status: AttemptStatus,
    pub credits_amount: i32,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PurchaseAttempt {
    pub fn gifted(
        account_id: Uuid,
        package_id: String,
        credits_amount: i32,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            package_id,
            status: AttemptStatus::Gifted,
            credits_amount,
            user_agent,
            created_at: Utc::now(),
        }
    }

    pub fn already_claimed(
        account_id: Uuid,
        package_id: String,
        user_agent: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            package_id,
            status: AttemptStatus::AlreadyClaimed,
            credits_amount: 0,
            user_agent,
            created_at: Utc::now(),
        }
    }
}

/// A completed paid order, written only by the verified webhook path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Purchase {
    pub id: Uuid,
    pub account_id: Uuid,
    pub order_id: String,
    pub package_id: Option<String>,
    pub credits_added: i32,
    pub amount_cents: i64,
    pub created_at: DateTime<Utc>,
}

impl Purchase {
    pub fn new(
        account_id: Uuid,
        order_id: String,
        package_id: Option<String>,
        credits_added: i32,
        amount_cents: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            order_id,
            package_id,
            credits_added,
            amount_cents,
            created_at: Utc::now(),
        }
    }
}
