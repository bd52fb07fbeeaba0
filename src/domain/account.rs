use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user profile row. `credits` is the purchased/bonus balance and must never
/// go negative; `daily_free_used` counts free-slot generations for
/// `daily_free_date` and is lazily reset on the first use of a new UTC day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub credits: i32,
    pub daily_free_used: i32,
    pub daily_free_date: Option<NaiveDate>,
    pub is_admin: bool,
    pub is_premium: bool,
    pub subscription_id: Option<String>,
    pub subscription_status: Option<String>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub referral_code: String,
    pub referred_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Fresh zero-balance profile, created on first sign-in.
    pub fn new(external_id: String, email: String, display_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id,
            email,
            display_name,
            credits: 0,
            daily_free_used: 0,
            daily_free_date: None,
            is_admin: false,
            is_premium: false,
            subscription_id: None,
            subscription_status: None,
            subscription_ends_at: None,
            referral_code: generate_referral_code(),
            referred_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// How many free-slot generations remain for `today`. The stored counter
    /// only applies when its date matches; a stale date means a full allowance.
    pub fn free_slots_remaining(&self, today: NaiveDate, daily_limit: i32) -> i32 {
        match self.daily_free_date {
            Some(date) if date == today => (daily_limit - self.daily_free_used).max(0),
            _ => daily_limit,
        }
    }
}

const REFERRAL_CODE_LEN: usize = 8;
const REFERRAL_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Short shareable code, unambiguous alphabet (no 0/O, 1/I).
pub fn generate_referral_code() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERRAL_CODE_LEN)
        .map(|_| REFERRAL_ALPHABET[rng.gen_range(0..REFERRAL_ALPHABET.len())] as char)
        .collect()
}
