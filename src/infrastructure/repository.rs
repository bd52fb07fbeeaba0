use crate::domain::{Account, GeneratedImage, ImageFormat, Purchase, PurchaseAttempt, ShotType};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    #[must_use]
    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn get_by_external_id(&self, external_id: &str) -> Result<Account, RepositoryError>;
    #[must_use]
    async fn get_by_referral_code(&self, code: &str) -> Result<Account, RepositoryError>;
    /// Atomic decrement-with-floor: debits `amount` only when the balance
    /// covers it, returning whether a row was updated. The balance can never
    /// go negative through this path.
    #[must_use]
    async fn try_debit(&self, id: Uuid, amount: i32) -> Result<bool, RepositoryError>;
    /// Atomic free-slot claim with lazy daily reset: bumps the counter when
    /// the stored date matches `today`, otherwise restarts it at 1. Fails
    /// (returns false) only when today's counter already hit `daily_limit`.
    #[must_use]
    async fn use_free_slot(
        &self,
        id: Uuid,
        today: NaiveDate,
        daily_limit: i32,
    ) -> Result<bool, RepositoryError>;
    /// Credits the account and returns the new balance.
    #[must_use]
    async fn add_credits(&self, id: Uuid, amount: i32) -> Result<i32, RepositoryError>;
    /// Links a referrer and grants the signup-side +1 credit, but only when
    /// the account has no referrer yet. Returns whether the link happened.
    #[must_use]
    async fn link_referrer(&self, id: Uuid, referrer: Uuid) -> Result<bool, RepositoryError>;
    #[must_use]
    async fn set_subscription(
        &self,
        id: Uuid,
        is_premium: bool,
        subscription_id: Option<String>,
        status: Option<String>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;
}

/// Row subset used by the public gallery listing.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub id: Uuid,
    pub public_url: String,
    pub theme: String,
    pub created_at: DateTime<Utc>,
}

/// Row subset the sweeper needs to delete an expired result.
#[derive(Debug, Clone)]
pub struct ExpiredImage {
    pub id: Uuid,
    pub storage_path: String,
}

#[async_trait]
pub trait ImageRepository: Send + Sync {
    #[must_use]
    async fn create(&self, image: &GeneratedImage) -> Result<(), RepositoryError>;
    #[must_use]
    async fn get_by_id(&self, id: Uuid) -> Result<GeneratedImage, RepositoryError>;
    #[must_use]
    async fn list_public(&self, limit: i64) -> Result<Vec<GalleryEntry>, RepositoryError>;
    /// Flips visibility to public. Returns true only on the first flip, which
    /// is what gates the share bonus.
    #[must_use]
    async fn mark_public(&self, id: Uuid) -> Result<bool, RepositoryError>;
    #[must_use]
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredImage>, RepositoryError>;
    #[must_use]
    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait PurchaseRepository: Send + Sync {
    /// Appends an attempt row. For `gifted` attempts the partial unique index
    /// makes the insert a no-op on a second claim; the return value says
    /// whether the row actually landed.
    #[must_use]
    async fn record_attempt(&self, attempt: &PurchaseAttempt) -> Result<bool, RepositoryError>;
    #[must_use]
    async fn record_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError>;
    /// Registers a provider event id, returning false when it was already
    /// seen. Callers must skip all side effects on false.
    #[must_use]
    async fn register_webhook_event(&self, event_id: &str) -> Result<bool, RepositoryError>;
}

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ACCOUNT_COLUMNS: &str = r#"
    id, external_id, email, display_name, credits, daily_free_used,
    daily_free_date, is_admin, is_premium, subscription_id,
    subscription_status, subscription_ends_at, referral_code, referred_by,
    created_at, updated_at
"#;

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, external_id, email, display_name, credits,
                                  daily_free_used, daily_free_date, is_admin, is_premium,
                                  subscription_id, subscription_status, subscription_ends_at,
                                  referral_code, referred_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(account.id)
        .bind(&account.external_id)
        .bind(&account.email)
        .bind(&account.display_name)
        .bind(account.credits)
        .bind(account.daily_free_used)
        .bind(account.daily_free_date)
        .bind(account.is_admin)
        .bind(account.is_premium)
        .bind(&account.subscription_id)
        .bind(&account.subscription_status)
        .bind(account.subscription_ends_at)
        .bind(&account.referral_code)
        .bind(account.referred_by)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Account {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_account(&row)
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Account, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE external_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(external_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                RepositoryError::NotFound(format!("Account {}", external_id))
            }
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_account(&row)
    }

    async fn get_by_referral_code(&self, code: &str) -> Result<Account, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE referral_code = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                RepositoryError::NotFound(format!("Referral code {}", code))
            }
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_account(&row)
    }

    async fn try_debit(&self, id: Uuid, amount: i32) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET credits = credits - $2, updated_at = $3
            WHERE id = $1 AND credits >= $2
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn use_free_slot(
        &self,
        id: Uuid,
        today: NaiveDate,
        daily_limit: i32,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET daily_free_used = CASE
                    WHEN daily_free_date = $2 THEN daily_free_used + 1
                    ELSE 1
                END,
                daily_free_date = $2,
                updated_at = $3
            WHERE id = $1
              AND (daily_free_date IS DISTINCT FROM $2 OR daily_free_used < $4)
            "#,
        )
        .bind(id)
        .bind(today)
        .bind(Utc::now())
        .bind(daily_limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn add_credits(&self, id: Uuid, amount: i32) -> Result<i32, RepositoryError> {
        let new_balance: i32 = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET credits = credits + $2, updated_at = $3
            WHERE id = $1
            RETURNING credits
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Account {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        Ok(new_balance)
    }

    async fn link_referrer(&self, id: Uuid, referrer: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET referred_by = $2, credits = credits + 1, updated_at = $3
            WHERE id = $1 AND referred_by IS NULL
            "#,
        )
        .bind(id)
        .bind(referrer)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn set_subscription(
        &self,
        id: Uuid,
        is_premium: bool,
        subscription_id: Option<String>,
        status: Option<String>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE accounts
            SET is_premium = $2, subscription_id = $3, subscription_status = $4,
                subscription_ends_at = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(is_premium)
        .bind(subscription_id)
        .bind(status)
        .bind(ends_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, RepositoryError> {
    Ok(Account {
        id: row.try_get("id")?,
        external_id: row.try_get("external_id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        credits: row.try_get("credits")?,
        daily_free_used: row.try_get("daily_free_used")?,
        daily_free_date: row.try_get("daily_free_date")?,
        is_admin: row.try_get("is_admin")?,
        is_premium: row.try_get("is_premium")?,
        subscription_id: row.try_get("subscription_id")?,
        subscription_status: row.try_get("subscription_status")?,
        subscription_ends_at: row.try_get("subscription_ends_at")?,
        referral_code: row.try_get("referral_code")?,
        referred_by: row.try_get("referred_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresImageRepository {
    pool: PgPool,
}

impl PostgresImageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ImageRepository for PostgresImageRepository {
    async fn create(&self, image: &GeneratedImage) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO generated_images (id, account_id, storage_path, public_url, prompt,
                                          theme, format, shot_type, is_public, is_free_tier,
                                          credits_used, expires_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(image.id)
        .bind(image.account_id)
        .bind(&image.storage_path)
        .bind(&image.public_url)
        .bind(&image.prompt)
        .bind(&image.theme)
        .bind(image.format.to_string())
        .bind(image.shot_type.to_string())
        .bind(image.is_public)
        .bind(image.is_free_tier)
        .bind(image.credits_used)
        .bind(image.expires_at)
        .bind(image.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<GeneratedImage, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, account_id, storage_path, public_url, prompt, theme, format,
                   shot_type, is_public, is_free_tier, credits_used, expires_at, created_at
            FROM generated_images
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Image {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_image(&row)
    }

    async fn list_public(&self, limit: i64) -> Result<Vec<GalleryEntry>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, public_url, theme, created_at
            FROM generated_images
            WHERE is_public
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(GalleryEntry {
                    id: row.try_get("id")?,
                    public_url: row.try_get("public_url")?,
                    theme: row.try_get("theme")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn mark_public(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE generated_images
            SET is_public = TRUE
            WHERE id = $1 AND is_public = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredImage>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, storage_path
            FROM generated_images
            WHERE expires_at IS NOT NULL AND expires_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(ExpiredImage {
                    id: row.try_get("id")?,
                    storage_path: row.try_get("storage_path")?,
                })
            })
            .collect()
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM generated_images WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn row_to_image(row: &sqlx::postgres::PgRow) -> Result<GeneratedImage, RepositoryError> {
    let format_str: String = row.try_get("format")?;
    let shot_str: String = row.try_get("shot_type")?;

    Ok(GeneratedImage {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        storage_path: row.try_get("storage_path")?,
        public_url: row.try_get("public_url")?,
        prompt: row.try_get("prompt")?,
        theme: row.try_get("theme")?,
        format: ImageFormat::from_str(&format_str).map_err(|_| {
            RepositoryError::InvalidData(format!("Unknown format: {}", format_str))
        })?,
        shot_type: ShotType::from_str(&shot_str)
            .map_err(|_| RepositoryError::InvalidData(format!("Unknown shot type: {}", shot_str)))?,
        is_public: row.try_get("is_public")?,
        is_free_tier: row.try_get("is_free_tier")?,
        credits_used: row.try_get("credits_used")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
    })
}

pub struct PostgresPurchaseRepository {
    pool: PgPool,
}

impl PostgresPurchaseRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseRepository for PostgresPurchaseRepository {
    async fn record_attempt(&self, attempt: &PurchaseAttempt) -> Result<bool, RepositoryError> {
        // ON CONFLICT DO NOTHING covers the partial unique index on
        // (account_id) WHERE status = 'gifted'.
        let result = sqlx::query(
            r#"
            INSERT INTO purchase_attempts (id, account_id, package_id, status,
                                           credits_amount, user_agent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(attempt.id)
        .bind(attempt.account_id)
        .bind(&attempt.package_id)
        .bind(attempt.status.to_string())
        .bind(attempt.credits_amount)
        .bind(&attempt.user_agent)
        .bind(attempt.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO purchases (id, account_id, order_id, package_id,
                                   credits_added, amount_cents, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(purchase.id)
        .bind(purchase.account_id)
        .bind(&purchase.order_id)
        .bind(&purchase.package_id)
        .bind(purchase.credits_added)
        .bind(purchase.amount_cents)
        .bind(purchase.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn register_webhook_event(&self, event_id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (event_id, received_at)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
