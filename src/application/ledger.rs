use crate::domain::{Account, CreditPackage, ImageFormat, PurchaseAttempt, ShotType, Theme};
use crate::infrastructure::repository::{
    AccountRepository, PurchaseRepository, RepositoryError,
};
use chrono::NaiveDate;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Not enough credits")]
    NeedsCredits,
    #[error("Daily free limit reached")]
    FreeLimitReached,
    #[error("Unknown package: {0}")]
    UnknownPackage(String),
}

/// How a generation will be paid for. Decided by `evaluate`, settled by
/// `commit` after the provider call succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entitlement {
    FreeSlot,
    Paid,
}

#[derive(Debug, Clone)]
pub struct GiftOutcome {
    pub granted: bool,
    pub new_credits: i32,
    pub message: &'static str,
}

/// Credit and free-slot accounting for accounts. The ledger never mutates a
/// balance speculatively: `evaluate` is an advisory read, and every write goes
/// through a conditional update that is checked for effect, so concurrent
/// requests cannot drive a balance negative or double-spend a free slot.
pub struct EntitlementLedger<A: AccountRepository, P: PurchaseRepository> {
    accounts: Arc<A>,
    purchases: Arc<P>,
    daily_free_limit: i32,
}

impl<A: AccountRepository, P: PurchaseRepository> EntitlementLedger<A, P> {
    pub fn new(accounts: Arc<A>, purchases: Arc<P>, daily_free_limit: i32) -> Self {
        Self {
            accounts,
            purchases,
            daily_free_limit,
        }
    }

    /// Looks up the account for an auth-provider subject, creating a fresh
    /// zero-balance profile on first sign-in.
    pub async fn ensure_account(
        &self,
        external_id: &str,
        email: &str,
        display_name: Option<String>,
    ) -> Result<Account, LedgerError> {
        match self.accounts.get_by_external_id(external_id).await {
            Ok(account) => Ok(account),
            Err(RepositoryError::NotFound(_)) => {
                let account =
                    Account::new(external_id.to_string(), email.to_string(), display_name);
                self.accounts.create(&account).await?;
                info!(account_id = %account.id, "Created account");
                Ok(account)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Advisory pre-check run before paying for a provider call. Only the
    /// free combination (free theme, default format and framing) can take a
    /// free slot, and only while one remains for `today`; anything premium,
    /// or a free combo past the daily limit, needs a credit.
    pub fn evaluate(
        &self,
        account: &Account,
        theme: &Theme,
        format: ImageFormat,
        shot_type: ShotType,
        today: NaiveDate,
    ) -> Result<Entitlement, LedgerError> {
        let free_combo = theme.is_free()
            && format == ImageFormat::default()
            && shot_type == ShotType::default();
        if free_combo && account.free_slots_remaining(today, self.daily_free_limit) > 0 {
            return Ok(Entitlement::FreeSlot);
        }

        if account.credits >= 1 {
            return Ok(Entitlement::Paid);
        }

        Err(LedgerError::NeedsCredits)
    }

    /// Settles an entitlement with an atomic conditional write. Runs only
    /// after the provider produced a result; a `false` from the conditional
    /// update means another request won the race, and surfaces as the same
    /// entitlement error the caller would have seen up front.
    pub async fn commit(
        &self,
        account_id: Uuid,
        entitlement: Entitlement,
        today: NaiveDate,
    ) -> Result<(), LedgerError> {
        match entitlement {
            Entitlement::FreeSlot => {
                let claimed = self
                    .accounts
                    .use_free_slot(account_id, today, self.daily_free_limit)
                    .await?;
                if !claimed {
                    warn!(%account_id, "Free slot lost to a concurrent request");
                    return Err(LedgerError::FreeLimitReached);
                }
            }
            Entitlement::Paid => {
                let debited = self.accounts.try_debit(account_id, 1).await?;
                if !debited {
                    warn!(%account_id, "Debit lost to a concurrent request");
                    return Err(LedgerError::NeedsCredits);
                }
            }
        }

        Ok(())
    }

    /// One-shot welcome gift. The gifted attempt row is inserted before any
    /// credits move; when the partial unique index rejects it the claim has
    /// already happened, and only an audit row is appended.
    pub async fn grant_gift(
        &self,
        account_id: Uuid,
        package_id: &str,
        user_agent: Option<String>,
    ) -> Result<GiftOutcome, LedgerError> {
        let package = CreditPackage::find(package_id)
            .ok_or_else(|| LedgerError::UnknownPackage(package_id.to_string()))?;

        let attempt = PurchaseAttempt::gifted(
            account_id,
            package.id.to_string(),
            package.credits,
            user_agent.clone(),
        );

        if !self.purchases.record_attempt(&attempt).await? {
            let repeat =
                PurchaseAttempt::already_claimed(account_id, package.id.to_string(), user_agent);
            if let Err(e) = self.purchases.record_attempt(&repeat).await {
                warn!(%account_id, error = %e, "Failed to record repeat gift attempt");
            }

            let account = self.accounts.get_by_id(account_id).await?;
            info!(%account_id, "Gift already claimed");
            return Ok(GiftOutcome {
                granted: false,
                new_credits: account.credits,
                message: "Gift already claimed",
            });
        }

        let new_credits = self.accounts.add_credits(account_id, package.credits).await?;
        info!(%account_id, credits = package.credits, "Gift granted");

        Ok(GiftOutcome {
            granted: true,
            new_credits,
            message: "Gift granted",
        })
    }

    /// Applies a referral code to a freshly signed-up account: +1 to the new
    /// account and +1 to the referrer, once. Bad codes and self-referrals are
    /// silently ignored so a stale cookie never breaks sign-in.
    pub async fn apply_referral_bonus(
        &self,
        account_id: Uuid,
        code: &str,
    ) -> Result<bool, LedgerError> {
        let referrer = match self.accounts.get_by_referral_code(code).await {
            Ok(account) => account,
            Err(RepositoryError::NotFound(_)) => {
                info!(%account_id, code, "Ignoring unknown referral code");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        if referrer.id == account_id {
            info!(%account_id, "Ignoring self-referral");
            return Ok(false);
        }

        if !self.accounts.link_referrer(account_id, referrer.id).await? {
            return Ok(false);
        }

        self.accounts.add_credits(referrer.id, 1).await?;
        info!(%account_id, referrer_id = %referrer.id, "Referral bonus applied");

        Ok(true)
    }

    /// +1 credit for sharing a result to the public gallery. The caller gates
    /// this on the first visibility flip.
    pub async fn grant_gallery_share_bonus(
        &self,
        account_id: Uuid,
    ) -> Result<i32, LedgerError> {
        let new_credits = self.accounts.add_credits(account_id, 1).await?;
        info!(%account_id, "Gallery share bonus applied");
        Ok(new_credits)
    }
}
