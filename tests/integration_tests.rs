//! Integration tests for dearmykids: account ledger semantics, generation
//! orchestration, gift/referral bonuses, webhook settlement, gallery sharing,
//! and retention sweeps.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dearmykids::{
    application::{
        AccountRequest, CheckoutSelection, EntitlementLedger, Entitlement, GalleryError,
        GalleryService, GenerationError, GenerationService, GuestRequest, ImageSource,
        LedgerError, MonetizationError, MonetizationService, RetentionService, VariantMap,
        WebhookOutcome,
    },
    domain::{
        Account, AttemptStatus, GeneratedImage, ImageFormat, PremiumPlan, Purchase,
        PurchaseAttempt, ShotType, Theme, FREE_DAILY_LIMIT,
    },
    infrastructure::{
        sign_webhook, AccountRepository, ExpiredImage, GalleryEntry, ImageProvider,
        ImageProviderError, ImageRepository, PaymentsClient, PortraitStore, PurchaseRepository,
        RepositoryError, StorageError,
    },
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ============================================================================
// Mock Repositories for Testing
// ============================================================================

/// In-memory mock implementation of AccountRepository with the same
/// conditional-update semantics as the Postgres implementation.
#[derive(Clone, Default)]
struct MockAccountRepository {
    accounts: Arc<Mutex<HashMap<Uuid, Account>>>,
}

impl MockAccountRepository {
    fn seed(&self, credits: i32) -> Account {
        let mut account = Account::new(
            format!("ext-{}", Uuid::new_v4()),
            "parent@example.com".to_string(),
            None,
        );
        account.credits = credits;
        self.accounts
            .lock()
            .unwrap()
            .insert(account.id, account.clone());
        account
    }

    fn credits_of(&self, id: Uuid) -> i32 {
        self.accounts.lock().unwrap().get(&id).unwrap().credits
    }
}

#[async_trait]
impl AccountRepository for MockAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(&account.id) {
            return Err(RepositoryError::InvalidData(
                "Account already exists".to_string(),
            ));
        }
        accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        self.accounts
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))
    }

    async fn get_by_external_id(&self, external_id: &str) -> Result<Account, RepositoryError> {
        self.accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.external_id == external_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", external_id)))
    }

    async fn get_by_referral_code(&self, code: &str) -> Result<Account, RepositoryError> {
        self.accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.referral_code == code)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Referral code {}", code)))
    }

    async fn try_debit(&self, id: Uuid, amount: i32) -> Result<bool, RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        if account.credits < amount {
            return Ok(false);
        }
        account.credits -= amount;
        Ok(true)
    }

    async fn use_free_slot(
        &self,
        id: Uuid,
        today: NaiveDate,
        daily_limit: i32,
    ) -> Result<bool, RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;

        let same_day = account.daily_free_date == Some(today);
        if same_day && account.daily_free_used >= daily_limit {
            return Ok(false);
        }
        account.daily_free_used = if same_day {
            account.daily_free_used + 1
        } else {
            1
        };
        account.daily_free_date = Some(today);
        Ok(true)
    }

    async fn add_credits(&self, id: Uuid, amount: i32) -> Result<i32, RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        account.credits += amount;
        Ok(account.credits)
    }

    async fn link_referrer(&self, id: Uuid, referrer: Uuid) -> Result<bool, RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        if account.referred_by.is_some() {
            return Ok(false);
        }
        account.referred_by = Some(referrer);
        account.credits += 1;
        Ok(true)
    }

    async fn set_subscription(
        &self,
        id: Uuid,
        is_premium: bool,
        subscription_id: Option<String>,
        status: Option<String>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        account.is_premium = is_premium;
        account.subscription_id = subscription_id;
        account.subscription_status = status;
        account.subscription_ends_at = ends_at;
        Ok(())
    }
}

/// In-memory mock implementation of ImageRepository
#[derive(Clone, Default)]
struct MockImageRepository {
    images: Arc<Mutex<HashMap<Uuid, GeneratedImage>>>,
}

#[async_trait]
impl ImageRepository for MockImageRepository {
    async fn create(&self, image: &GeneratedImage) -> Result<(), RepositoryError> {
        self.images.lock().unwrap().insert(image.id, image.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<GeneratedImage, RepositoryError> {
        self.images
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Image {}", id)))
    }

    async fn list_public(&self, limit: i64) -> Result<Vec<GalleryEntry>, RepositoryError> {
        let images = self.images.lock().unwrap();
        let mut public: Vec<_> = images.values().filter(|i| i.is_public).collect();
        public.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(public
            .into_iter()
            .take(limit as usize)
            .map(|i| GalleryEntry {
                id: i.id,
                public_url: i.public_url.clone(),
                theme: i.theme.clone(),
                created_at: i.created_at,
            })
            .collect())
    }

    async fn mark_public(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let mut images = self.images.lock().unwrap();
        let image = images
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Image {}", id)))?;
        if image.is_public {
            return Ok(false);
        }
        image.is_public = true;
        Ok(true)
    }

    async fn list_expired(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExpiredImage>, RepositoryError> {
        let images = self.images.lock().unwrap();
        Ok(images
            .values()
            .filter(|i| i.expires_at.is_some_and(|at| at <= now))
            .map(|i| ExpiredImage {
                id: i.id,
                storage_path: i.storage_path.clone(),
            })
            .collect())
    }

    async fn delete_batch(&self, ids: &[Uuid]) -> Result<u64, RepositoryError> {
        let mut images = self.images.lock().unwrap();
        let before = images.len();
        for id in ids {
            images.remove(id);
        }
        Ok((before - images.len()) as u64)
    }
}

/// In-memory mock implementation of PurchaseRepository
#[derive(Clone, Default)]
struct MockPurchaseRepository {
    attempts: Arc<Mutex<Vec<PurchaseAttempt>>>,
    gifted: Arc<Mutex<HashSet<Uuid>>>,
    purchases: Arc<Mutex<Vec<Purchase>>>,
    events: Arc<Mutex<HashSet<String>>>,
}

#[async_trait]
impl PurchaseRepository for MockPurchaseRepository {
    async fn record_attempt(&self, attempt: &PurchaseAttempt) -> Result<bool, RepositoryError> {
        if attempt.status == AttemptStatus::Gifted {
            let mut gifted = self.gifted.lock().unwrap();
            if !gifted.insert(attempt.account_id) {
                return Ok(false);
            }
        }
        self.attempts.lock().unwrap().push(attempt.clone());
        Ok(true)
    }

    async fn record_purchase(&self, purchase: &Purchase) -> Result<(), RepositoryError> {
        self.purchases.lock().unwrap().push(purchase.clone());
        Ok(())
    }

    async fn register_webhook_event(&self, event_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.events.lock().unwrap().insert(event_id.to_string()))
    }
}

/// Mock provider returning a fixed JPEG payload, or failing on demand.
#[derive(Clone, Default)]
struct MockImageProvider {
    fail: Arc<Mutex<bool>>,
    calls: Arc<Mutex<u32>>,
}

#[async_trait]
impl ImageProvider for MockImageProvider {
    async fn edit_portrait(
        &self,
        _image_base64: &str,
        _instruction: &str,
    ) -> Result<Vec<u8>, ImageProviderError> {
        *self.calls.lock().unwrap() += 1;
        if *self.fail.lock().unwrap() {
            return Err(ImageProviderError::EmptyPayload);
        }
        Ok(vec![0xFF, 0xD8, 0xFF, 0xD9])
    }
}

/// Mock store keeping uploads in memory.
#[derive(Clone, Default)]
struct MockPortraitStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    fail_delete: Arc<Mutex<bool>>,
}

#[async_trait]
impl PortraitStore for MockPortraitStore {
    async fn put_jpeg(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        self.objects.lock().unwrap().insert(key.to_string(), bytes);
        Ok(format!("https://cdn.test/{}", key))
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::DownloadFailed(format!("No such object: {}", key)))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        if *self.fail_delete.lock().unwrap() {
            return Err(StorageError::DeleteFailed("unavailable".to_string()));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Test fixtures
// ============================================================================

struct Fixture {
    accounts: Arc<MockAccountRepository>,
    images: Arc<MockImageRepository>,
    purchases: Arc<MockPurchaseRepository>,
    provider: Arc<MockImageProvider>,
    store: Arc<MockPortraitStore>,
    ledger: Arc<EntitlementLedger<MockAccountRepository, MockPurchaseRepository>>,
    generation: GenerationService<
        MockAccountRepository,
        MockPurchaseRepository,
        MockImageRepository,
        MockImageProvider,
        MockPortraitStore,
    >,
}

fn fixture() -> Fixture {
    let accounts = Arc::new(MockAccountRepository::default());
    let images = Arc::new(MockImageRepository::default());
    let purchases = Arc::new(MockPurchaseRepository::default());
    let provider = Arc::new(MockImageProvider::default());
    let store = Arc::new(MockPortraitStore::default());

    let ledger = Arc::new(EntitlementLedger::new(
        accounts.clone(),
        purchases.clone(),
        FREE_DAILY_LIMIT,
    ));
    let generation = GenerationService::new(
        accounts.clone(),
        images.clone(),
        ledger.clone(),
        provider.clone(),
        store.clone(),
    );

    Fixture {
        accounts,
        images,
        purchases,
        provider,
        store,
        ledger,
        generation,
    }
}

fn account_request(account_id: Uuid, theme: Theme) -> AccountRequest {
    AccountRequest {
        account_id,
        source: ImageSource::Base64("aGVsbG8=".to_string()),
        theme,
        format: ImageFormat::default(),
        shot_type: ShotType::default(),
    }
}

// ============================================================================
// Ledger
// ============================================================================

#[tokio::test]
async fn ensure_account_creates_profile_once() {
    let f = fixture();

    let first = f
        .ledger
        .ensure_account("auth0|u1", "u1@example.com", Some("U1".to_string()))
        .await
        .unwrap();
    assert_eq!(first.credits, 0);
    assert!(!first.referral_code.is_empty());

    let second = f
        .ledger
        .ensure_account("auth0|u1", "u1@example.com", None)
        .await
        .unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(f.accounts.accounts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn evaluate_prefers_free_slot_then_credits() {
    let f = fixture();
    let today = Utc::now().date_naive();
    let account = f.accounts.seed(2);

    let free_combo = (ImageFormat::default(), ShotType::default());

    // Free theme, default combo, slot available
    assert_eq!(
        f.ledger
            .evaluate(&account, &Theme::Astronaut, free_combo.0, free_combo.1, today)
            .unwrap(),
        Entitlement::FreeSlot
    );

    // Premium theme always needs a credit
    assert_eq!(
        f.ledger
            .evaluate(&account, &Theme::KpopStar, free_combo.0, free_combo.1, today)
            .unwrap(),
        Entitlement::Paid
    );

    // Premium format breaks the free combo even with a free theme
    assert_eq!(
        f.ledger
            .evaluate(
                &account,
                &Theme::Astronaut,
                ImageFormat::Landscape,
                free_combo.1,
                today
            )
            .unwrap(),
        Entitlement::Paid
    );

    // Slot used up and free combo: falls back to credits
    let mut used = account.clone();
    used.daily_free_used = FREE_DAILY_LIMIT;
    used.daily_free_date = Some(today);
    assert_eq!(
        f.ledger
            .evaluate(&used, &Theme::Astronaut, free_combo.0, free_combo.1, today)
            .unwrap(),
        Entitlement::Paid
    );

    // No slot, no credits
    used.credits = 0;
    assert!(matches!(
        f.ledger
            .evaluate(&used, &Theme::Astronaut, free_combo.0, free_combo.1, today),
        Err(LedgerError::NeedsCredits)
    ));
}

#[tokio::test]
async fn commit_paid_never_drives_balance_negative() {
    let f = fixture();
    let today = Utc::now().date_naive();
    let account = f.accounts.seed(1);

    f.ledger
        .commit(account.id, Entitlement::Paid, today)
        .await
        .unwrap();
    assert_eq!(f.accounts.credits_of(account.id), 0);

    let err = f
        .ledger
        .commit(account.id, Entitlement::Paid, today)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NeedsCredits));
    assert_eq!(f.accounts.credits_of(account.id), 0);
}

#[tokio::test]
async fn free_slot_resets_lazily_on_a_new_day() {
    let f = fixture();
    let account = f.accounts.seed(0);
    let day1 = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
    let day2 = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();

    f.ledger
        .commit(account.id, Entitlement::FreeSlot, day1)
        .await
        .unwrap();
    let err = f
        .ledger
        .commit(account.id, Entitlement::FreeSlot, day1)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::FreeLimitReached));

    // Next day the counter restarts without any background job
    f.ledger
        .commit(account.id, Entitlement::FreeSlot, day2)
        .await
        .unwrap();
}

#[tokio::test]
async fn gift_is_granted_exactly_once() {
    let f = fixture();
    let account = f.accounts.seed(0);

    let first = f
        .ledger
        .grant_gift(account.id, "trial", Some("test-agent".to_string()))
        .await
        .unwrap();
    assert!(first.granted);
    assert_eq!(first.new_credits, 3);

    let second = f
        .ledger
        .grant_gift(account.id, "trial", None)
        .await
        .unwrap();
    assert!(!second.granted);
    assert_eq!(second.new_credits, 3);
    assert_eq!(f.accounts.credits_of(account.id), 3);

    // Both the grant and the repeat attempt are on the audit trail
    assert_eq!(f.purchases.attempts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn gift_rejects_unknown_packages() {
    let f = fixture();
    let account = f.accounts.seed(0);

    let err = f
        .ledger
        .grant_gift(account.id, "mega", None)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::UnknownPackage(_)));
    assert_eq!(f.accounts.credits_of(account.id), 0);
}

#[tokio::test]
async fn referral_credits_both_sides_once() {
    let f = fixture();
    let referrer = f.accounts.seed(0);
    let invitee = f.accounts.seed(0);

    let applied = f
        .ledger
        .apply_referral_bonus(invitee.id, &referrer.referral_code)
        .await
        .unwrap();
    assert!(applied);
    assert_eq!(f.accounts.credits_of(invitee.id), 1);
    assert_eq!(f.accounts.credits_of(referrer.id), 1);

    // Second application is a no-op
    let again = f
        .ledger
        .apply_referral_bonus(invitee.id, &referrer.referral_code)
        .await
        .unwrap();
    assert!(!again);
    assert_eq!(f.accounts.credits_of(invitee.id), 1);
    assert_eq!(f.accounts.credits_of(referrer.id), 1);
}

#[tokio::test]
async fn referral_ignores_unknown_codes_and_self_referral() {
    let f = fixture();
    let account = f.accounts.seed(0);

    assert!(!f
        .ledger
        .apply_referral_bonus(account.id, "NOSUCH99")
        .await
        .unwrap());
    assert!(!f
        .ledger
        .apply_referral_bonus(account.id, &account.referral_code)
        .await
        .unwrap());
    assert_eq!(f.accounts.credits_of(account.id), 0);
}

// ============================================================================
// Generation
// ============================================================================

#[tokio::test]
async fn provider_failure_costs_nothing() {
    let f = fixture();
    let account = f.accounts.seed(1);
    *f.provider.fail.lock().unwrap() = true;

    let err = f
        .generation
        .generate_for_account(account_request(account.id, Theme::KpopStar))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GenerationError::Provider(ImageProviderError::EmptyPayload)
    ));

    assert_eq!(f.accounts.credits_of(account.id), 1);
    assert!(f.images.images.lock().unwrap().is_empty());
    assert!(f.store.objects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn paid_generation_debits_and_stores() {
    let f = fixture();
    let account = f.accounts.seed(2);

    let result = f
        .generation
        .generate_for_account(account_request(account.id, Theme::Chef))
        .await
        .unwrap();

    assert!(!result.is_free_tier);
    assert_eq!(f.accounts.credits_of(account.id), 1);

    let images = f.images.images.lock().unwrap();
    let image = images.get(&result.image_id).unwrap();
    assert!(image
        .storage_path
        .starts_with(&format!("generated/{}/", account.id)));
    assert_eq!(image.credits_used, 1);
    assert_eq!(
        image.expires_at.unwrap(),
        image.created_at + Duration::hours(48)
    );
    assert!(f
        .store
        .objects
        .lock()
        .unwrap()
        .contains_key(&image.storage_path));
}

#[tokio::test]
async fn generation_can_source_from_storage() {
    let f = fixture();
    let account = f.accounts.seed(1);
    f.store
        .objects
        .lock()
        .unwrap()
        .insert("uploads/source.jpg".to_string(), b"hello".to_vec());

    let result = f
        .generation
        .generate_for_account(AccountRequest {
            account_id: account.id,
            source: ImageSource::StoragePath("uploads/source.jpg".to_string()),
            theme: Theme::Chef,
            format: ImageFormat::default(),
            shot_type: ShotType::default(),
        })
        .await
        .unwrap();

    assert!(!result.is_free_tier);
    assert_eq!(f.accounts.credits_of(account.id), 0);

    let err = f
        .generation
        .generate_for_account(AccountRequest {
            account_id: account.id,
            source: ImageSource::StoragePath("uploads/missing.jpg".to_string()),
            theme: Theme::Chef,
            format: ImageFormat::default(),
            shot_type: ShotType::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::Storage(_)));
    // A bad source fails before the ledger is touched.
    assert_eq!(f.accounts.credits_of(account.id), 0);
}

#[tokio::test]
async fn free_generation_uses_slot_not_credits() {
    let f = fixture();
    let account = f.accounts.seed(5);

    let result = f
        .generation
        .generate_for_account(account_request(account.id, Theme::Astronaut))
        .await
        .unwrap();

    assert!(result.is_free_tier);
    assert_eq!(f.accounts.credits_of(account.id), 5);

    let images = f.images.images.lock().unwrap();
    let image = images.get(&result.image_id).unwrap();
    assert_eq!(image.credits_used, 0);
    assert_eq!(
        image.expires_at.unwrap(),
        image.created_at + Duration::hours(2)
    );
}

#[tokio::test]
async fn guest_generation_is_inline_and_free_combo_only() {
    let f = fixture();

    let result = f
        .generation
        .generate_guest(GuestRequest {
            source: ImageSource::Base64("aGVsbG8=".to_string()),
            theme: Theme::Doctor,
            format: ImageFormat::default(),
            shot_type: ShotType::default(),
        })
        .await
        .unwrap();
    assert!(result.data_url.starts_with("data:image/jpeg;base64,"));
    assert!(f.images.images.lock().unwrap().is_empty());
    assert!(f.store.objects.lock().unwrap().is_empty());

    let err = f
        .generation
        .generate_guest(GuestRequest {
            source: ImageSource::Base64("aGVsbG8=".to_string()),
            theme: Theme::KpopStar,
            format: ImageFormat::default(),
            shot_type: ShotType::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::PremiumRequired));

    let err = f
        .generation
        .generate_guest(GuestRequest {
            source: ImageSource::Base64("aGVsbG8=".to_string()),
            theme: Theme::Doctor,
            format: ImageFormat::Landscape,
            shot_type: ShotType::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::PremiumRequired));
}

/// Walkthrough: one credit, premium first, then the free slot, then nothing
/// left.
#[tokio::test]
async fn one_credit_account_walkthrough() {
    let f = fixture();
    let account = f.accounts.seed(1);

    // Premium theme spends the credit
    let paid = f
        .generation
        .generate_for_account(account_request(account.id, Theme::Pilot))
        .await
        .unwrap();
    assert!(!paid.is_free_tier);
    assert_eq!(f.accounts.credits_of(account.id), 0);

    // Free theme still works via the daily slot
    let free = f
        .generation
        .generate_for_account(account_request(account.id, Theme::Astronaut))
        .await
        .unwrap();
    assert!(free.is_free_tier);

    // Nothing left today
    let err = f
        .generation
        .generate_for_account(account_request(account.id, Theme::Astronaut))
        .await
        .unwrap_err();
    assert!(matches!(err, GenerationError::NeedsCredits));
    assert_eq!(*f.provider.calls.lock().unwrap(), 2);
}

// ============================================================================
// Gallery
// ============================================================================

#[tokio::test]
async fn sharing_grants_the_bonus_only_on_the_first_flip() {
    let f = fixture();
    let account = f.accounts.seed(1);
    let gallery = GalleryService::new(f.images.clone(), f.ledger.clone());

    let result = f
        .generation
        .generate_for_account(account_request(account.id, Theme::Artist))
        .await
        .unwrap();
    assert_eq!(f.accounts.credits_of(account.id), 0);

    let first = gallery.share(account.id, result.image_id).await.unwrap();
    assert!(first.shared && first.bonus_granted);
    assert_eq!(f.accounts.credits_of(account.id), 1);

    let second = gallery.share(account.id, result.image_id).await.unwrap();
    assert!(second.shared && !second.bonus_granted);
    assert_eq!(f.accounts.credits_of(account.id), 1);

    let listed = gallery.list_public().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, result.image_id);
}

#[tokio::test]
async fn sharing_someone_elses_image_is_forbidden() {
    let f = fixture();
    let owner = f.accounts.seed(1);
    let other = f.accounts.seed(0);
    let gallery = GalleryService::new(f.images.clone(), f.ledger.clone());

    let result = f
        .generation
        .generate_for_account(account_request(owner.id, Theme::Teacher))
        .await
        .unwrap();

    let err = gallery.share(other.id, result.image_id).await.unwrap_err();
    assert!(matches!(err, GalleryError::NotOwner));
    assert!(gallery.list_public().await.unwrap().is_empty());
}

// ============================================================================
// Retention
// ============================================================================

#[tokio::test]
async fn sweep_removes_only_expired_results() {
    let f = fixture();
    let account = f.accounts.seed(3);
    let retention = RetentionService::new(f.images.clone(), f.store.clone());

    let expired = f
        .generation
        .generate_for_account(account_request(account.id, Theme::Scientist))
        .await
        .unwrap();
    let fresh = f
        .generation
        .generate_for_account(account_request(account.id, Theme::Chef))
        .await
        .unwrap();

    // Past the free-tier deadline but inside the paid one
    let now = Utc::now() + Duration::hours(3);
    let report = retention.sweep(now).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.storage_failures, 0);

    let images = f.images.images.lock().unwrap();
    assert!(!images.contains_key(&expired.image_id));
    assert!(images.contains_key(&fresh.image_id));
    drop(images);

    // Second sweep finds nothing new
    let report = retention.sweep(now).await.unwrap();
    assert_eq!(report.deleted, 0);
}

#[tokio::test]
async fn sweep_still_deletes_rows_when_storage_fails() {
    let f = fixture();
    let account = f.accounts.seed(1);
    let retention = RetentionService::new(f.images.clone(), f.store.clone());

    f.generation
        .generate_for_account(account_request(account.id, Theme::Police))
        .await
        .unwrap();
    *f.store.fail_delete.lock().unwrap() = true;

    let report = retention.sweep(Utc::now() + Duration::hours(72)).await.unwrap();
    assert_eq!(report.deleted, 1);
    assert_eq!(report.storage_failures, 1);
    assert!(f.images.images.lock().unwrap().is_empty());
}

// ============================================================================
// Monetization
// ============================================================================

const WEBHOOK_SECRET: &str = "whsec_test";

fn monetization(
    f: &Fixture,
    variants: VariantMap,
) -> MonetizationService<MockAccountRepository, MockPurchaseRepository> {
    let payments = PaymentsClient::new("test-key".to_string(), "store-1".to_string()).unwrap();
    MonetizationService::new(
        f.accounts.clone(),
        f.purchases.clone(),
        payments,
        WEBHOOK_SECRET.to_string(),
        variants,
        "https://app.test".to_string(),
    )
}

fn order_created_body(account_id: Uuid, order_id: &str, credits: i32) -> Vec<u8> {
    serde_json::json!({
        "meta": {
            "event_name": "order_created",
            "custom_data": {
                "user_id": account_id.to_string(),
                "package_id": "starter",
                "credits": credits.to_string(),
            }
        },
        "data": {
            "id": order_id,
            "attributes": { "total": 599 }
        }
    })
    .to_string()
    .into_bytes()
}

#[tokio::test]
async fn order_webhook_settles_credits_once() {
    let f = fixture();
    let service = monetization(&f, VariantMap::default());
    let account = f.accounts.seed(0);

    let body = order_created_body(account.id, "ord_1", 10);
    let signature = sign_webhook(WEBHOOK_SECRET, &body);

    let outcome = service.handle_webhook(&body, &signature).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Applied);
    assert_eq!(f.accounts.credits_of(account.id), 10);

    let purchases = f.purchases.purchases.lock().unwrap();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0].order_id, "ord_1");
    assert_eq!(purchases[0].amount_cents, 599);
    drop(purchases);

    // Redelivery of the same event id is acknowledged without side effects
    let outcome = service.handle_webhook(&body, &signature).await.unwrap();
    assert_eq!(outcome, WebhookOutcome::Replay);
    assert_eq!(f.accounts.credits_of(account.id), 10);
    assert_eq!(f.purchases.purchases.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn webhook_rejects_bad_signatures_before_any_side_effect() {
    let f = fixture();
    let service = monetization(&f, VariantMap::default());
    let account = f.accounts.seed(0);

    let body = order_created_body(account.id, "ord_2", 10);
    let err = service.handle_webhook(&body, "deadbeef").await.unwrap_err();
    assert!(matches!(err, MonetizationError::InvalidSignature));
    assert_eq!(f.accounts.credits_of(account.id), 0);
    assert!(f.purchases.events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn subscription_webhooks_toggle_premium() {
    let f = fixture();
    let service = monetization(&f, VariantMap::default());
    let account = f.accounts.seed(0);

    let created = serde_json::json!({
        "meta": {
            "event_name": "subscription_created",
            "custom_data": { "user_id": account.id.to_string() }
        },
        "data": {
            "id": "sub_1",
            "attributes": { "status": "active", "renews_at": "2026-09-27T00:00:00Z" }
        }
    })
    .to_string()
    .into_bytes();
    service
        .handle_webhook(&created, &sign_webhook(WEBHOOK_SECRET, &created))
        .await
        .unwrap();

    let after = f.accounts.get_by_id(account.id).await.unwrap();
    assert!(after.is_premium);
    assert_eq!(after.subscription_id.as_deref(), Some("sub_1"));

    let expired = serde_json::json!({
        "meta": {
            "event_name": "subscription_expired",
            "custom_data": { "user_id": account.id.to_string() }
        },
        "data": {
            "id": "sub_1",
            "attributes": { "status": "expired" }
        }
    })
    .to_string()
    .into_bytes();
    service
        .handle_webhook(&expired, &sign_webhook(WEBHOOK_SECRET, &expired))
        .await
        .unwrap();

    let after = f.accounts.get_by_id(account.id).await.unwrap();
    assert!(!after.is_premium);
}

#[tokio::test]
async fn unknown_webhook_events_are_ignored() {
    let f = fixture();
    let service = monetization(&f, VariantMap::default());

    let body = serde_json::json!({
        "meta": { "event_name": "affiliate_activated" },
        "data": { "id": "aff_1" }
    })
    .to_string()
    .into_bytes();

    let outcome = service
        .handle_webhook(&body, &sign_webhook(WEBHOOK_SECRET, &body))
        .await
        .unwrap();
    assert_eq!(outcome, WebhookOutcome::Ignored);
}

#[tokio::test]
async fn checkout_fails_closed_when_no_variant_is_configured() {
    let f = fixture();
    let service = monetization(&f, VariantMap::default());
    let account = f.accounts.seed(0);

    let err = service
        .create_checkout(&account, CheckoutSelection::Package("starter".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, MonetizationError::VariantNotConfigured(_)));

    let err = service
        .create_checkout(&account, CheckoutSelection::Plan(PremiumPlan::Monthly))
        .await
        .unwrap_err();
    assert!(matches!(err, MonetizationError::VariantNotConfigured(_)));

    let err = service
        .create_checkout(&account, CheckoutSelection::Package("mega".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, MonetizationError::UnknownPackage(_)));
}
