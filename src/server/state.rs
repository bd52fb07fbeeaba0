use crate::application::{
    EntitlementLedger, GalleryService, GenerationService, MonetizationService, RetentionService,
    VariantMap,
};
use crate::infrastructure::{
    AppConfig, AuthClient, GeminiImageClient, PaymentsClient, PostgresAccountRepository,
    PostgresImageRepository, PostgresPurchaseRepository, S3PortraitStore,
};
use anyhow::Context;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use sqlx::PgPool;
use std::sync::Arc;

pub type LedgerType = EntitlementLedger<PostgresAccountRepository, PostgresPurchaseRepository>;

pub type GenerationServiceType = GenerationService<
    PostgresAccountRepository,
    PostgresPurchaseRepository,
    PostgresImageRepository,
    GeminiImageClient,
    S3PortraitStore,
>;

pub type MonetizationServiceType =
    MonetizationService<PostgresAccountRepository, PostgresPurchaseRepository>;

pub type GalleryServiceType = GalleryService<
    PostgresAccountRepository,
    PostgresPurchaseRepository,
    PostgresImageRepository,
>;

pub type RetentionServiceType = RetentionService<PostgresImageRepository, S3PortraitStore>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub account_repo: Arc<PostgresAccountRepository>,
    pub ledger: Arc<LedgerType>,
    pub generation: Arc<GenerationServiceType>,
    pub monetization: Arc<MonetizationServiceType>,
    pub gallery: Arc<GalleryServiceType>,
    pub retention: Arc<RetentionServiceType>,
    pub auth: Arc<AuthClient>,
    pub app_base_url: String,
    pub cleanup_secret: String,
    pub scheduler_secret: Option<String>,
    pub free_daily_limit: i32,
}

/// Build full state from config + an existing pool.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
    let mut s3_builder = aws_sdk_s3::config::Builder::from(&sdk_config);
    if let Some(endpoint) = &config.storage_endpoint {
        s3_builder = s3_builder.endpoint_url(endpoint).force_path_style(true);
    }
    let s3_client = S3Client::from_conf(s3_builder.build());

    let store = Arc::new(S3PortraitStore::new(
        s3_client,
        config.storage_bucket,
        config.storage_public_base_url,
    ));

    let provider = Arc::new(
        GeminiImageClient::new(
            config.image_api_base_url,
            config.image_model,
            config.image_api_key,
        )
        .context("init image provider")?,
    );

    let payments = PaymentsClient::new(config.payments_api_key, config.payments_store_id)
        .context("init payments client")?;

    let auth = Arc::new(
        AuthClient::new(config.auth_base_url, config.auth_api_key).context("init auth client")?,
    );

    let account_repo = Arc::new(PostgresAccountRepository::new(pool.clone()));
    let image_repo = Arc::new(PostgresImageRepository::new(pool.clone()));
    let purchase_repo = Arc::new(PostgresPurchaseRepository::new(pool.clone()));

    let ledger = Arc::new(EntitlementLedger::new(
        account_repo.clone(),
        purchase_repo.clone(),
        config.free_daily_limit,
    ));

    let generation = Arc::new(GenerationService::new(
        account_repo.clone(),
        image_repo.clone(),
        ledger.clone(),
        provider,
        store.clone(),
    ));

    let variants = VariantMap {
        trial: config.variant_trial,
        starter: config.variant_starter,
        family: config.variant_family,
        premium_monthly: config.variant_premium_monthly,
        premium_yearly: config.variant_premium_yearly,
    };

    let monetization = Arc::new(MonetizationService::new(
        account_repo.clone(),
        purchase_repo.clone(),
        payments,
        config.payments_webhook_secret,
        variants,
        config.app_base_url.clone(),
    ));

    let gallery = Arc::new(GalleryService::new(image_repo.clone(), ledger.clone()));
    let retention = Arc::new(RetentionService::new(image_repo, store));

    Ok(AppState {
        pool,
        account_repo,
        ledger,
        generation,
        monetization,
        gallery,
        retention,
        auth,
        app_base_url: config.app_base_url,
        cleanup_secret: config.cleanup_secret,
        scheduler_secret: config.scheduler_secret,
        free_daily_limit: config.free_daily_limit,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
