use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub app_base_url: String,

    // Image-generation provider
    pub image_api_key: String,
    pub image_api_base_url: String,
    pub image_model: String,

    // Payment provider (hosted checkout + signed webhooks)
    pub payments_api_key: String,
    pub payments_store_id: String,
    pub payments_webhook_secret: String,
    pub variant_trial: Option<String>,
    pub variant_starter: Option<String>,
    pub variant_family: Option<String>,
    pub variant_premium_monthly: Option<String>,
    pub variant_premium_yearly: Option<String>,

    // Auth provider (OAuth code exchange + token introspection)
    pub auth_base_url: String,
    pub auth_api_key: String,

    // Object storage
    pub storage_bucket: String,
    pub storage_endpoint: Option<String>,
    pub storage_public_base_url: String,

    // Cleanup job authentication
    pub cleanup_secret: String,
    pub scheduler_secret: Option<String>,

    pub free_daily_limit: i32,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(Environment::with_prefix("DMK"))
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("app_base_url", "https://dearmykids.example.com")?
            .set_default(
                "image_api_base_url",
                "https://generativelanguage.googleapis.com/v1beta",
            )?
            .set_default("image_model", "gemini-2.5-flash-image")?
            .set_default("auth_base_url", "https://auth.dearmykids.example.com")?
            .set_default("free_daily_limit", 1)?
            .build()?;

        config.try_deserialize()
    }
}
