use hmac::{Hmac, Mac};
use reqwest::{header, Client};
use serde_json::json;
use sha2::Sha256;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentsError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Checkout creation failed: {0}")]
    CheckoutFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// HMAC-SHA256 of the raw webhook body, hex-encoded. Exposed so tests can
/// produce valid signatures.
pub fn sign_webhook(secret: &str, raw_body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification of the `x-signature` header against the raw
/// body. Must run before any JSON parsing or side effect.
pub fn verify_webhook_signature(secret: &str, raw_body: &[u8], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(raw_body);
    mac.verify_slice(&expected).is_ok()
}

/// Client for the payment provider's JSON:API checkout endpoint
/// (Lemon Squeezy-shaped).
pub struct PaymentsClient {
    client: Client,
    base_url: String,
    store_id: String,
}

/// Opaque metadata attached to a checkout; the provider echoes it back in
/// webhook events so credits can be applied without trusting client input.
#[derive(Debug, Clone)]
pub struct CheckoutMetadata {
    pub user_id: String,
    pub package_id: String,
    pub credits: i32,
}

impl PaymentsClient {
    pub fn new(api_key: String, store_id: String) -> Result<Self, PaymentsError> {
        if api_key.is_empty() || store_id.is_empty() {
            return Err(PaymentsError::InvalidConfig(
                "Payment provider credentials are not configured".to_string(),
            ));
        }

        let mut headers = header::HeaderMap::new();
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|e| PaymentsError::InvalidConfig(format!("Invalid API key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/vnd.api+json"),
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/vnd.api+json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                PaymentsError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: "https://api.lemonsqueezy.com/v1".to_string(),
            store_id,
        })
    }

    /// Requests a hosted checkout URL for the given provider variant, with
    /// the account id and credit amount riding along as custom data.
    pub async fn create_checkout(
        &self,
        variant_id: &str,
        email: &str,
        metadata: CheckoutMetadata,
        redirect_url: &str,
    ) -> Result<String, PaymentsError> {
        let body = json!({
            "data": {
                "type": "checkouts",
                "attributes": {
                    "checkout_data": {
                        "email": email,
                        "custom": {
                            "user_id": metadata.user_id,
                            "package_id": metadata.package_id,
                            "credits": metadata.credits.to_string(),
                        }
                    },
                    "product_options": { "redirect_url": redirect_url },
                    "checkout_options": { "button_color": "#f59e0b" },
                },
                "relationships": {
                    "store": { "data": { "type": "stores", "id": self.store_id } },
                    "variant": { "data": { "type": "variants", "id": variant_id } },
                }
            }
        });

        let resp = self
            .client
            .post(format!("{}/checkouts", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentsError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(PaymentsError::CheckoutFailed(format!(
                "{}: {}",
                status, error_text
            )));
        }

        let json_response: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PaymentsError::InvalidResponse(e.to_string()))?;

        json_response
            .pointer("/data/attributes/url")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                PaymentsError::InvalidResponse("Missing checkout URL in response".to_string())
            })
    }
}
