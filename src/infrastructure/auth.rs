use reqwest::{header, Client};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Code exchange rejected: {0}")]
    ExchangeFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Identity returned by the auth provider after a successful code exchange.
/// `id` is the provider-side subject, stored as `external_id` on accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Client for the hosted auth provider. The server only ever sees short-lived
/// authorization codes and bearer tokens; password flows live entirely on the
/// provider side.
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: String, api_key: String) -> Result<Self, AuthError> {
        if api_key.is_empty() {
            return Err(AuthError::InvalidConfig(
                "Auth provider API key is empty".to_string(),
            ));
        }

        let mut headers = header::HeaderMap::new();
        let key_value = header::HeaderValue::from_str(&api_key)
            .map_err(|e| AuthError::InvalidConfig(format!("Invalid API key format: {}", e)))?;
        headers.insert("apikey", key_value);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AuthError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Exchanges an OAuth authorization code for the signed-in user's
    /// identity. Invalid or replayed codes surface as `ExchangeFailed`.
    pub async fn exchange_code(&self, code: &str) -> Result<AuthUser, AuthError> {
        let resp = self
            .client
            .post(format!("{}/token?grant_type=authorization_code", self.base_url))
            .json(&json!({ "auth_code": code }))
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AuthError::ExchangeFailed(format!(
                "{}: {}",
                status, error_text
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        self.get_user(&token.access_token).await
    }

    /// Resolves a bearer token to the user it belongs to.
    pub async fn get_user(&self, access_token: &str) -> Result<AuthUser, AuthError> {
        let resp = self
            .client
            .get(format!("{}/user", self.base_url))
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", access_token),
            )
            .send()
            .await
            .map_err(|e| AuthError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(AuthError::ExchangeFailed(format!(
                "Token rejected: {}",
                resp.status()
            )));
        }

        resp.json::<AuthUser>()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))
    }
}
