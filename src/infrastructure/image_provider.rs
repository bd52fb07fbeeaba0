use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::{header, Client};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

#[derive(Error, Debug)]
pub enum ImageProviderError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Provider returned no image payload")]
    EmptyPayload,
    #[error("Rate limited")]
    RateLimited,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Seam over the external image-editing API so the orchestrator can be tested
/// without network access.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Edits the given JPEG (base64) per `instruction` and returns the raw
    /// output bytes.
    #[must_use]
    async fn edit_portrait(
        &self,
        image_base64: &str,
        instruction: &str,
    ) -> Result<Vec<u8>, ImageProviderError>;
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

// Generation runs long; the timeout stays under the platform's 60s request
// ceiling with headroom for response handling.
const REQUEST_TIMEOUT_SECS: u64 = 55;

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 500 | 502 | 503)
}

/// REST client for the Gemini-style image-editing endpoint. The provider has
/// no structured aspect-ratio/framing parameters, so everything rides in the
/// text instruction.
pub struct GeminiImageClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl GeminiImageClient {
    pub fn new(
        base_url: String,
        model: String,
        api_key: String,
    ) -> Result<Self, ImageProviderError> {
        if api_key.is_empty() {
            return Err(ImageProviderError::InvalidConfig(
                "Image provider API key is empty".to_string(),
            ));
        }

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                ImageProviderError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url,
            model,
            api_key,
        })
    }

    async fn send_with_retry<F>(
        &self,
        mut request_builder: F,
    ) -> Result<reqwest::Response, ImageProviderError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut last_error: Option<String> = None;

        for attempt in 0..MAX_RETRIES {
            let response = request_builder().send().await;

            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();

                    if status == 429 {
                        return Err(ImageProviderError::RateLimited);
                    }

                    if is_retryable_status(status) && attempt < MAX_RETRIES - 1 {
                        let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        sleep(Duration::from_millis(backoff)).await;
                        continue;
                    }

                    return Ok(resp);
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    if attempt < MAX_RETRIES - 1 {
                        let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }

        Err(ImageProviderError::RequestFailed(
            last_error.unwrap_or_else(|| "Max retries exceeded".to_string()),
        ))
    }
}

/// Pulls the first inline-image part out of a generateContent response.
fn extract_image_base64(body: &serde_json::Value) -> Option<&str> {
    body.get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?
        .iter()
        .find_map(|part| part.get("inlineData")?.get("data")?.as_str())
}

#[async_trait]
impl ImageProvider for GeminiImageClient {
    async fn edit_portrait(
        &self,
        image_base64: &str,
        instruction: &str,
    ) -> Result<Vec<u8>, ImageProviderError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let body = json!({
            "contents": [{
                "parts": [
                    { "inlineData": { "mimeType": "image/jpeg", "data": image_base64 } },
                    { "text": instruction },
                ]
            }],
            "generationConfig": { "responseModalities": ["IMAGE"] },
        });

        let resp = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ImageProviderError::RequestFailed(format!(
                "{}: {}",
                status, error_text
            )));
        }

        let json_response: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| ImageProviderError::InvalidResponse(e.to_string()))?;

        // A 200 with no image part means the prompt/provider contract broke,
        // which is worth distinguishing from transport failures in the logs.
        let data = extract_image_base64(&json_response).ok_or(ImageProviderError::EmptyPayload)?;

        BASE64
            .decode(data)
            .map_err(|e| ImageProviderError::InvalidResponse(format!("Bad image base64: {}", e)))
    }
}
