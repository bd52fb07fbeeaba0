use crate::application::ledger::{EntitlementLedger, Entitlement, LedgerError};
use crate::domain::{GeneratedImage, ImageFormat, ShotType, Theme};
use crate::infrastructure::image_provider::{ImageProvider, ImageProviderError};
use crate::infrastructure::repository::{
    AccountRepository, ImageRepository, PurchaseRepository, RepositoryError,
};
use crate::infrastructure::storage::{PortraitStore, StorageError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Premium options require a signed-in account with credits")]
    PremiumRequired,
    #[error("Not enough credits")]
    NeedsCredits,
    #[error("Daily free limit reached")]
    FreeLimitReached,
    #[error("Image provider error: {0}")]
    Provider(#[from] ImageProviderError),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<LedgerError> for GenerationError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::NeedsCredits => GenerationError::NeedsCredits,
            LedgerError::FreeLimitReached => GenerationError::FreeLimitReached,
            LedgerError::Repository(e) => GenerationError::Repository(e),
            LedgerError::UnknownPackage(p) => {
                GenerationError::InvalidRequest(format!("Unknown package: {}", p))
            }
        }
    }
}

/// Where the source photo comes from: inline base64 or a key of an object
/// already in storage.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Base64(String),
    StoragePath(String),
}

/// Anonymous request. Guests are limited to the free combination; the result
/// is returned inline and never persisted or billed.
#[derive(Debug, Clone)]
pub struct GuestRequest {
    pub source: ImageSource,
    pub theme: Theme,
    pub format: ImageFormat,
    pub shot_type: ShotType,
}

/// Signed-in request. Entitlement (free slot vs credit) is decided per
/// request; the result is uploaded and recorded with a retention deadline.
#[derive(Debug, Clone)]
pub struct AccountRequest {
    pub account_id: Uuid,
    pub source: ImageSource,
    pub theme: Theme,
    pub format: ImageFormat,
    pub shot_type: ShotType,
}

/// Inline result for guests; `data_url` embeds the JPEG directly.
#[derive(Debug, Clone)]
pub struct GuestResult {
    pub data_url: String,
}

#[derive(Debug, Clone)]
pub struct AccountResult {
    pub image_id: Uuid,
    pub url: String,
    pub is_free_tier: bool,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Builds the provider edit instruction. The provider takes no structured
/// parameters, so theme costume, aspect ratio, and framing all ride in the
/// text. Identity preservation comes first; edits are scoped to attire and
/// background.
pub fn compose_edit_instruction(theme: &Theme, format: ImageFormat, shot_type: ShotType) -> String {
    format!(
        "Edit this photo of a child so they appear as a future professional, wearing {}. \
         Keep the child's face, expression, and identity exactly as in the original photo; \
         change only the clothing and background. Compose the result as {}, \
         with a {} aspect ratio. Photorealistic, warm lighting, family-friendly.",
        theme.description(),
        shot_type.framing_text(),
        format.aspect_ratio(),
    )
}

/// Orchestrates a generation: entitlement check, provider call, ledger
/// settlement, upload, record. The provider is always called before any
/// balance is touched, so a provider failure costs the user nothing.
pub struct GenerationService<A, P, R, G, S>
where
    A: AccountRepository,
    P: PurchaseRepository,
    R: ImageRepository,
    G: ImageProvider,
    S: PortraitStore,
{
    accounts: Arc<A>,
    images: Arc<R>,
    ledger: Arc<EntitlementLedger<A, P>>,
    provider: Arc<G>,
    store: Arc<S>,
}

impl<A, P, R, G, S> GenerationService<A, P, R, G, S>
where
    A: AccountRepository,
    P: PurchaseRepository,
    R: ImageRepository,
    G: ImageProvider,
    S: PortraitStore,
{
    pub fn new(
        accounts: Arc<A>,
        images: Arc<R>,
        ledger: Arc<EntitlementLedger<A, P>>,
        provider: Arc<G>,
        store: Arc<S>,
    ) -> Self {
        Self {
            accounts,
            images,
            ledger,
            provider,
            store,
        }
    }

    /// Resolves the request's photo source to the base64 the provider wants.
    async fn resolve_source(&self, source: &ImageSource) -> Result<String, GenerationError> {
        match source {
            ImageSource::Base64(data) => {
                if data.trim().is_empty() {
                    return Err(GenerationError::InvalidRequest(
                        "Source image is required".to_string(),
                    ));
                }
                Ok(data.clone())
            }
            ImageSource::StoragePath(key) => {
                let bytes = self.store.get(key).await?;
                Ok(BASE64.encode(bytes))
            }
        }
    }

    /// One free-combo generation for an anonymous visitor. The output is
    /// returned as a data URL and leaves no trace server-side.
    pub async fn generate_guest(&self, req: GuestRequest) -> Result<GuestResult, GenerationError> {
        let is_free_combo = req.theme.is_free()
            && req.format == ImageFormat::default()
            && req.shot_type == ShotType::default();
        if !is_free_combo {
            return Err(GenerationError::PremiumRequired);
        }

        let image_base64 = self.resolve_source(&req.source).await?;
        let instruction = compose_edit_instruction(&req.theme, req.format, req.shot_type);
        let bytes = self
            .provider
            .edit_portrait(&image_base64, &instruction)
            .await?;

        info!(theme = %req.theme, "Guest generation complete");

        Ok(GuestResult {
            data_url: format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)),
        })
    }

    /// Full generation for a signed-in account.
    pub async fn generate_for_account(
        &self,
        req: AccountRequest,
    ) -> Result<AccountResult, GenerationError> {
        let image_base64 = self.resolve_source(&req.source).await?;

        let today = Utc::now().date_naive();
        let account = self.accounts.get_by_id(req.account_id).await?;
        let entitlement = self
            .ledger
            .evaluate(&account, &req.theme, req.format, req.shot_type, today)?;

        let instruction = compose_edit_instruction(&req.theme, req.format, req.shot_type);
        let bytes = self
            .provider
            .edit_portrait(&image_base64, &instruction)
            .await?;

        // Settle only after the provider delivered. Losing the settlement
        // race aborts before anything is stored.
        self.ledger.commit(account.id, entitlement, today).await?;

        let storage_path = format!(
            "generated/{}/{}.jpg",
            account.id,
            Utc::now().timestamp_millis()
        );
        let public_url = self.store.put_jpeg(&storage_path, bytes).await?;

        let image = match entitlement {
            Entitlement::FreeSlot => GeneratedImage::new_free(
                account.id,
                storage_path,
                public_url,
                instruction,
                &req.theme,
                req.format,
                req.shot_type,
            ),
            Entitlement::Paid => GeneratedImage::new_paid(
                account.id,
                storage_path,
                public_url,
                instruction,
                &req.theme,
                req.format,
                req.shot_type,
            ),
        };

        if let Err(e) = self.images.create(&image).await {
            // The upload exists but the record does not; the sweeper cannot
            // reclaim it, so leave a trail for manual cleanup.
            warn!(path = %image.storage_path, error = %e, "Orphaned upload");
            return Err(e.into());
        }

        info!(
            account_id = %account.id,
            image_id = %image.id,
            theme = %req.theme,
            free_tier = image.is_free_tier,
            "Generation complete"
        );

        Ok(AccountResult {
            image_id: image.id,
            url: image.public_url,
            is_free_tier: image.is_free_tier,
            expires_at: image.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_mentions_costume_aspect_and_framing() {
        let text =
            compose_edit_instruction(&Theme::Astronaut, ImageFormat::Landscape, ShotType::FullBody);
        assert!(text.contains("astronaut suit"));
        assert!(text.contains("16:9"));
        assert!(text.contains("full-body"));
        assert!(text.contains("identity exactly as in the original"));
    }

    #[test]
    fn instruction_uses_generic_costume_for_unknown_themes() {
        let theme = Theme::Unknown("wizard".to_string());
        let text = compose_edit_instruction(&theme, ImageFormat::Square, ShotType::Portrait);
        assert!(text.contains("wearing a wizard costume"));
        assert!(text.contains("1:1"));
    }

}
