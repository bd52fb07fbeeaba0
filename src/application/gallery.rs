use crate::application::ledger::{EntitlementLedger, LedgerError};
use crate::infrastructure::repository::{
    AccountRepository, GalleryEntry, ImageRepository, PurchaseRepository, RepositoryError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Image does not belong to this account")]
    NotOwner,
}

#[derive(Debug, Clone)]
pub struct ShareOutcome {
    pub shared: bool,
    pub bonus_granted: bool,
}

const GALLERY_PAGE_SIZE: i64 = 20;

/// Public gallery reads plus the owner-only share flow. The share bonus is
/// gated on the first visibility flip, so re-sharing is a no-op.
pub struct GalleryService<A, P, R>
where
    A: AccountRepository,
    P: PurchaseRepository,
    R: ImageRepository,
{
    images: Arc<R>,
    ledger: Arc<EntitlementLedger<A, P>>,
}

impl<A, P, R> GalleryService<A, P, R>
where
    A: AccountRepository,
    P: PurchaseRepository,
    R: ImageRepository,
{
    pub fn new(images: Arc<R>, ledger: Arc<EntitlementLedger<A, P>>) -> Self {
        Self { images, ledger }
    }

    pub async fn list_public(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        Ok(self.images.list_public(GALLERY_PAGE_SIZE).await?)
    }

    /// Publishes an image the account owns. The first flip grants the +1
    /// share bonus; later calls change nothing and grant nothing.
    pub async fn share(
        &self,
        account_id: Uuid,
        image_id: Uuid,
    ) -> Result<ShareOutcome, GalleryError> {
        let image = self.images.get_by_id(image_id).await?;
        if image.account_id != account_id {
            return Err(GalleryError::NotOwner);
        }

        let first_flip = self.images.mark_public(image_id).await?;
        if !first_flip {
            return Ok(ShareOutcome {
                shared: true,
                bonus_granted: false,
            });
        }

        self.ledger.grant_gallery_share_bonus(account_id).await?;
        info!(%account_id, %image_id, "Image shared to gallery");

        Ok(ShareOutcome {
            shared: true,
            bonus_granted: true,
        })
    }
}
