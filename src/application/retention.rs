use crate::infrastructure::repository::{ImageRepository, RepositoryError};
use crate::infrastructure::storage::PortraitStore;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RetentionError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: u64,
    pub storage_failures: u64,
}

/// Deletes generation results past their retention deadline. Storage deletes
/// are best effort; a failed object delete is logged and the database row is
/// removed anyway, since the row is what the product surfaces.
pub struct RetentionService<R: ImageRepository, S: PortraitStore> {
    images: Arc<R>,
    store: Arc<S>,
}

impl<R: ImageRepository, S: PortraitStore> RetentionService<R, S> {
    pub fn new(images: Arc<R>, store: Arc<S>) -> Self {
        Self { images, store }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, RetentionError> {
        let expired = self.images.list_expired(now).await?;
        if expired.is_empty() {
            return Ok(SweepReport {
                deleted: 0,
                storage_failures: 0,
            });
        }

        let mut storage_failures = 0u64;
        for image in &expired {
            if let Err(e) = self.store.delete(&image.storage_path).await {
                warn!(path = %image.storage_path, error = %e, "Failed to delete stored object");
                storage_failures += 1;
            }
        }

        let ids: Vec<_> = expired.iter().map(|i| i.id).collect();
        let deleted = self.images.delete_batch(&ids).await?;

        info!(deleted, storage_failures, "Retention sweep complete");
        Ok(SweepReport {
            deleted,
            storage_failures,
        })
    }
}
