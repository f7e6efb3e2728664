//! Removal of uploaded media: object first, then the metadata row.

use crate::{
    errors::{MetadataError, UploadError},
    models::{media::MediaRecordRef, signing::ObjectKey},
    services::{metadata_store::MetadataRecorder, signing_client::SigningClient},
};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of purging a gallery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeSummary {
    pub removed: usize,
    pub failed: Vec<String>,
}

#[derive(Clone)]
pub struct MediaManager {
    signer: Arc<dyn SigningClient>,
    metadata: Arc<dyn MetadataRecorder>,
}

impl MediaManager {
    pub fn new(signer: Arc<dyn SigningClient>, metadata: Arc<dyn MetadataRecorder>) -> Self {
        Self { signer, metadata }
    }

    /// Delete the stored object, then the record.
    ///
    /// An object that cannot be deleted is logged and left behind; the record
    /// is removed regardless so the gallery no longer shows it.
    pub async fn remove_media(&self, record: &MediaRecordRef) -> Result<(), UploadError> {
        match ObjectKey::from_public_url(&record.storage_url) {
            Ok(key) => {
                if let Err(err) = self.signer.request_delete(&key).await {
                    warn!(key = %key, "failed to delete stored object: {}", err);
                }
            }
            Err(err) => warn!(url = %record.storage_url, "cannot derive object key: {}", err),
        }

        self.metadata.delete_media_record(record.media_id).await?;
        info!(media_id = %record.media_id, "Removed media {}", record.filename);
        Ok(())
    }

    /// Remove every media item of `gallery_id` concurrently.
    pub async fn remove_gallery_media(
        &self,
        gallery_id: &str,
    ) -> Result<PurgeSummary, MetadataError> {
        let records = self.metadata.list_media(gallery_id).await?;
        let outcomes = join_all(records.iter().map(|r| self.remove_media(r))).await;

        let mut summary = PurgeSummary::default();
        for (record, outcome) in records.iter().zip(outcomes) {
            match outcome {
                Ok(()) => summary.removed += 1,
                Err(err) => {
                    warn!(media_id = %record.media_id, "failed to remove media: {}", err);
                    summary.failed.push(record.filename.clone());
                }
            }
        }
        info!(
            "Purged gallery {}: {} removed, {} failed",
            gallery_id,
            summary.removed,
            summary.failed.len()
        );
        Ok(summary)
    }
}
