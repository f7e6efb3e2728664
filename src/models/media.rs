//! Media records handed to the metadata store, and the batch summary.

use crate::errors::UploadErrorKind;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
}

impl MediaType {
    /// Classify a declared content type. Only `image/*` and `video/*` are accepted.
    pub fn classify(content_type: &str) -> Option<Self> {
        let ct = content_type.trim().to_ascii_lowercase();
        if ct.starts_with("image/") {
            Some(MediaType::Photo)
        } else if ct.starts_with("video/") {
            Some(MediaType::Video)
        } else {
            None
        }
    }

    pub fn counter(&self) -> CounterField {
        match self {
            MediaType::Photo => CounterField::PhotoCount,
            MediaType::Video => CounterField::VideoCount,
        }
    }
}

/// Per-gallery counters maintained by the metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterField {
    PhotoCount,
    VideoCount,
}

impl CounterField {
    pub fn column(&self) -> &'static str {
        match self {
            CounterField::PhotoCount => "photo_count",
            CounterField::VideoCount => "video_count",
        }
    }
}

/// One uploaded file as the metadata store sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MediaRecordRef {
    pub media_id: Uuid,
    pub gallery_id: String,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub media_type: MediaType,
    pub storage_url: String,
    pub filename: String,
    pub size_bytes: i64,
    pub sort_order: i64,
}

/// Per-gallery counters, as stored on the gallery row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GalleryCounters {
    pub photo_count: i64,
    pub video_count: i64,
}

/// A file that did not make it into the gallery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedUpload {
    pub filename: String,
    pub error_kind: UploadErrorKind,
    pub detail: String,
}

/// Summary of one orchestrator run. Every input file appears in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub succeeded: Vec<MediaRecordRef>,
    pub failed: Vec<FailedUpload>,
    pub total: usize,
}

impl BatchResult {
    pub fn is_complete(&self) -> bool {
        self.succeeded.len() + self.failed.len() == self.total
    }

    pub fn failed_with(&self, kind: UploadErrorKind) -> usize {
        self.failed.iter().filter(|f| f.error_kind == kind).count()
    }
}
