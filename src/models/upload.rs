//! Upload tasks and progress events produced by the orchestrator.

use crate::errors::UploadError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tokio::fs;

use super::signing::DEFAULT_CONTENT_TYPE;

/// Where the bytes of a local file come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// A file selected for upload, with its declared content type.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub source: FileSource,
}

impl LocalFile {
    /// Describe a file on disk, guessing its content type from the extension.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let meta = fs::metadata(path).await?;

        Ok(Self {
            filename: display_name(path),
            content_type: guess_content_type(path).to_string(),
            size_bytes: meta.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// An in-memory file, e.g. received from another process.
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        let data = data.into();
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            size_bytes: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// Name a path is reported under: its last component, or the whole path.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Content type for common image and video extensions.
pub fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "txt" => "text/plain",
        "pdf" => "application/pdf",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Signing,
    Transferring,
    Recording,
    Done,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Done | TaskState::Failed)
    }

    /// Legal edges of the per-file state machine.
    pub fn can_transition_to(&self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Queued, Signing)
                | (Queued, Failed)
                | (Signing, Transferring)
                | (Signing, Failed)
                | (Transferring, Recording)
                | (Transferring, Failed)
                | (Recording, Done)
                | (Recording, Failed)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Queued => "queued",
            TaskState::Signing => "signing",
            TaskState::Transferring => "transferring",
            TaskState::Recording => "recording",
            TaskState::Done => "done",
            TaskState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One file of a batch.
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub file: LocalFile,
    pub gallery_id: String,
    /// Zero-based position in the batch; also the media sort order.
    pub sequence_index: usize,
    state: TaskState,
}

impl UploadTask {
    pub fn new(file: LocalFile, gallery_id: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            file,
            gallery_id: gallery_id.into(),
            sequence_index,
            state: TaskState::Queued,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn advance(&mut self, next: TaskState) -> Result<(), UploadError> {
        if !self.state.can_transition_to(next) {
            return Err(UploadError::Internal(format!(
                "illegal transition {} -> {} for `{}`",
                self.state, next, self.file.filename
            )));
        }
        tracing::debug!(
            file = %self.file.filename,
            index = self.sequence_index,
            from = %self.state,
            to = %next,
            "task transition"
        );
        self.state = next;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Completed,
    Failed,
}

/// Externally observable progress of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub filename: String,
    /// One-based position of the file in the batch.
    pub current_index: usize,
    pub total_count: usize,
    pub status: UploadStatus,
    pub error_detail: Option<String>,
}
