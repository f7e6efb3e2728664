//! Upload orchestrator: drives a batch of local files into a gallery.
//!
//! Each file runs through `queued → signing → transferring → recording → done`
//! (or `failed`). A bounded pool of workers pulls tasks from a shared queue and
//! sends outcomes back over a channel; a failing or panicking task never
//! cancels its siblings, and every input file ends up in the batch result.

use crate::{
    errors::{UploadError, UploadErrorKind},
    models::{
        media::{BatchResult, FailedUpload, MediaRecordRef, MediaType},
        signing::ObjectKey,
        upload::{LocalFile, ProgressEvent, TaskState, UploadStatus, UploadTask, display_name},
    },
    services::{
        metadata_store::MetadataRecorder,
        progress::{ProgressSink, TracingSink, catch_panic, emit},
        signing_client::SigningClient,
        transfer::ObjectTransfer,
    },
};
use chrono::Utc;
use std::{
    collections::{BTreeMap, VecDeque},
    path::PathBuf,
    sync::Arc,
};
use tokio::{
    sync::{Mutex, mpsc},
    task::JoinSet,
};
use tracing::{info, warn};
use uuid::Uuid;

type Outcome = (usize, Result<MediaRecordRef, UploadError>);

/// A batch input: a readable file, or the name and error of one that was not.
type BatchEntry = Result<LocalFile, (String, UploadError)>;

#[derive(Clone)]
pub struct UploadOrchestrator {
    signer: Arc<dyn SigningClient>,
    transfer: Arc<dyn ObjectTransfer>,
    metadata: Arc<dyn MetadataRecorder>,
    progress: Arc<dyn ProgressSink>,
    concurrency: usize,
}

impl UploadOrchestrator {
    pub fn new(
        signer: Arc<dyn SigningClient>,
        transfer: Arc<dyn ObjectTransfer>,
        metadata: Arc<dyn MetadataRecorder>,
    ) -> Self {
        Self {
            signer,
            transfer,
            metadata,
            progress: Arc::new(TracingSink),
            concurrency: 1,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Number of files in flight at once. Values below 1 are raised to 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Upload `files` into `gallery_id`. Never fails as a whole; per-file
    /// errors are collected into [`BatchResult::failed`].
    pub async fn upload_batch(&self, gallery_id: &str, files: Vec<LocalFile>) -> BatchResult {
        self.run_batch(gallery_id, files.into_iter().map(Ok).collect()).await
    }

    /// Upload files from disk. A path that cannot be read fails on its own
    /// with a transfer error; the rest of the batch still runs.
    pub async fn upload_paths(&self, gallery_id: &str, paths: Vec<PathBuf>) -> BatchResult {
        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let entry = LocalFile::from_path(&path)
                .await
                .map_err(|err| (display_name(&path), UploadError::Io(err)));
            entries.push(entry);
        }
        self.run_batch(gallery_id, entries).await
    }

    async fn run_batch(&self, gallery_id: &str, entries: Vec<BatchEntry>) -> BatchResult {
        let total = entries.len();
        let mut filenames = Vec::with_capacity(total);
        let mut outcomes = BTreeMap::new();
        let mut queue = VecDeque::with_capacity(total);

        for (index, entry) in entries.into_iter().enumerate() {
            match entry {
                Ok(file) => {
                    filenames.push(file.filename.clone());
                    queue.push_back(UploadTask::new(file, gallery_id, index));
                }
                Err((filename, err)) => {
                    warn!(file = %filename, kind = %err.kind(), "skipping unreadable file: {}", err);
                    self.report(&filename, index, total, UploadStatus::Failed, Some(&err));
                    filenames.push(filename);
                    outcomes.insert(index, Err(err));
                }
            }
        }
        let workers = self.concurrency.min(queue.len().max(1));
        let queue = Arc::new(Mutex::new(queue));

        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome>();
        info!(
            "Uploading {} file(s) to gallery {} with {} worker(s)",
            total, gallery_id, workers
        );

        let mut pool = JoinSet::new();
        for _ in 0..workers {
            let this = self.clone();
            let queue = queue.clone();
            let tx = tx.clone();
            pool.spawn(async move {
                loop {
                    let next = queue.lock().await.pop_front();
                    let Some(task) = next else { break };
                    let index = task.sequence_index;
                    let filename = task.file.filename.clone();

                    let outcome = match catch_panic(this.run_task(task, total)).await {
                        Some(outcome) => outcome,
                        None => {
                            let err = UploadError::Internal(format!(
                                "upload task for `{}` panicked",
                                filename
                            ));
                            this.report(&filename, index, total, UploadStatus::Failed, Some(&err));
                            Err(err)
                        }
                    };
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                warn!("upload worker terminated abnormally: {}", err);
            }
        }

        while let Some((index, outcome)) = rx.recv().await {
            outcomes.insert(index, outcome);
        }

        let mut result = BatchResult {
            total,
            ..Default::default()
        };
        for (index, filename) in filenames.into_iter().enumerate() {
            match outcomes.remove(&index) {
                Some(Ok(record)) => result.succeeded.push(record),
                Some(Err(err)) => result.failed.push(FailedUpload {
                    filename,
                    error_kind: err.kind(),
                    detail: err.to_string(),
                }),
                None => result.failed.push(FailedUpload {
                    filename,
                    error_kind: UploadErrorKind::Internal,
                    detail: "upload task did not report an outcome".into(),
                }),
            }
        }

        info!(
            "Batch for gallery {} finished: {} succeeded, {} failed",
            gallery_id,
            result.succeeded.len(),
            result.failed.len()
        );
        result
    }

    /// Drive one task to a terminal state and report its final progress event.
    async fn run_task(
        &self,
        mut task: UploadTask,
        total: usize,
    ) -> Result<MediaRecordRef, UploadError> {
        let result = self.process(&mut task, total).await;
        match &result {
            Ok(_) => self.report(
                &task.file.filename,
                task.sequence_index,
                total,
                UploadStatus::Completed,
                None,
            ),
            Err(err) => {
                if !task.state().is_terminal() {
                    if let Err(illegal) = task.advance(TaskState::Failed) {
                        warn!("{}", illegal);
                    }
                }
                warn!(file = %task.file.filename, kind = %err.kind(), "upload failed: {}", err);
                self.report(
                    &task.file.filename,
                    task.sequence_index,
                    total,
                    UploadStatus::Failed,
                    Some(err),
                );
            }
        }
        result
    }

    async fn process(
        &self,
        task: &mut UploadTask,
        total: usize,
    ) -> Result<MediaRecordRef, UploadError> {
        // The exact string classified here is the one signed and sent.
        let content_type = task.file.content_type.trim().to_string();
        let media_type = MediaType::classify(&content_type)
            .ok_or_else(|| UploadError::UnsupportedType(content_type.clone()))?;

        task.advance(TaskState::Signing)?;
        self.report(
            &task.file.filename,
            task.sequence_index,
            total,
            UploadStatus::Uploading,
            None,
        );

        let key = ObjectKey::for_upload(&task.gallery_id, &task.file.filename, Utc::now())?;
        let grant = self.signer.request_upload_url(&key, &content_type).await?;

        task.advance(TaskState::Transferring)?;
        self.transfer
            .put_object(&grant.upload_url, &content_type, &task.file)
            .await?;

        task.advance(TaskState::Recording)?;
        let record = MediaRecordRef {
            media_id: Uuid::new_v4(),
            gallery_id: task.gallery_id.clone(),
            media_type,
            storage_url: grant.public_url,
            filename: task.file.filename.clone(),
            size_bytes: i64::try_from(task.file.size_bytes).unwrap_or(i64::MAX),
            sort_order: task.sequence_index as i64,
        };
        self.record(&key, &record).await?;

        task.advance(TaskState::Done)?;
        Ok(record)
    }

    /// Write the media row and bump the counter, undoing both on failure.
    async fn record(&self, key: &ObjectKey, record: &MediaRecordRef) -> Result<(), UploadError> {
        let media_id = match self.metadata.create_media_record(record).await {
            Ok(id) => id,
            Err(err) => {
                self.discard_object(key).await;
                return Err(err.into());
            }
        };

        let counter = record.media_type.counter();
        if let Err(err) = self
            .metadata
            .increment_counter(&record.gallery_id, counter)
            .await
        {
            if let Err(cleanup) = self.metadata.delete_media_record(media_id).await {
                warn!(media_id = %media_id, "could not remove partial media record: {}", cleanup);
            }
            self.discard_object(key).await;
            return Err(err.into());
        }
        Ok(())
    }

    /// Best-effort removal of an object whose metadata never landed.
    async fn discard_object(&self, key: &ObjectKey) {
        match self.signer.request_delete(key).await {
            Ok(()) => warn!(key = %key, "orphan candidate removed after metadata failure"),
            Err(err) => warn!(key = %key, "orphan candidate left in storage: {}", err),
        }
    }

    fn report(
        &self,
        filename: &str,
        index: usize,
        total: usize,
        status: UploadStatus,
        error: Option<&UploadError>,
    ) {
        let event = ProgressEvent {
            filename: filename.to_string(),
            current_index: index + 1,
            total_count: total,
            status,
            error_detail: error.map(|e| e.to_string()),
        };
        emit(self.progress.as_ref(), &event);
    }
}
