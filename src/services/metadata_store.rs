//! Metadata recorder: media rows and per-gallery counters.
//!
//! The production store is SQLite via `sqlx`; counters are bumped with a single
//! `UPDATE … SET n = n + 1` so concurrent uploads never lose an increment.
//! An in-memory store with the same contract is provided for embedding and tests.

use crate::{
    errors::MetadataError,
    models::media::{CounterField, GalleryCounters, MediaRecordRef},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

#[async_trait]
pub trait MetadataRecorder: Send + Sync {
    async fn create_media_record(&self, record: &MediaRecordRef) -> Result<Uuid, MetadataError>;

    async fn increment_counter(
        &self,
        gallery_id: &str,
        field: CounterField,
    ) -> Result<(), MetadataError>;

    async fn list_media(&self, gallery_id: &str) -> Result<Vec<MediaRecordRef>, MetadataError>;

    async fn delete_media_record(&self, media_id: Uuid) -> Result<(), MetadataError>;
}

/// SQLite-backed recorder.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Run the embedded schema migration. Safe to repeat.
    pub async fn run_migrations(&self) -> Result<(), MetadataError> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }

    /// Create the gallery row if it does not exist yet.
    pub async fn ensure_gallery(&self, gallery_id: &str, title: &str) -> Result<(), MetadataError> {
        sqlx::query(
            "INSERT INTO galleries (gallery_id, title, created_at) VALUES (?, ?, ?)
             ON CONFLICT(gallery_id) DO NOTHING",
        )
        .bind(gallery_id)
        .bind(title)
        .bind(Utc::now())
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn counters(&self, gallery_id: &str) -> Result<GalleryCounters, MetadataError> {
        sqlx::query_as::<_, GalleryCounters>(
            "SELECT photo_count, video_count FROM galleries WHERE gallery_id = ?",
        )
        .bind(gallery_id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => MetadataError::GalleryNotFound(gallery_id.to_string()),
            other => MetadataError::Sqlx(other),
        })
    }
}

#[async_trait]
impl MetadataRecorder for SqliteMetadataStore {
    async fn create_media_record(&self, record: &MediaRecordRef) -> Result<Uuid, MetadataError> {
        let result = sqlx::query(
            r#"
            INSERT INTO media (
                media_id, gallery_id, type, storage_url, filename,
                size_bytes, sort_order, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.media_id)
        .bind(&record.gallery_id)
        .bind(record.media_type)
        .bind(&record.storage_url)
        .bind(&record.filename)
        .bind(record.size_bytes)
        .bind(record.sort_order)
        .bind(Utc::now())
        .execute(&*self.db)
        .await;

        match result {
            Ok(_) => Ok(record.media_id),
            Err(err) if is_foreign_key_violation(&err) => {
                Err(MetadataError::GalleryNotFound(record.gallery_id.clone()))
            }
            Err(err) => Err(MetadataError::Sqlx(err)),
        }
    }

    async fn increment_counter(
        &self,
        gallery_id: &str,
        field: CounterField,
    ) -> Result<(), MetadataError> {
        let column = field.column();
        let sql = format!(
            "UPDATE galleries SET {col} = {col} + 1 WHERE gallery_id = ?",
            col = column
        );
        let result = sqlx::query(&sql)
            .bind(gallery_id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::GalleryNotFound(gallery_id.to_string()));
        }
        Ok(())
    }

    async fn list_media(&self, gallery_id: &str) -> Result<Vec<MediaRecordRef>, MetadataError> {
        let rows = sqlx::query_as::<_, MediaRecordRef>(
            "SELECT media_id, gallery_id, type, storage_url, filename, size_bytes, sort_order
             FROM media WHERE gallery_id = ?
             ORDER BY sort_order ASC, created_at ASC",
        )
        .bind(gallery_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(rows)
    }

    async fn delete_media_record(&self, media_id: Uuid) -> Result<(), MetadataError> {
        let result = sqlx::query("DELETE FROM media WHERE media_id = ?")
            .bind(media_id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(MetadataError::MediaNotFound(media_id.to_string()));
        }
        Ok(())
    }
}

/// Return true if SQLx error indicates a foreign key constraint violation.
fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_uppercase().contains("FOREIGN KEY")
    )
}

#[derive(Default)]
struct MemoryState {
    galleries: HashMap<String, GalleryCounters>,
    media: Vec<MediaRecordRef>,
}

/// Process-local recorder with the same semantics as the SQLite store.
#[derive(Default)]
pub struct InMemoryMetadataStore {
    state: Mutex<MemoryState>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn ensure_gallery(&self, gallery_id: &str) {
        self.state
            .lock()
            .await
            .galleries
            .entry(gallery_id.to_string())
            .or_default();
    }

    pub async fn counters(&self, gallery_id: &str) -> Option<GalleryCounters> {
        self.state.lock().await.galleries.get(gallery_id).copied()
    }
}

#[async_trait]
impl MetadataRecorder for InMemoryMetadataStore {
    async fn create_media_record(&self, record: &MediaRecordRef) -> Result<Uuid, MetadataError> {
        let mut state = self.state.lock().await;
        if !state.galleries.contains_key(&record.gallery_id) {
            return Err(MetadataError::GalleryNotFound(record.gallery_id.clone()));
        }
        if state
            .media
            .iter()
            .any(|m| m.media_id == record.media_id || m.storage_url == record.storage_url)
        {
            return Err(MetadataError::Backend(format!(
                "duplicate media record for `{}`",
                record.storage_url
            )));
        }
        state.media.push(record.clone());
        Ok(record.media_id)
    }

    async fn increment_counter(
        &self,
        gallery_id: &str,
        field: CounterField,
    ) -> Result<(), MetadataError> {
        let mut state = self.state.lock().await;
        let counters = state
            .galleries
            .get_mut(gallery_id)
            .ok_or_else(|| MetadataError::GalleryNotFound(gallery_id.to_string()))?;
        match field {
            CounterField::PhotoCount => counters.photo_count += 1,
            CounterField::VideoCount => counters.video_count += 1,
        }
        Ok(())
    }

    async fn list_media(&self, gallery_id: &str) -> Result<Vec<MediaRecordRef>, MetadataError> {
        let state = self.state.lock().await;
        let mut media: Vec<MediaRecordRef> = state
            .media
            .iter()
            .filter(|m| m.gallery_id == gallery_id)
            .cloned()
            .collect();
        media.sort_by_key(|m| m.sort_order);
        Ok(media)
    }

    async fn delete_media_record(&self, media_id: Uuid) -> Result<(), MetadataError> {
        let mut state = self.state.lock().await;
        let before = state.media.len();
        state.media.retain(|m| m.media_id != media_id);
        if state.media.len() == before {
            return Err(MetadataError::MediaNotFound(media_id.to_string()));
        }
        Ok(())
    }
}
