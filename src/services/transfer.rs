//! Raw PUT of a file body to a presigned URL.

use crate::{
    errors::UploadError,
    models::upload::{FileSource, LocalFile},
};
use async_trait::async_trait;
use reqwest::header;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

#[async_trait]
pub trait ObjectTransfer: Send + Sync {
    /// Send the whole body of `file` in a single PUT. Any non-2xx is an error.
    async fn put_object(
        &self,
        upload_url: &str,
        content_type: &str,
        file: &LocalFile,
    ) -> Result<(), UploadError>;
}

#[derive(Clone, Default)]
pub struct HttpTransfer {
    http: reqwest::Client,
}

impl HttpTransfer {
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ObjectTransfer for HttpTransfer {
    async fn put_object(
        &self,
        upload_url: &str,
        content_type: &str,
        file: &LocalFile,
    ) -> Result<(), UploadError> {
        // Stream from disk; the body is never buffered whole.
        let body = match &file.source {
            FileSource::Path(path) => {
                let handle = File::open(path).await?;
                reqwest::Body::wrap_stream(ReaderStream::new(handle))
            }
            FileSource::Memory(data) => reqwest::Body::from(data.clone()),
        };

        let response = self
            .http
            .put(upload_url)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, file.size_bytes)
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let reason = status.canonical_reason().unwrap_or("unknown status");
        let body = response.text().await.unwrap_or_default();
        Err(UploadError::Transfer {
            status: status.as_u16(),
            detail: if body.trim().is_empty() {
                reason.to_string()
            } else {
                format!("{} - {}", reason, body.trim())
            },
        })
    }
}
