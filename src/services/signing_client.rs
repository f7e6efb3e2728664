//! Client side of the signing service, as used by the upload orchestrator.

use crate::{
    errors::UploadError,
    models::signing::{
        DeleteRequest, ErrorResponse, ObjectKey, UploadUrlRequest, UploadUrlResponse,
    },
};
use async_trait::async_trait;
use reqwest::StatusCode;

#[async_trait]
pub trait SigningClient: Send + Sync {
    /// Ask for a PUT grant bound to `key` and `content_type`.
    async fn request_upload_url(
        &self,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<UploadUrlResponse, UploadError>;

    /// Ask the service to delete `key` on our behalf.
    async fn request_delete(&self, key: &ObjectKey) -> Result<(), UploadError>;
}

/// Talks JSON over HTTP to a running signing service.
#[derive(Clone)]
pub struct HttpSigningClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpSigningClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            http,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.http.post(format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl SigningClient for HttpSigningClient {
    async fn request_upload_url(
        &self,
        key: &ObjectKey,
        content_type: &str,
    ) -> Result<UploadUrlResponse, UploadError> {
        let body = UploadUrlRequest {
            key: Some(key.to_string()),
            content_type: Some(content_type.to_string()),
        };
        let response = self
            .post("/upload-url")
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Signing(format!("signing request failed: {e}")))?;

        let response = check_status(response).await?;
        response
            .json::<UploadUrlResponse>()
            .await
            .map_err(|e| UploadError::Signing(format!("unreadable signing response: {e}")))
    }

    async fn request_delete(&self, key: &ObjectKey) -> Result<(), UploadError> {
        let body = DeleteRequest {
            key: Some(key.to_string()),
        };
        let response = self
            .post("/delete")
            .json(&body)
            .send()
            .await
            .map_err(|e| UploadError::Signing(format!("delete request failed: {e}")))?;
        check_status(response).await.map(|_| ())
    }
}

/// Map a signing-service error response onto the upload taxonomy.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UploadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or(text);
    let detail = format!("HTTP {} - {}", status.as_u16(), message);

    Err(match status {
        StatusCode::BAD_REQUEST => UploadError::Validation(detail),
        // The service only answers 500 when its storage credential is unusable.
        StatusCode::INTERNAL_SERVER_ERROR => UploadError::Configuration(detail),
        _ => UploadError::Signing(detail),
    })
}
