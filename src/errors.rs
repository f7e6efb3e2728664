use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{fmt, io};
use thiserror::Error;

/// A lightweight wrapper for errors crossing the HTTP boundary.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<SigningError> for AppError {
    fn from(err: SigningError) -> Self {
        let status = match &err {
            SigningError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SigningError::Validation(_) => StatusCode::BAD_REQUEST,
            SigningError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            SigningError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.to_string())
    }
}

/// Missing or unusable storage configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing storage configuration: {0}")]
    Missing(&'static str),
    #[error("invalid storage configuration `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// An object key or gallery id that cannot be signed.
#[derive(Debug, Error)]
#[error("invalid object key: {0}")]
pub struct InvalidKey(pub String);

#[derive(Debug, Error)]
pub enum SigningError {
    #[error(transparent)]
    Configuration(#[from] ConfigError),
    #[error("{0}")]
    Validation(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("object store rejected request: {0}")]
    Upstream(String),
}

impl From<InvalidKey> for SigningError {
    fn from(err: InvalidKey) -> Self {
        SigningError::Validation(err.to_string())
    }
}

/// Failures of the external metadata store.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("gallery `{0}` not found")]
    GalleryNotFound(String),
    #[error("media record `{0}` not found")]
    MediaNotFound(String),
    #[error("metadata backend error: {0}")]
    Backend(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Coarse classification of a per-file failure, reported in the batch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UploadErrorKind {
    #[serde(rename = "ConfigurationError")]
    Configuration,
    #[serde(rename = "ValidationError")]
    Validation,
    #[serde(rename = "UpstreamError")]
    Upstream,
    UnsupportedType,
    #[serde(rename = "TransferError")]
    Transfer,
    Internal,
}

impl UploadErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadErrorKind::Configuration => "ConfigurationError",
            UploadErrorKind::Validation => "ValidationError",
            UploadErrorKind::Upstream => "UpstreamError",
            UploadErrorKind::UnsupportedType => "UnsupportedType",
            UploadErrorKind::Transfer => "TransferError",
            UploadErrorKind::Internal => "Internal",
        }
    }
}

impl fmt::Display for UploadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-file failure inside an upload batch.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("unsupported content type `{0}`")]
    UnsupportedType(String),
    #[error("{0}")]
    Validation(String),
    #[error("signing service misconfigured: {0}")]
    Configuration(String),
    #[error("signing service error: {0}")]
    Signing(String),
    #[error("upload failed with HTTP {status}: {detail}")]
    Transfer { status: u16, detail: String },
    #[error("upload request failed: {0}")]
    Network(String),
    #[error("could not read local file: {0}")]
    Io(#[from] io::Error),
    #[error("metadata write failed: {0}")]
    Metadata(#[from] MetadataError),
    #[error("{0}")]
    Internal(String),
}

impl UploadError {
    pub fn kind(&self) -> UploadErrorKind {
        match self {
            UploadError::UnsupportedType(_) => UploadErrorKind::UnsupportedType,
            UploadError::Validation(_) => UploadErrorKind::Validation,
            UploadError::Configuration(_) => UploadErrorKind::Configuration,
            UploadError::Signing(_) | UploadError::Metadata(_) => UploadErrorKind::Upstream,
            UploadError::Transfer { .. } | UploadError::Network(_) | UploadError::Io(_) => {
                UploadErrorKind::Transfer
            }
            UploadError::Internal(_) => UploadErrorKind::Internal,
        }
    }
}

impl From<InvalidKey> for UploadError {
    fn from(err: InvalidKey) -> Self {
        UploadError::Validation(err.to_string())
    }
}
