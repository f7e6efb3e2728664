//! HTTP handlers for upload grants and server-side deletes.
//! Callers are resolved from the bearer token before any signing happens.

use crate::{
    errors::AppError,
    models::signing::{DeleteRequest, DeleteResponse, UploadUrlRequest, UploadUrlResponse},
    services::{
        authorizer::{Caller, bearer_token},
        signing_service::SigningService,
    },
};
use axum::{
    Json,
    extract::{FromRequestParts, State, rejection::JsonRejection},
    http::{header, request::Parts},
};

impl FromRequestParts<SigningService> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        service: &SigningService,
    ) -> Result<Self, Self::Rejection> {
        let bearer = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(bearer_token);

        Ok(service.authorizer().authorize(bearer)?)
    }
}

/// `POST /upload-url` with `{key, contentType?}`.
pub async fn upload_url(
    State(service): State<SigningService>,
    caller: Caller,
    payload: Result<Json<UploadUrlRequest>, JsonRejection>,
) -> Result<Json<UploadUrlResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;

    let result = service.grant_upload(&caller, req.key.as_deref(), req.content_type.as_deref())?;
    let key = req.key.unwrap_or_default();

    Ok(Json(UploadUrlResponse {
        upload_url: result.upload_url,
        public_url: result.public_url,
        key,
        expires_at: Some(result.expires_at),
    }))
}

/// `POST /delete` (or `DELETE /delete`) with `{key}`. The object is removed
/// before the response is sent.
pub async fn delete_object(
    State(service): State<SigningService>,
    caller: Caller,
    payload: Result<Json<DeleteRequest>, JsonRejection>,
) -> Result<Json<DeleteResponse>, AppError> {
    let Json(req) = payload.map_err(|e| AppError::bad_request(e.body_text()))?;

    let key = service.delete_object(&caller, req.key.as_deref()).await?;

    Ok(Json(DeleteResponse {
        success: true,
        key: key.to_string(),
    }))
}
