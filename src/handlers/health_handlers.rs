//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the storage credential and signer

use crate::{
    models::signing::{ObjectKey, SigningRequest},
    services::signing_service::SigningService,
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Very small liveness probe. Always returns 200 OK with a plain JSON body.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// 1. Validates the configured storage credential and public base URL.
/// 2. Signs a throwaway PUT to prove the signing chain works end to end.
///
/// HTTP 200 when all checks pass, HTTP 503 otherwise. Nothing is sent to the store.
pub async fn readyz(State(service): State<SigningService>) -> impl IntoResponse {
    let credential_check = match service.settings().validate() {
        Ok(()) => (true, None::<String>),
        Err(e) => (false, Some(e.to_string())),
    };

    let signer_check = match ObjectKey::parse("galleries/readyz/probe") {
        Ok(key) => match service.sign_at(&SigningRequest::upload(key, None), Utc::now()) {
            Ok(result) if result.upload_url.contains("X-Amz-Signature=") => (true, None),
            Ok(_) => (false, Some("presigned URL carries no signature".to_string())),
            Err(e) => (false, Some(e.to_string())),
        },
        Err(e) => (false, Some(e.to_string())),
    };

    let overall_ok = credential_check.0 && signer_check.0;

    let mut checks = HashMap::new();
    checks.insert(
        "credential",
        CheckStatus {
            ok: credential_check.0,
            error: credential_check.1,
        },
    );
    checks.insert(
        "signer",
        CheckStatus {
            ok: signer_check.0,
            error: signer_check.1,
        },
    );

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
