//! Routes served by the signing service.
//!
//! - `POST   /upload-url`: presigned PUT grant for `{key, contentType?}`
//! - `POST   /delete`: server-side delete of `{key}` (`DELETE` also accepted)
//! - `GET    /healthz`: liveness
//! - `GET    /readyz`: credential and signer self-check

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        signing_handlers::{delete_object, upload_url},
    },
    services::signing_service::SigningService,
};
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router. Shared state (`SigningService`) reaches every handler.
pub fn routes() -> Router<SigningService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/upload-url", post(upload_url))
        .route("/delete", post(delete_object).delete(delete_object))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::credential::{Addressing, Credential},
        services::{
            authorizer::TokenAuthorizer, signing_service::StorageSettings,
            test_support::start_mock_store,
        },
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(endpoint: &str) -> Router {
        let settings = StorageSettings {
            credential: Credential {
                access_key_id: "AKIAGALLERYEXAMPLE".into(),
                secret_access_key: "gallery/secret/EXAMPLEKEY".into(),
                account_endpoint: endpoint.into(),
                bucket: "media".into(),
                addressing: Addressing::PathStyle,
            },
            public_base_url: "https://media.example.com".into(),
        };
        let service = SigningService::new(
            settings,
            Arc::new(TokenAuthorizer::new(["op-token"])),
            reqwest::Client::new(),
        )
        .unwrap();
        routes().with_state(service)
    }

    fn json_request(method: Method, uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn upload_url_requires_caller() {
        let response = app("https://store.example.com")
            .oneshot(json_request(
                Method::POST,
                "/upload-url",
                None,
                r#"{"key":"galleries/g1/a.jpg"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = read_json(response).await;
        assert_eq!(body["status"], 401);
        assert!(body["error"].as_str().unwrap().contains("No authorization header"));
    }

    #[tokio::test]
    async fn upload_url_rejects_missing_key() {
        let response = app("https://store.example.com")
            .oneshot(json_request(
                Method::POST,
                "/upload-url",
                Some("op-token"),
                r#"{"contentType":"image/jpeg"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = read_json(response).await;
        assert_eq!(body["error"], "Missing required parameter: key");
    }

    #[tokio::test]
    async fn upload_url_rejects_malformed_json() {
        let response = app("https://store.example.com")
            .oneshot(json_request(
                Method::POST,
                "/upload-url",
                Some("op-token"),
                "{not json",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upload_url_returns_grant() {
        let response = app("https://store.example.com")
            .oneshot(json_request(
                Method::POST,
                "/upload-url",
                Some("op-token"),
                r#"{"key":"galleries/g1/123_ab_a.jpg","contentType":"image/jpeg"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        let upload_url = body["uploadUrl"].as_str().unwrap();
        assert!(upload_url.starts_with("https://store.example.com/media/galleries/g1/123_ab_a.jpg?"));
        assert!(upload_url.contains("X-Amz-SignedHeaders=content-type%3Bhost"));
        assert_eq!(
            body["publicUrl"],
            "https://media.example.com/galleries/g1/123_ab_a.jpg"
        );
        assert_eq!(body["key"], "galleries/g1/123_ab_a.jpg");
        assert!(body["expiresAt"].is_string());
    }

    #[tokio::test]
    async fn delete_runs_against_store() {
        let store = start_mock_store(StatusCode::NO_CONTENT).await;
        for method in [Method::POST, Method::DELETE] {
            let response = app(&store.endpoint())
                .oneshot(json_request(
                    method,
                    "/delete",
                    Some("op-token"),
                    r#"{"key":"galleries/g1/a.jpg"}"#,
                ))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let body = read_json(response).await;
            assert_eq!(body["success"], true);
            assert_eq!(body["key"], "galleries/g1/a.jpg");
        }
        assert_eq!(store.requests().await.len(), 2);
    }

    #[tokio::test]
    async fn delete_rejected_by_store_is_bad_gateway() {
        let store = start_mock_store(StatusCode::FORBIDDEN).await;
        let response = app(&store.endpoint())
            .oneshot(json_request(
                Method::POST,
                "/delete",
                Some("op-token"),
                r#"{"key":"galleries/g1/a.jpg"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn health_endpoints_report_ok() {
        let app = app("https://store.example.com");
        for uri in ["/healthz", "/readyz"] {
            let response = app
                .clone()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert_eq!(read_json(response).await["status"], "ok");
        }
    }
}
