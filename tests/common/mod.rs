//! Shared fixtures: an in-process S3 stand-in and a running signing service.

#![allow(dead_code)]

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
};
use gallery_upload::{
    models::credential::{Addressing, Credential},
    routes::routes::routes,
    services::{
        authorizer::TokenAuthorizer,
        signing_service::{SigningService, StorageSettings},
    },
};
use std::{net::SocketAddr, sync::Arc};
use tokio::{net::TcpListener, sync::Mutex};

pub const OPERATOR_TOKEN: &str = "op-token";
pub const PUBLIC_BASE: &str = "https://media.example.com";

#[derive(Debug, Clone)]
pub struct StoredRequest {
    pub method: Method,
    pub path: String,
    pub query: String,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Default)]
struct StoreState {
    reject_path_containing: Option<String>,
    seen: Mutex<Vec<StoredRequest>>,
}

/// Accepts every PUT/DELETE unless the path contains the configured needle.
pub struct FakeObjectStore {
    addr: SocketAddr,
    state: Arc<StoreState>,
}

impl FakeObjectStore {
    pub async fn start(reject_path_containing: Option<&str>) -> Self {
        let state = Arc::new(StoreState {
            reject_path_containing: reject_path_containing.map(str::to_string),
            ..Default::default()
        });
        let app = Router::new().fallback(handle).with_state(state.clone());
        let addr = spawn(app).await;
        Self { addr, state }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn seen(&self) -> Vec<StoredRequest> {
        self.state.seen.lock().await.clone()
    }
}

async fn handle(
    State(state): State<Arc<StoreState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let path = uri.path().to_string();
    let rejected = state
        .reject_path_containing
        .as_deref()
        .is_some_and(|needle| path.contains(needle));

    state.seen.lock().await.push(StoredRequest {
        method: method.clone(),
        path,
        query: uri.query().unwrap_or_default().to_string(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });

    if rejected {
        StatusCode::FORBIDDEN
    } else if method == Method::DELETE {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::OK
    }
}

/// Run the real signing service router against `store_endpoint`.
pub async fn start_signing_service(store_endpoint: &str) -> String {
    let settings = StorageSettings {
        credential: Credential {
            access_key_id: "AKIAGALLERYEXAMPLE".into(),
            secret_access_key: "gallery/secret/EXAMPLEKEY".into(),
            account_endpoint: store_endpoint.into(),
            bucket: "media".into(),
            addressing: Addressing::PathStyle,
        },
        public_base_url: PUBLIC_BASE.into(),
    };
    let service = SigningService::new(
        settings,
        Arc::new(TokenAuthorizer::new([OPERATOR_TOKEN])),
        reqwest::Client::new(),
    )
    .expect("valid storage settings");

    let addr = spawn(routes().with_state(service)).await;
    format!("http://{}", addr)
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
