//! Mock S3-compatible endpoint shared by unit tests.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub content_type: Option<String>,
    pub body_len: usize,
}

struct MockState {
    status: StatusCode,
    requests: Mutex<Vec<SeenRequest>>,
}

pub struct MockStore {
    addr: SocketAddr,
    state: Arc<MockState>,
}

impl MockStore {
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn requests(&self) -> Vec<SeenRequest> {
        self.state.requests.lock().await.clone()
    }
}

/// Answer every request with `status`.
pub async fn start_mock_store(status: StatusCode) -> MockStore {
    let state = Arc::new(MockState {
        status,
        requests: Mutex::new(Vec::new()),
    });
    let app = Router::new().fallback(record).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockStore { addr, state }
}

async fn record(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    state.requests.lock().await.push(SeenRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().unwrap_or_default().to_string(),
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body_len: body.len(),
    });

    state.status
}
