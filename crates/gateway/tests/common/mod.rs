#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::{Router, routing::any};
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use signing_gateway::{AppState, GatewayConfig, GatewayDispatcher};
use tempfile::NamedTempFile;

#[path = "../../src/fixtures.rs"]
pub mod fixtures;

pub use fixtures::write_temp;

pub const TOKEN: &str = "test-bearer-token";
pub const REMOTE_PATH: &str = "/v1/test";

pub fn pkcs1_key_file() -> NamedTempFile {
    write_temp(&fixtures::pkcs1_pem())
}

pub fn pkcs8_key_file() -> NamedTempFile {
    write_temp(&fixtures::pkcs8_pem())
}

pub fn public_key_file() -> NamedTempFile {
    write_temp(&fixtures::public_key_pem())
}

pub fn other_public_key_file() -> NamedTempFile {
    let pem = fixtures::other_private_key()
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap();
    write_temp(&pem)
}

/// A request as seen by the mock remote endpoint.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct MockRemote {
    pub url: String,
    received: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockRemote {
    pub fn received(&self) -> Vec<RecordedRequest> {
        self.received.lock().unwrap().clone()
    }

    pub fn single(&self) -> RecordedRequest {
        let received = self.received();
        assert_eq!(received.len(), 1, "expected exactly one remote call");
        received.into_iter().next().unwrap()
    }
}

/// Spawns a remote endpoint that records every request and answers with
/// `status` and `reply`.
pub async fn spawn_remote(status: StatusCode, reply: &'static str) -> MockRemote {
    let received = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&received);

    let app = Router::new().route(
        REMOTE_PATH,
        any(move |method: Method, headers: HeaderMap, body: Bytes| {
            let recorder = Arc::clone(&recorder);
            async move {
                recorder.lock().unwrap().push(RecordedRequest { method, headers, body });
                (status, reply)
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockRemote {
        url: format!("http://{addr}{REMOTE_PATH}"),
        received,
    }
}

/// An address nothing listens on.
pub async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn config(remote_url: &str, key_path: &std::path::Path) -> GatewayConfig {
    GatewayConfig::new(remote_url, TOKEN, key_path).unwrap()
}

pub fn app(config: GatewayConfig) -> Router {
    let dispatcher = GatewayDispatcher::new(config).unwrap();
    signing_gateway::router(AppState { dispatcher })
}
