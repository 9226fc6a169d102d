use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::get,
    routing::post,
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::dispatch::{DispatchError, GatewayDispatcher, GatewayResponse, OutboundMethod};

pub const WELCOME_MESSAGE: &str = "Welcome to the signing gateway.";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: GatewayDispatcher,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async move { WELCOME_MESSAGE }))
        .route("/healthcheck", get(|| async move { (StatusCode::OK, "Ok").into_response() }))
        .route("/v1get", get(v1_get))
        .route("/v1post", post(v1_post))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(host: String, port: u16, config: GatewayConfig) -> Result<()> {
    let dispatcher = GatewayDispatcher::new(config).context("initializing dispatcher")?;
    info!(remote_url = %dispatcher.config().remote_url, "forwarding signed requests");
    let app = router(AppState { dispatcher });

    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("binding {host}:{port}"))?;
    info!(addr = %listener.local_addr()?, "signing gateway listening");

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving")?;

    info!("shut down");
    Ok(())
}

async fn v1_get(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<GatewayResponse>, DispatchError> {
    let response = state
        .dispatcher
        .handle_incoming(OutboundMethod::Get, &[], &headers)
        .await?;
    Ok(Json(response))
}

async fn v1_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<GatewayResponse>, DispatchError> {
    let response = state
        .dispatcher
        .handle_incoming(OutboundMethod::Post, &body, &headers)
        .await?;
    Ok(Json(response))
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received, draining connections");
}
