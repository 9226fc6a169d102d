use std::path::PathBuf;

use axum::Json;
use axum::http::StatusCode;
use axum_core::response::{IntoResponse as AxumCoreIntoResponse, Response};
use serde::Serialize;

/// Failures while loading key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("no key found at {path}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("key has the wrong format: {0}")]
    Format(String),
    #[error("unable to parse RSA key: {0}")]
    Parse(String),
    #[error("public key {path} does not match the private key")]
    Mismatch { path: PathBuf },
}

/// Failures while producing a signature.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("RSA key is {bits} bits, at least {min} required")]
    KeyTooSmall { bits: usize, min: usize },
    #[error("RSA key failed validation: {0}")]
    InvalidKey(String),
    #[error("signing primitive failed: {0}")]
    Primitive(String),
    #[error("signature is not valid base64: {0}")]
    Encoding(String),
    #[error("signature does not verify")]
    Verification,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid request from caller: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error("Failed to build canonical message: {0}")]
    MessageBuild(String),
    #[error("Failed to reach remote endpoint: {0}")]
    Transmission(#[source] reqwest::Error),
    #[error("Invalid reply from remote endpoint: {0}")]
    Remote(String),
    #[error("Invalid gateway configuration: {0}")]
    Config(String),
}

/// Caller-facing error body. Only `BadRequest` carries its own detail.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Key(_) | GatewayError::Signing(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::MessageBuild(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::Transmission(_) | GatewayError::Remote(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (code, message) = match self {
            bad_request @ GatewayError::BadRequest(_) => ("bad_request", bad_request.to_string()),
            GatewayError::Key(_) | GatewayError::Signing(_) => (
                "signing_unavailable",
                "Request signing is currently unavailable.".to_string(),
            ),
            GatewayError::MessageBuild(_) => (
                "message_build_failed",
                "The request could not be encoded for signing.".to_string(),
            ),
            GatewayError::Transmission(_) => (
                "upstream_unreachable",
                "The remote endpoint could not be reached.".to_string(),
            ),
            GatewayError::Remote(_) => (
                "upstream_invalid",
                "The remote endpoint returned an unreadable reply.".to_string(),
            ),
            GatewayError::Config(_) => ("internal_error", "Something wrong happened.".to_string()),
        };
        ErrorBody { code, message }
    }
}

/// Trait implementation to convert this error into an axum http response
impl AxumCoreIntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}
