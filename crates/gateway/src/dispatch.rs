//! Per-request pipeline: parse, load key, canonicalize, sign, transmit,
//! map the reply.

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum_core::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::canonical::{CanonicalMessage, GatewayRequest, build_canonical_message};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, SigningError};
use crate::keys::{KeySource, PrivateKeyHandle};
use crate::signing::{MessageSigner, RsaSha256Signer, Signature};

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
/// Correlation header sent by Postman, accepted when `X-Request-Id` is absent.
pub const LEGACY_REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("postman-token");
pub const SIGNATURE_HEADER: HeaderName = HeaderName::from_static("digitalsignature");

const JSON_CONTENT_TYPE: &str = "application/json";

/// Pipeline stages in the order a POST passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStage {
    Received,
    BodyParsed,
    KeyLoaded,
    MessageBuilt,
    Signed,
    Transmitted,
    ResponseMapped,
}

impl DispatchStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStage::Received => "received",
            DispatchStage::BodyParsed => "body_parsed",
            DispatchStage::KeyLoaded => "key_loaded",
            DispatchStage::MessageBuilt => "message_built",
            DispatchStage::Signed => "signed",
            DispatchStage::Transmitted => "transmitted",
            DispatchStage::ResponseMapped => "response_mapped",
        }
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a request: the stage that could not be reached and why.
#[derive(Debug, thiserror::Error)]
#[error("dispatch failed at {stage}: {source}")]
pub struct DispatchError {
    pub stage: DispatchStage,
    #[source]
    pub source: GatewayError,
}

fn at(stage: DispatchStage) -> impl FnOnce(GatewayError) -> DispatchError {
    move |source| DispatchError { stage, source }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        self.source.into_response()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundMethod {
    Get,
    Post,
}

impl OutboundMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundMethod::Get => "GET",
            OutboundMethod::Post => "POST",
        }
    }
}

/// Everything sent to the remote endpoint for one inbound request.
#[derive(Debug)]
pub struct OutboundEnvelope {
    pub method: OutboundMethod,
    pub request_id: String,
    pub signature: Option<Signature>,
    pub body: Option<CanonicalMessage>,
}

impl OutboundEnvelope {
    pub fn get(request_id: String) -> Self {
        Self {
            method: OutboundMethod::Get,
            request_id,
            signature: None,
            body: None,
        }
    }

    pub fn post(request_id: String, body: CanonicalMessage, signature: Signature) -> Self {
        Self {
            method: OutboundMethod::Post,
            request_id,
            signature: Some(signature),
            body: Some(body),
        }
    }

    /// Outbound headers. Only a POST carries a content type and signature.
    pub fn headers(&self, config: &GatewayConfig) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            REQUEST_ID_HEADER,
            HeaderValue::from_str(&self.request_id).map_err(|_| {
                GatewayError::BadRequest("correlation id is not a valid header value".into())
            })?,
        );
        if self.method == OutboundMethod::Post {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
        }
        if let Some(signature) = &self.signature {
            headers.insert(
                SIGNATURE_HEADER,
                HeaderValue::from_str(signature.as_str())
                    .map_err(|err| GatewayError::Signing(SigningError::Encoding(err.to_string())))?,
            );
        }
        let mut authorization = HeaderValue::from_str(&config.authorization())
            .map_err(|_| GatewayError::Config("bearer token is not a valid header value".into()))?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);
        Ok(headers)
    }
}

/// What the caller gets back when the remote endpoint replied, whatever
/// its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayResponse {
    #[serde(rename = "response-code")]
    pub response_code: String,
    #[serde(rename = "time-stamp")]
    pub time_stamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
}

impl GatewayResponse {
    pub fn new(status: StatusCode, body: &[u8]) -> Self {
        Self {
            response_code: status_line(status),
            time_stamp: Utc::now(),
            body: String::from_utf8_lossy(body).into_owned(),
        }
    }
}

/// `"<code> <reason>"`, or the bare code when the status has no registered
/// reason phrase.
fn status_line(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {reason}", status.as_u16()),
        None => status.as_u16().to_string(),
    }
}

/// Correlation id of the inbound request, or a fresh one.
pub fn correlation_id(headers: &HeaderMap) -> String {
    [REQUEST_ID_HEADER, LEGACY_REQUEST_ID_HEADER]
        .iter()
        .filter_map(|name| headers.get(name))
        .filter_map(|value| value.to_str().ok())
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Signs and forwards caller requests to the remote endpoint.
///
/// Cheap to clone; everything shared between requests is read-only.
#[derive(Clone)]
pub struct GatewayDispatcher {
    config: Arc<GatewayConfig>,
    keys: KeySource,
    signer: Arc<dyn MessageSigner>,
    client: reqwest::Client,
}

impl GatewayDispatcher {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let keys = KeySource::from_config(&config)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .http1_title_case_headers()
            .build()
            .map_err(|err| GatewayError::Config(format!("building http client: {err}")))?;

        Ok(Self {
            config: Arc::new(config),
            keys,
            signer: Arc::new(RsaSha256Signer),
            client,
        })
    }

    pub fn with_signer(mut self, signer: Arc<dyn MessageSigner>) -> Self {
        self.signer = signer;
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Runs one inbound request through the pipeline. A remote non-2xx
    /// status is a successful dispatch.
    pub async fn handle_incoming(
        &self,
        method: OutboundMethod,
        payload: &[u8],
        headers: &HeaderMap,
    ) -> Result<GatewayResponse, DispatchError> {
        let request_id = correlation_id(headers);
        let span = info_span!("dispatch", request_id = %request_id, method = method.as_str());

        async move {
            debug!(stage = %DispatchStage::Received, bytes = payload.len());
            let result = self.run(method, payload, request_id).await;
            match &result {
                Ok(response) => info!(response_code = %response.response_code, "relayed remote response"),
                Err(err) => error!(stage = %err.stage, error = %err.source, "dispatch failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        method: OutboundMethod,
        payload: &[u8],
        request_id: String,
    ) -> Result<GatewayResponse, DispatchError> {
        let envelope = match method {
            OutboundMethod::Get => OutboundEnvelope::get(request_id),
            OutboundMethod::Post => {
                let request = GatewayRequest::parse(payload).map_err(at(DispatchStage::BodyParsed))?;
                debug!(stage = %DispatchStage::BodyParsed);

                let key = self
                    .keys
                    .load()
                    .map_err(|err| at(DispatchStage::KeyLoaded)(err.into()))?;
                debug!(stage = %DispatchStage::KeyLoaded, layout = ?key.layout());

                let message = build_canonical_message(&request).map_err(at(DispatchStage::MessageBuilt))?;
                debug!(
                    stage = %DispatchStage::MessageBuilt,
                    bytes = message.len(),
                    digest = %message.digest_hex(),
                );

                let signature = self.sign(&message, key).await.map_err(at(DispatchStage::Signed))?;
                debug!(stage = %DispatchStage::Signed, algorithm = self.signer.algorithm());

                OutboundEnvelope::post(request_id, message, signature)
            }
        };

        let response = self.transmit(envelope).await.map_err(at(DispatchStage::Transmitted))?;
        debug!(stage = %DispatchStage::Transmitted, status = %response.status());

        self.map_response(response).await.map_err(at(DispatchStage::ResponseMapped))
    }

    async fn sign(
        &self,
        message: &CanonicalMessage,
        key: Arc<PrivateKeyHandle>,
    ) -> Result<Signature, GatewayError> {
        let signer = Arc::clone(&self.signer);
        let bytes = message.clone().into_bytes();
        tokio::task::spawn_blocking(move || signer.sign(&bytes, &key))
            .await
            .map_err(|err| SigningError::Primitive(format!("signing task failed: {err}")))?
            .map_err(GatewayError::from)
    }

    async fn transmit(&self, envelope: OutboundEnvelope) -> Result<reqwest::Response, GatewayError> {
        let headers = envelope.headers(&self.config)?;
        let url = self.config.remote_url.clone();
        let request = match envelope.method {
            OutboundMethod::Get => self.client.get(url),
            OutboundMethod::Post => self.client.post(url),
        }
        .headers(headers);
        let request = match envelope.body {
            Some(body) => request.body(body.into_bytes()),
            None => request,
        };
        request.send().await.map_err(GatewayError::Transmission)
    }

    async fn map_response(&self, response: reqwest::Response) -> Result<GatewayResponse, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            warn!(%status, "remote endpoint returned a non-success status");
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| GatewayError::Remote(format!("reading body: {err}")))?;
        Ok(GatewayResponse::new(status, &body))
    }
}
