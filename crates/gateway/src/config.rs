use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::error::GatewayError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Process-wide gateway settings. Built once at startup and shared
/// read-only between requests.
#[derive(Clone)]
pub struct GatewayConfig {
    pub remote_url: Url,
    pub bearer_token: String,
    pub private_key_path: PathBuf,
    pub public_key_path: Option<PathBuf>,
    /// Load the private key once at startup instead of on every request.
    pub preload_key: bool,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(
        remote_url: &str,
        bearer_token: impl Into<String>,
        private_key_path: impl Into<PathBuf>,
    ) -> Result<Self, GatewayError> {
        let remote_url = Url::parse(remote_url)
            .map_err(|err| GatewayError::Config(format!("invalid remote url {remote_url:?}: {err}")))?;
        let config = Self {
            remote_url,
            bearer_token: bearer_token.into(),
            private_key_path: private_key_path.into(),
            public_key_path: None,
            preload_key: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_public_key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.public_key_path = Some(path.into());
        self
    }

    pub fn with_preloaded_key(mut self, preload: bool) -> Self {
        self.preload_key = preload;
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, request: Duration) -> Self {
        self.connect_timeout = connect;
        self.request_timeout = request;
        self
    }

    pub fn validate(&self) -> Result<(), GatewayError> {
        if !matches!(self.remote_url.scheme(), "http" | "https") {
            return Err(GatewayError::Config(format!(
                "remote url must be http or https, got {}",
                self.remote_url.scheme()
            )));
        }
        if self.bearer_token.trim().is_empty() {
            return Err(GatewayError::Config("bearer token is empty".into()));
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(GatewayError::Config("timeouts must be non-zero".into()));
        }
        Ok(())
    }

    /// Value of the outbound `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.bearer_token)
    }
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("remote_url", &self.remote_url.as_str())
            .field("bearer_token", &"<redacted>")
            .field("private_key_path", &self.private_key_path)
            .field("public_key_path", &self.public_key_path)
            .field("preload_key", &self.preload_key)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}
