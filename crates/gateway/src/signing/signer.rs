use std::fmt;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;

use crate::error::SigningError;
use crate::keys::PrivateKeyHandle;

/// Base64 (standard alphabet, unwrapped) signature over one canonical message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(String);

impl Signature {
    pub fn from_raw(raw: &[u8]) -> Self {
        Self(B64.encode(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw signature bytes.
    pub fn decode(&self) -> Result<Vec<u8>, SigningError> {
        B64.decode(&self.0)
            .map_err(|err| SigningError::Encoding(err.to_string()))
    }
}

impl From<String> for Signature {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Trait for signing canonical request bytes.
///
/// Implementations are sync — signing is CPU-bound.
/// Async callers should use `spawn_blocking`.
pub trait MessageSigner: Send + Sync {
    /// Digest and sign `message` with `key`.
    fn sign(&self, message: &[u8], key: &PrivateKeyHandle) -> Result<Signature, SigningError>;

    /// Algorithm identifier string (e.g. "rsa-pkcs1v15-sha256").
    fn algorithm(&self) -> &str;
}
