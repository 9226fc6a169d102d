use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::der::pem;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::{debug, info};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, KeyError};

/// PEM labels accepted for private keys. `RSA PRIVATE KEY` is the
/// conventional PKCS#1 label, `PRIVATE KEY` the PKCS#8 one, but either
/// binary layout is accepted under either label.
pub const PRIVATE_KEY_LABELS: [&str; 2] = ["RSA PRIVATE KEY", "PRIVATE KEY"];

/// PEM labels accepted for public keys (PKCS#1 and SPKI).
pub const PUBLIC_KEY_LABELS: [&str; 2] = ["RSA PUBLIC KEY", "PUBLIC KEY"];

/// Binary layout a key was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyLayout {
    /// `RSAPrivateKey` / `RSAPublicKey` (RFC 8017).
    Pkcs1,
    /// `PrivateKeyInfo` (RFC 5208) or `SubjectPublicKeyInfo`.
    Pkcs8,
}

/// A parsed RSA private key.
///
/// The key material never leaves this type except as a signing key, and
/// `Debug` only reports the layout and modulus size.
#[derive(Clone)]
pub struct PrivateKeyHandle {
    key: RsaPrivateKey,
    layout: KeyLayout,
}

impl PrivateKeyHandle {
    pub fn new(key: RsaPrivateKey, layout: KeyLayout) -> Self {
        Self { key, layout }
    }

    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.key.size() * 8
    }

    pub fn public_key(&self) -> RsaPublicKey {
        self.key.to_public_key()
    }

    pub(crate) fn rsa(&self) -> &RsaPrivateKey {
        &self.key
    }
}

impl fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyHandle")
            .field("layout", &self.layout)
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// A parsed RSA public key, used to verify gateway signatures.
#[derive(Debug, Clone, PartialEq)]
pub struct PublicKeyHandle {
    key: RsaPublicKey,
    layout: KeyLayout,
}

impl PublicKeyHandle {
    pub fn new(key: RsaPublicKey, layout: KeyLayout) -> Self {
        Self { key, layout }
    }

    pub fn layout(&self) -> KeyLayout {
        self.layout
    }

    pub fn rsa(&self) -> &RsaPublicKey {
        &self.key
    }

    /// Whether this is the public half of `private`.
    pub fn matches(&self, private: &PrivateKeyHandle) -> bool {
        self.key == private.public_key()
    }
}

/// Reads and parses a PEM-wrapped RSA private key from `path`.
pub fn load_private_key(path: impl AsRef<Path>) -> Result<PrivateKeyHandle, KeyError> {
    let text = read_key_file(path.as_ref())?;
    load_private_key_pem(&text)
}

/// Parses a PEM-wrapped RSA private key, trying PKCS#1 then PKCS#8.
pub fn load_private_key_pem(text: &str) -> Result<PrivateKeyHandle, KeyError> {
    let der = decode_envelope(text, &PRIVATE_KEY_LABELS)?;

    let pkcs1_err = match RsaPrivateKey::from_pkcs1_der(&der) {
        Ok(key) => return Ok(PrivateKeyHandle::new(key, KeyLayout::Pkcs1)),
        Err(err) => err,
    };
    match RsaPrivateKey::from_pkcs8_der(&der) {
        Ok(key) => Ok(PrivateKeyHandle::new(key, KeyLayout::Pkcs8)),
        Err(pkcs8_err) => Err(KeyError::Parse(format!(
            "not PKCS#1 ({pkcs1_err}) nor PKCS#8 ({pkcs8_err})"
        ))),
    }
}

/// Reads and parses a PEM-wrapped RSA public key from `path`.
pub fn load_public_key(path: impl AsRef<Path>) -> Result<PublicKeyHandle, KeyError> {
    let text = read_key_file(path.as_ref())?;
    load_public_key_pem(&text)
}

/// Parses a PEM-wrapped RSA public key, trying PKCS#1 then SPKI.
pub fn load_public_key_pem(text: &str) -> Result<PublicKeyHandle, KeyError> {
    let der = decode_envelope(text, &PUBLIC_KEY_LABELS)?;

    let pkcs1_err = match RsaPublicKey::from_pkcs1_der(&der) {
        Ok(key) => return Ok(PublicKeyHandle::new(key, KeyLayout::Pkcs1)),
        Err(err) => err,
    };
    match RsaPublicKey::from_public_key_der(&der) {
        Ok(key) => Ok(PublicKeyHandle::new(key, KeyLayout::Pkcs8)),
        Err(spki_err) => Err(KeyError::Parse(format!(
            "not PKCS#1 ({pkcs1_err}) nor SPKI ({spki_err})"
        ))),
    }
}

/// Where the dispatcher gets its private key from.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Read and parse the files on every request. A configured public key
    /// is checked against each private key loaded.
    PerRequest {
        private: PathBuf,
        public: Option<PathBuf>,
    },
    /// Loaded once at startup and shared between requests.
    Preloaded(Arc<PrivateKeyHandle>),
}

impl KeySource {
    /// Builds the key source described by `config`. When a public key is
    /// configured the pair is checked: once here when preloading, otherwise
    /// on every load.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        if !config.preload_key {
            if let Some(public) = &config.public_key_path {
                info!(public_key = %public.display(), "key pair checked on each request");
            }
            return Ok(KeySource::PerRequest {
                private: config.private_key_path.clone(),
                public: config.public_key_path.clone(),
            });
        }

        let private = load_pair(&config.private_key_path, config.public_key_path.as_deref())?;
        info!(layout = ?private.layout(), bits = private.bits(), "preloaded signing key");
        Ok(KeySource::Preloaded(Arc::new(private)))
    }

    pub fn load(&self) -> Result<Arc<PrivateKeyHandle>, KeyError> {
        match self {
            KeySource::PerRequest { private, public } => {
                load_pair(private, public.as_deref()).map(Arc::new)
            }
            KeySource::Preloaded(key) => Ok(Arc::clone(key)),
        }
    }
}

/// Loads the private key and, when given, checks `public` is its other half.
fn load_pair(private: &Path, public: Option<&Path>) -> Result<PrivateKeyHandle, KeyError> {
    let key = load_private_key(private)?;
    if let Some(public_path) = public {
        if !load_public_key(public_path)?.matches(&key) {
            return Err(KeyError::Mismatch {
                path: public_path.to_path_buf(),
            });
        }
        debug!(public_key = %public_path.display(), "key pair matches");
    }
    Ok(key)
}

fn read_key_file(path: &Path) -> Result<String, KeyError> {
    let bytes = std::fs::read(path).map_err(|source| KeyError::NotFound {
        path: path.to_path_buf(),
        source,
    })?;
    String::from_utf8(bytes).map_err(|_| KeyError::Format("key file is not PEM text".into()))
}

/// Decodes the PEM envelope and checks its label against `expected`.
///
/// Text before the first `-----BEGIN ` line (OpenSSL `Bag Attributes`,
/// comments) is skipped.
fn decode_envelope(text: &str, expected: &[&str]) -> Result<Vec<u8>, KeyError> {
    let envelope = match text.find("-----BEGIN ") {
        Some(start) => &text[start..],
        None => text.trim_start(),
    };
    let (label, der) = pem::decode_vec(envelope.as_bytes())
        .map_err(|err| KeyError::Format(format!("no PEM envelope found: {err}")))?;

    if !expected.contains(&label) {
        return Err(KeyError::Format(format!(
            "unexpected PEM type label {label:?}"
        )));
    }
    Ok(der)
}
