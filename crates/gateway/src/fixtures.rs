//! Deterministic RSA keys for unit tests.

use std::io::Write;
use std::sync::LazyLock;

use rand_chacha::ChaCha20Rng;
use rand_chacha::rand_core::SeedableRng;
use rsa::RsaPrivateKey;
use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey};
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

pub const KEY_BITS: usize = 2048;

static PRIVATE_KEY: LazyLock<RsaPrivateKey> = LazyLock::new(|| key_from_seed("gateway-test", KEY_BITS));
static OTHER_PRIVATE_KEY: LazyLock<RsaPrivateKey> =
    LazyLock::new(|| key_from_seed("gateway-other", KEY_BITS));

pub fn key_from_seed(seed: &str, bits: usize) -> RsaPrivateKey {
    let hash = Sha256::digest(seed.as_bytes());
    let mut rng = ChaCha20Rng::from_seed(hash.into());
    RsaPrivateKey::new(&mut rng, bits).unwrap()
}

pub fn private_key() -> &'static RsaPrivateKey {
    &PRIVATE_KEY
}

pub fn other_private_key() -> &'static RsaPrivateKey {
    &OTHER_PRIVATE_KEY
}

pub fn pkcs1_pem() -> String {
    private_key().to_pkcs1_pem(LineEnding::LF).unwrap().as_str().to_owned()
}

pub fn pkcs8_pem() -> String {
    private_key().to_pkcs8_pem(LineEnding::LF).unwrap().as_str().to_owned()
}

pub fn public_key_pem() -> String {
    private_key()
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .unwrap()
}

pub fn public_key_pkcs1_pem() -> String {
    private_key()
        .to_public_key()
        .to_pkcs1_pem(LineEnding::LF)
        .unwrap()
}

pub fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}
