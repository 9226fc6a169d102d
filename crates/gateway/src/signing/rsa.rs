use rsa::Pkcs1v15Sign;
use rsa::rand_core::OsRng;
use sha2::{Digest, Sha256};

use super::signer::{MessageSigner, Signature};
use crate::error::SigningError;
use crate::keys::{PrivateKeyHandle, PublicKeyHandle};

/// Smallest modulus accepted for signing.
pub const MIN_RSA_KEY_BITS: usize = 2048;

/// RSA PKCS#1 v1.5 signer with SHA-256 digest.
///
/// Blinding randomness comes from the OS CSPRNG; the padding itself is
/// deterministic, so signatures over equal input are equal.
#[derive(Debug, Clone, Default)]
pub struct RsaSha256Signer;

impl RsaSha256Signer {
    fn check_key(key: &PrivateKeyHandle) -> Result<(), SigningError> {
        if key.bits() < MIN_RSA_KEY_BITS {
            return Err(SigningError::KeyTooSmall {
                bits: key.bits(),
                min: MIN_RSA_KEY_BITS,
            });
        }
        // Same check `RsaPrivateKey::from_components` runs when a key is
        // decoded; inconsistent PEM input already fails as `KeyError::Parse`.
        key.rsa()
            .validate()
            .map_err(|err| SigningError::InvalidKey(err.to_string()))
    }
}

impl MessageSigner for RsaSha256Signer {
    fn sign(&self, message: &[u8], key: &PrivateKeyHandle) -> Result<Signature, SigningError> {
        Self::check_key(key)?;

        let digest = Sha256::digest(message);
        let raw = key
            .rsa()
            .sign_with_rng(&mut OsRng, Pkcs1v15Sign::new::<Sha256>(), &digest)
            .map_err(|err| SigningError::Primitive(err.to_string()))?;

        Ok(Signature::from_raw(&raw))
    }

    fn algorithm(&self) -> &str {
        "rsa-pkcs1v15-sha256"
    }
}

/// Verifies a base64 RSA PKCS#1 v1.5 SHA-256 signature over `message`.
pub fn verify(
    message: &[u8],
    signature: &Signature,
    public_key: &PublicKeyHandle,
) -> Result<(), SigningError> {
    let raw = signature.decode()?;
    let digest = Sha256::digest(message);
    public_key
        .rsa()
        .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &raw)
        .map_err(|_| SigningError::Verification)
}
