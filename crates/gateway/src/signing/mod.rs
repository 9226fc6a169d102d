mod signer;
mod rsa;

pub use signer::{MessageSigner, Signature};
pub use self::rsa::{MIN_RSA_KEY_BITS, RsaSha256Signer, verify};
