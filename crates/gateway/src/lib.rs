pub mod canonical;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod keys;
pub mod server;
pub mod signing;

#[cfg(test)]
mod fixtures;

pub use canonical::{CanonicalMessage, GatewayRequest, IdentityRequest, build_canonical_message};
pub use config::GatewayConfig;
pub use dispatch::{DispatchError, DispatchStage, GatewayDispatcher, GatewayResponse, OutboundMethod};
pub use error::{GatewayError, KeyError, SigningError};
pub use keys::{KeyLayout, KeySource, PrivateKeyHandle, PublicKeyHandle, load_private_key, load_public_key};
pub use server::{AppState, router, run};
pub use signing::{MessageSigner, RsaSha256Signer, Signature, verify};
