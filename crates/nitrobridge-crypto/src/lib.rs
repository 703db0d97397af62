//! NitroBridge Crypto - Cryptographic primitives for the protection core
//!
//! This crate provides:
//! - Keccak-256 hashing and event-signature topics
//! - secp256k1 session keys with EVM address derivation
//! - Raw-digest and EIP-191 recoverable signatures
//! - Canonical (sorted-key) JSON for signing structured payloads
//!
//! # Security Invariant
//!
//! **Session private keys never leave the `SessionKey` value.** Callers
//! receive addresses and hex signatures only.

pub mod hash;
pub mod keys;
pub mod canonical;

pub use hash::*;
pub use keys::*;
pub use canonical::*;

use nitrobridge_types::NitroBridgeError;
use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for NitroBridgeError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidKeyFormat(reason) => NitroBridgeError::configuration(format!("invalid key: {}", reason)),
            other => NitroBridgeError::Signing {
                reason: other.to_string(),
            },
        }
    }
}
