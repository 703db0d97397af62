//! NitroBridge Attestation - Cross-chain message attestations
//!
//! A burn on the source chain can only be minted on the destination once
//! the attestation service has signed the message. This crate provides:
//!
//! - [`AttestationClient`]: one status lookup against the service
//! - [`IrisClient`]: HTTP implementation for both API generations
//! - [`await_attestation`]: the polling loop with a fixed interval and a hard deadline
//! - [`ScriptedAttestationClient`]: a replayable client for tests and demos
//!
//! Individual lookup failures are never fatal; only the deadline is.

pub mod iris;
pub mod poller;
pub mod scripted;

pub use iris::IrisClient;
pub use poller::{await_attestation, CompletedAttestation, PollPolicy};
pub use scripted::{ScriptStep, ScriptedAttestationClient};

use async_trait::async_trait;
use nitrobridge_types::{Bytes32, Result, TxHash};
use serde::{Deserialize, Serialize};

/// Attestation API generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    /// Lookup by message hash
    V1,
    /// Lookup by source domain and burn transaction; returns the message too
    #[default]
    V2,
}

/// Everything known about a burn; each API generation uses its own subset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttestationQuery {
    pub message_hash: Bytes32,
    pub source_domain: u32,
    pub burn_tx: TxHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestationStatus {
    Pending,
    Complete,
}

/// Result of a single lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationResponse {
    pub status: AttestationStatus,
    pub attestation: Option<Vec<u8>>,
    /// Message bytes as seen by the service (v2 only)
    pub message: Option<Vec<u8>>,
}

impl AttestationResponse {
    pub fn pending() -> Self {
        Self {
            status: AttestationStatus::Pending,
            attestation: None,
            message: None,
        }
    }

    pub fn complete(attestation: Vec<u8>, message: Option<Vec<u8>>) -> Self {
        Self {
            status: AttestationStatus::Complete,
            attestation: Some(attestation),
            message,
        }
    }

    /// Complete and actually carrying a signature
    pub fn is_ready(&self) -> bool {
        self.status == AttestationStatus::Complete
            && self.attestation.as_ref().is_some_and(|a| !a.is_empty())
    }
}

/// Attestation service lookup
#[async_trait]
pub trait AttestationClient: Send + Sync {
    fn api_version(&self) -> ApiVersion;

    /// One status lookup; a not-yet-indexed message is `Pending`, not an error
    async fn fetch(&self, query: &AttestationQuery) -> Result<AttestationResponse>;
}
