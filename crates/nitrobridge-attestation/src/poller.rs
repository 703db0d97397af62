//! Attestation polling loop

use std::time::Duration;

use nitrobridge_crypto::keccak_word;
use nitrobridge_types::{duration_secs, Bytes32, NitroBridgeError, Result};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{AttestationClient, AttestationQuery};

/// Poll cadence and hard deadline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(15 * 60),
        }
    }
}

/// A signed attestation ready to be minted against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedAttestation {
    pub attestation: Vec<u8>,
    /// Message bytes reported by the service, if any
    pub message: Option<Vec<u8>>,
    /// Lookups performed, including the successful one
    pub polls: u32,
}

impl CompletedAttestation {
    /// Reject service-reported message bytes that do not hash to the burn-time hash
    pub fn verify_message(&self, expected: &Bytes32) -> Result<()> {
        let Some(message) = &self.message else {
            return Ok(());
        };
        let actual = keccak_word(message);
        if &actual != expected {
            return Err(NitroBridgeError::HashMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        Ok(())
    }
}

/// Poll until the attestation is complete or the deadline passes
///
/// Lookup errors of any kind are logged and retried at the next tick.
pub async fn await_attestation(
    client: &dyn AttestationClient,
    query: &AttestationQuery,
    policy: &PollPolicy,
) -> Result<CompletedAttestation> {
    let started = Instant::now();
    let mut polls = 0u32;
    loop {
        polls += 1;
        match client.fetch(query).await {
            Ok(response) if response.is_ready() => {
                info!(
                    message_hash = %query.message_hash,
                    polls,
                    elapsed_secs = started.elapsed().as_secs(),
                    "Attestation complete"
                );
                return Ok(CompletedAttestation {
                    attestation: response.attestation.unwrap_or_default(),
                    message: response.message,
                    polls,
                });
            }
            Ok(_) => debug!(message_hash = %query.message_hash, polls, "Attestation pending"),
            Err(e) => warn!(message_hash = %query.message_hash, polls, error = %e, "Attestation lookup failed"),
        }

        if started.elapsed() + policy.interval > policy.timeout {
            return Err(NitroBridgeError::timeout(
                format!("attestation of {}", query.message_hash),
                started.elapsed(),
            ));
        }
        tokio::time::sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScriptStep, ScriptedAttestationClient};
    use nitrobridge_types::TxHash;

    fn query(hash: Bytes32) -> AttestationQuery {
        AttestationQuery {
            message_hash: hash,
            source_domain: 0,
            burn_tx: TxHash([1; 32]),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_do_not_end_polling() {
        let client = ScriptedAttestationClient::new(vec![
            ScriptStep::NetworkError,
            ScriptStep::Malformed,
            ScriptStep::Pending,
            ScriptStep::Complete {
                attestation: vec![7; 65],
                message: None,
            },
        ]);
        let done = await_attestation(&client, &query(Bytes32([2; 32])), &PollPolicy::default())
            .await
            .unwrap();
        assert_eq!(done.polls, 4);
        assert_eq!(client.calls().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_fatal() {
        let client = ScriptedAttestationClient::always_pending();
        let policy = PollPolicy {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(60),
        };
        let err = await_attestation(&client, &query(Bytes32([2; 32])), &policy)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TIMEOUT");
        assert!(err.is_resumable());
        assert!(client.calls().await <= 7);
    }

    #[test]
    fn test_verify_message_hash() {
        let message = vec![1, 2, 3];
        let done = CompletedAttestation {
            attestation: vec![9],
            message: Some(message.clone()),
            polls: 1,
        };
        assert!(done.verify_message(&keccak_word(&message)).is_ok());
        let err = done.verify_message(&Bytes32([0; 32])).unwrap_err();
        assert_eq!(err.error_code(), "HASH_MISMATCH");
    }
}
