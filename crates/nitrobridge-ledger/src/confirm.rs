//! Waiting for inclusion
//!
//! A submitted transaction is only trusted once its receipt is observed and
//! its status flag checked. Poll errors while waiting are not fatal; the
//! wait ends on a receipt or on the deadline. A poll that never answers is
//! cut off at the deadline too.

use std::time::Duration;

use nitrobridge_types::{duration_ms, NitroBridgeError, Result, TxHash, TxReceipt};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::LedgerClient;

/// How long and how often to poll for a receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationPolicy {
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            timeout: Duration::from_secs(180),
        }
    }
}

/// Poll until the receipt for `tx` is available or the policy times out
pub async fn wait_for_receipt(
    ledger: &dyn LedgerClient,
    tx: TxHash,
    policy: &ConfirmationPolicy,
) -> Result<TxReceipt> {
    let started = Instant::now();
    let deadline = started + policy.timeout;
    let expired = || {
        NitroBridgeError::timeout(
            format!("receipt of {} on {}", tx, ledger.chain().key),
            started.elapsed(),
        )
    };
    loop {
        let poll = tokio::time::timeout_at(deadline, ledger.transaction_receipt(tx))
            .await
            .map_err(|_| expired())?;
        match poll {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => debug!(chain = %ledger.chain().key, tx = %tx, "Receipt not yet available"),
            Err(e) if e.is_retriable() => {
                warn!(chain = %ledger.chain().key, tx = %tx, error = %e, "Receipt poll failed")
            }
            Err(e) => return Err(e),
        }
        if started.elapsed() + policy.poll_interval > policy.timeout {
            return Err(expired());
        }
        tokio::time::sleep(policy.poll_interval).await;
    }
}

/// Fail with `TransactionReverted` unless the receipt's status flag is set
pub fn require_success(receipt: TxReceipt, operation: &str) -> Result<TxReceipt> {
    if receipt.success {
        Ok(receipt)
    } else {
        Err(NitroBridgeError::TransactionReverted {
            tx_hash: receipt.tx_hash.to_string(),
            operation: operation.to_string(),
        })
    }
}

/// Wait for inclusion and require success
pub async fn confirm(
    ledger: &dyn LedgerClient,
    tx: TxHash,
    operation: &str,
    policy: &ConfirmationPolicy,
) -> Result<TxReceipt> {
    let receipt = wait_for_receipt(ledger, tx, policy).await?;
    require_success(receipt, operation)
}
