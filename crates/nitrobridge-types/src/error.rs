//! Error types for NitroBridge
//!
//! Every failure is classified into an [`ErrorKind`] so callers decide
//! between retrying, resuming and giving up without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for NitroBridge operations
pub type Result<T> = std::result::Result<T, NitroBridgeError>;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing required address or key; fatal at startup
    Configuration,
    /// RPC or HTTP failure; retried with bounded backoff
    TransientNetwork,
    /// Missing event, hash mismatch or reverted transaction; fatal for the workflow
    ProtocolViolation,
    /// A wait exceeded its budget; resumable from last-good state
    Timeout,
    /// Caller supplied something unusable
    InvalidInput,
    /// Local invariant broken
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Configuration => "configuration",
            Self::TransientNetwork => "transient_network",
            Self::ProtocolViolation => "protocol_violation",
            Self::Timeout => "timeout",
            Self::InvalidInput => "invalid_input",
            Self::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

/// NitroBridge error types
#[derive(Debug, Clone, Error)]
pub enum NitroBridgeError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================

    /// Missing or malformed configuration
    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    /// Chain not present in the registry
    #[error("Unknown chain '{chain}'")]
    UnknownChain { chain: String },

    // ========================================================================
    // Network Errors
    // ========================================================================

    /// RPC/HTTP/socket failure that may succeed on retry
    #[error("Transient network error during {operation}: {reason}")]
    TransientNetwork { operation: String, reason: String },

    /// A wait exceeded its budget
    #[error("Timed out after {elapsed_secs}s waiting for {operation}")]
    Timeout { operation: String, elapsed_secs: u64 },

    // ========================================================================
    // Protocol Errors
    // ========================================================================

    /// The counterparty broke the protocol contract
    #[error("Protocol violation: {reason}")]
    ProtocolViolation { reason: String },

    /// Transaction was mined but reverted
    #[error("Transaction {tx_hash} reverted during {operation}")]
    TransactionReverted { tx_hash: String, operation: String },

    /// An expected event log is absent from a receipt
    #[error("Event {event} not found in transaction {tx_hash}")]
    MissingEvent { event: String, tx_hash: String },

    /// Two hashes that must agree do not
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    /// The ledger rejected a call before inclusion
    #[error("Ledger rejected {operation}: {reason}")]
    LedgerRejected { operation: String, reason: String },

    // ========================================================================
    // Amount Errors
    // ========================================================================

    /// Amount overflow during arithmetic
    #[error("Amount overflow during arithmetic operation")]
    AmountOverflow,

    /// Amount underflow during arithmetic
    #[error("Amount underflow during arithmetic operation")]
    AmountUnderflow,

    /// Division by zero
    #[error("Division by zero")]
    DivisionByZero,

    /// Source balance does not cover the request
    #[error("Insufficient balance for {account}: requested {requested}, available {available}")]
    InsufficientBalance {
        account: String,
        requested: String,
        available: String,
    },

    // ========================================================================
    // Workflow Errors
    // ========================================================================

    /// Transfer not found in the store
    #[error("Transfer {transfer_id} not found")]
    TransferNotFound { transfer_id: String },

    /// Operation is not valid in the current workflow state
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    /// Reveal attempted before the commitment reached its minimum age
    #[error("Reveal too early: current block {current_block}, earliest block {earliest_block}")]
    RevealTooEarly { current_block: u64, earliest_block: u64 },

    /// Channel session is not connected or has no open app session
    #[error("Channel not ready: {reason}")]
    ChannelNotReady { reason: String },

    /// Signing failed
    #[error("Signing failed: {reason}")]
    Signing { reason: String },

    /// Persisting or loading workflow state failed
    #[error("Storage error: {reason}")]
    Storage { reason: String },

    // ========================================================================
    // General Errors
    // ========================================================================

    /// Invalid input
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    /// Internal error
    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl NitroBridgeError {
    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Create an invalid input error
    pub fn invalid_input(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Create a transient network error
    pub fn transient(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::TransientNetwork {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a protocol violation
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, elapsed: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs: elapsed.as_secs(),
        }
    }

    /// Create a storage error
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } | Self::UnknownChain { .. } => ErrorKind::Configuration,
            Self::TransientNetwork { .. } => ErrorKind::TransientNetwork,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::ProtocolViolation { .. }
            | Self::TransactionReverted { .. }
            | Self::MissingEvent { .. }
            | Self::HashMismatch { .. }
            | Self::LedgerRejected { .. } => ErrorKind::ProtocolViolation,
            Self::AmountOverflow
            | Self::AmountUnderflow
            | Self::DivisionByZero
            | Self::InsufficientBalance { .. }
            | Self::InvalidInput { .. }
            | Self::RevealTooEarly { .. }
            | Self::TransferNotFound { .. }
            | Self::InvalidState { .. }
            | Self::ChannelNotReady { .. } => ErrorKind::InvalidInput,
            Self::Signing { .. } | Self::Storage { .. } | Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Check if this is a retriable error
    ///
    /// Only transient network failures are retried. Timeouts are resumable
    /// from persisted state but are never retried in place.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    /// Whether a workflow that hit this error can be resumed later
    pub fn is_resumable(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientNetwork | ErrorKind::Timeout)
    }

    /// Get a stable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::UnknownChain { .. } => "UNKNOWN_CHAIN",
            Self::TransientNetwork { .. } => "TRANSIENT_NETWORK_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ProtocolViolation { .. } => "PROTOCOL_VIOLATION",
            Self::TransactionReverted { .. } => "TRANSACTION_REVERTED",
            Self::MissingEvent { .. } => "MISSING_EVENT",
            Self::HashMismatch { .. } => "HASH_MISMATCH",
            Self::LedgerRejected { .. } => "LEDGER_REJECTED",
            Self::AmountOverflow => "AMOUNT_OVERFLOW",
            Self::AmountUnderflow => "AMOUNT_UNDERFLOW",
            Self::DivisionByZero => "DIVISION_BY_ZERO",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::TransferNotFound { .. } => "TRANSFER_NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::RevealTooEarly { .. } => "REVEAL_TOO_EARLY",
            Self::ChannelNotReady { .. } => "CHANNEL_NOT_READY",
            Self::Signing { .. } => "SIGNING_FAILED",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = NitroBridgeError::MissingEvent {
            event: "MessageSent".to_string(),
            tx_hash: "0x01".to_string(),
        };
        assert_eq!(err.error_code(), "MISSING_EVENT");
        assert_eq!(err.kind(), ErrorKind::ProtocolViolation);
    }

    #[test]
    fn test_retriable_errors() {
        assert!(NitroBridgeError::transient("eth_call", "connection reset").is_retriable());
        let reverted = NitroBridgeError::TransactionReverted {
            tx_hash: "0x01".to_string(),
            operation: "approve".to_string(),
        };
        assert!(!reverted.is_retriable());
        assert!(!NitroBridgeError::timeout("attestation", std::time::Duration::from_secs(900)).is_retriable());
    }

    #[test]
    fn test_timeout_is_resumable() {
        let err = NitroBridgeError::timeout("attestation", std::time::Duration::from_secs(900));
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.is_resumable());
        assert!(!NitroBridgeError::protocol("bad").is_resumable());
    }
}
