//! NitroBridge Channel - Off-chain session over NitroRPC
//!
//! A [`ChannelSession`] authenticates against a clearing relay with a
//! session key, opens an application session with a counterparty, moves
//! value off-chain and meters usage with signed events. One actor task owns
//! the socket; every handle talks to it through a command queue, so requests
//! are serialized and responses are matched by id.
//!
//! Keepalive pings run only while connected and stop when the socket closes.
//! Sessions opened through a [`Dialer`] redial with backoff when the relay
//! drops them and authenticate again before reporting `Connected`.

pub mod meter;
pub mod protocol;
pub mod relay;
pub mod session;
pub mod signer;
pub mod transport;

pub use meter::{IntentEvent, MeterLedger, MeterPayload, SettlementIntent};
pub use protocol::{Allowance, Inbound, InboundMessage, LedgerBalance, RequestEnvelope, RpcFrame};
pub use relay::{spawn_relay, RelayDialer, RelayHandle, RelayOptions};
pub use session::{ChannelConfig, ChannelSession};
pub use signer::MessageSigner;
pub use transport::{Dialer, MemoryTransport, Transport, WsDialer, WsTransport};

use nitrobridge_types::NitroBridgeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChannelError {
    #[error("Channel not connected (status {status:?})")]
    NotConnected { status: ConnectionStatus },

    #[error("No app session is open")]
    NoAppSession,

    #[error("Relay rejected {method}: {message}")]
    Rejected { method: String, message: String },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("No response to {method} in time")]
    Timeout { method: String },

    #[error("Channel closed")]
    Closed,

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
}

pub type ChannelResult<T> = std::result::Result<T, ChannelError>;

impl From<ChannelError> for NitroBridgeError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::NotConnected { .. } | ChannelError::NoAppSession => NitroBridgeError::ChannelNotReady {
                reason: err.to_string(),
            },
            ChannelError::Rejected { method, message } => NitroBridgeError::LedgerRejected {
                operation: method,
                reason: message,
            },
            ChannelError::Protocol(reason) => NitroBridgeError::ProtocolViolation { reason },
            ChannelError::Transport(reason) => NitroBridgeError::transient("channel", reason),
            ChannelError::Closed => NitroBridgeError::transient("channel", "closed"),
            ChannelError::Timeout { method } => NitroBridgeError::Timeout {
                operation: method,
                elapsed_secs: 0,
            },
            ChannelError::Signing(reason) => NitroBridgeError::Signing { reason },
            ChannelError::InvalidAmount(reason) => NitroBridgeError::invalid_input("amount", reason),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Authenticating,
    Connected,
    Error,
}

/// Snapshot of the session, published on every change
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChannelSessionState {
    pub status: ConnectionStatus,
    /// App session id once one is open
    pub session_id: Option<String>,
    pub ledger_balances: Vec<LedgerBalance>,
    pub assets: Vec<String>,
    pub auth_token: Option<String>,
    pub last_error: Option<String>,
    /// Requests still waiting for a response
    pub pending_requests: usize,
}

pub(crate) fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}
