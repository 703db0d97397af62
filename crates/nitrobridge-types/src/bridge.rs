//! Bridge transfer records
//!
//! A `BridgeTransfer` is the single source of truth for resuming a
//! burn → attest → mint transfer after a crash. Every field written by a
//! step is persisted before the next suspension point.
//!
//! ```text
//! PENDING_APPROVAL → PENDING_BURN → PENDING_ATTESTATION → PENDING_MINT → COMPLETE
//!        └──────────────┴────────────────┴──────────────────┴──────→ FAILED
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::receipt::opt_hex_bytes;
use crate::{Address, Bytes32, ChainKey, ErrorKind, TokenAmount, TransferId, TxHash};

/// Lifecycle state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeState {
    PendingApproval,
    PendingBurn,
    PendingAttestation,
    PendingMint,
    Complete,
    Failed,
}

impl BridgeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// The step that moves a transfer out of this state
    pub fn pending_step(&self) -> Option<BridgeStep> {
        match self {
            Self::PendingApproval => Some(BridgeStep::Approve),
            Self::PendingBurn => Some(BridgeStep::Burn),
            Self::PendingAttestation => Some(BridgeStep::Attest),
            Self::PendingMint => Some(BridgeStep::Mint),
            Self::Complete | Self::Failed => None,
        }
    }
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingApproval => "PENDING_APPROVAL",
            Self::PendingBurn => "PENDING_BURN",
            Self::PendingAttestation => "PENDING_ATTESTATION",
            Self::PendingMint => "PENDING_MINT",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// One step of the transfer protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeStep {
    Approve,
    Burn,
    Attest,
    Mint,
}

impl BridgeStep {
    /// State a transfer is in while this step is outstanding
    pub fn pending_state(&self) -> BridgeState {
        match self {
            Self::Approve => BridgeState::PendingApproval,
            Self::Burn => BridgeState::PendingBurn,
            Self::Attest => BridgeState::PendingAttestation,
            Self::Mint => BridgeState::PendingMint,
        }
    }

    /// The step completed before this one
    pub fn previous(&self) -> Option<BridgeStep> {
        match self {
            Self::Approve => None,
            Self::Burn => Some(Self::Approve),
            Self::Attest => Some(Self::Burn),
            Self::Mint => Some(Self::Attest),
        }
    }
}

impl std::fmt::Display for BridgeStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Approve => "approve",
            Self::Burn => "burn",
            Self::Attest => "attest",
            Self::Mint => "mint",
        };
        write!(f, "{}", s)
    }
}

/// Where the transferred value currently sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundsLocation {
    /// Nothing burned; the full amount is still spendable on the source chain
    Source,
    /// A burn was submitted but its receipt has not been observed
    BurnUnconfirmed,
    /// Burned on the source chain, not yet minted on the destination
    InFlight,
    /// Minted on the destination chain
    Destination,
}

/// Why a transfer stopped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeFailure {
    /// Step that was executing when the failure happened
    pub step: BridgeStep,
    pub kind: ErrorKind,
    pub message: String,
    /// Whether `resume` can pick the transfer up from persisted state
    pub resumable: bool,
    pub failed_at: DateTime<Utc>,
}

/// A cross-chain burn → attest → mint transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeTransfer {
    pub id: TransferId,
    pub source_chain: ChainKey,
    pub dest_chain: ChainKey,
    /// CCTP domain of the destination chain
    pub dest_domain: u32,
    pub amount: TokenAmount,
    pub sender: Address,
    pub recipient: Address,
    pub state: BridgeState,
    #[serde(default)]
    pub approve_tx: Option<TxHash>,
    #[serde(default)]
    pub burn_tx: Option<TxHash>,
    #[serde(default, with = "opt_hex_bytes")]
    pub message_bytes: Option<Vec<u8>>,
    #[serde(default)]
    pub message_hash: Option<Bytes32>,
    #[serde(default, with = "opt_hex_bytes")]
    pub attestation: Option<Vec<u8>>,
    #[serde(default)]
    pub mint_tx: Option<TxHash>,
    /// Whether the mint receipt has been observed
    #[serde(default)]
    pub mint_confirmed: bool,
    #[serde(default)]
    pub failure: Option<BridgeFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BridgeTransfer {
    /// Create a new transfer in `PENDING_APPROVAL`
    pub fn new(
        source_chain: ChainKey,
        dest_chain: ChainKey,
        dest_domain: u32,
        amount: TokenAmount,
        sender: Address,
        recipient: Address,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransferId::new(),
            source_chain,
            dest_chain,
            dest_domain,
            amount,
            sender,
            recipient,
            state: BridgeState::PendingApproval,
            approve_tx: None,
            burn_tx: None,
            message_bytes: None,
            message_hash: None,
            attestation: None,
            mint_tx: None,
            mint_confirmed: false,
            failure: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to a new state and stamp the update time
    pub fn transition(&mut self, state: BridgeState) {
        self.state = state;
        self.updated_at = Utc::now();
    }

    /// Record a failure at `step` and move to `FAILED`
    pub fn fail(&mut self, step: BridgeStep, kind: ErrorKind, message: impl Into<String>, resumable: bool) {
        self.failure = Some(BridgeFailure {
            step,
            kind,
            message: message.into(),
            resumable,
            failed_at: Utc::now(),
        });
        self.transition(BridgeState::Failed);
    }

    pub fn is_complete(&self) -> bool {
        self.state == BridgeState::Complete
    }

    /// Whether the burn has been confirmed on the source chain
    pub fn is_burned(&self) -> bool {
        self.message_hash.is_some() && self.message_bytes.is_some()
    }

    /// Where the value currently sits, derived from persisted evidence
    pub fn funds_location(&self) -> FundsLocation {
        if self.mint_confirmed {
            FundsLocation::Destination
        } else if self.is_burned() {
            FundsLocation::InFlight
        } else if self.burn_tx.is_some() {
            FundsLocation::BurnUnconfirmed
        } else {
            FundsLocation::Source
        }
    }

    /// Amount still held in source form (zero once the burn is confirmed)
    pub fn amount_at_source(&self) -> TokenAmount {
        match self.funds_location() {
            FundsLocation::Source => self.amount,
            _ => TokenAmount::ZERO,
        }
    }

    /// The last step whose effects are confirmed
    pub fn last_completed_step(&self) -> Option<BridgeStep> {
        if self.mint_confirmed {
            Some(BridgeStep::Mint)
        } else if self.attestation.is_some() {
            Some(BridgeStep::Attest)
        } else if self.is_burned() {
            Some(BridgeStep::Burn)
        } else if self.state == BridgeState::PendingBurn
            || self.failure.as_ref().map(|f| f.step) == Some(BridgeStep::Burn)
        {
            Some(BridgeStep::Approve)
        } else {
            None
        }
    }

    /// The step a resume should execute next
    pub fn next_step(&self) -> Option<BridgeStep> {
        if self.state == BridgeState::Complete {
            return None;
        }
        match self.last_completed_step() {
            None => Some(BridgeStep::Approve),
            Some(BridgeStep::Approve) => Some(BridgeStep::Burn),
            Some(BridgeStep::Burn) => Some(BridgeStep::Attest),
            Some(BridgeStep::Attest) => Some(BridgeStep::Mint),
            Some(BridgeStep::Mint) => None,
        }
    }
}
