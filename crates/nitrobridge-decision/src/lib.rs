//! NitroBridge Decision - Top-up verdicts for a credit line
//!
//! A decision provider turns a utilization reading into a structured
//! verdict. Providers come in two kinds:
//!
//! - [`RuleBasedProvider`]: deterministic, always available
//! - [`OpenAiCompatProvider`]: any OpenAI-compatible chat completions endpoint
//!
//! ## Key Design Principles
//!
//! 1. A model may **propose** a top-up, never execute one
//! 2. Every remote verdict is parsed and validated before use
//! 3. [`DecisionRouter`] always answers: a failed, slow or malformed remote
//!    call falls back to the rule-based provider and logs the cause

pub mod remote;
pub mod router;
pub mod rules;

pub use remote::{build_prompt, parse_decision, strip_code_fences, OpenAiCompatConfig, OpenAiCompatProvider};
pub use router::{DecisionConfig, DecisionRouter, DecisionSource, ProviderKind, RoutedDecision};
pub use rules::RuleBasedProvider;

use async_trait::async_trait;
use nitrobridge_types::{Address, CreditLine, NitroBridgeError, TokenAmount};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecisionError {
    #[error("Provider {provider} unavailable: {reason}")]
    Unavailable { provider: String, reason: String },

    #[error("Decision request failed: {message}")]
    RequestFailed { message: String },

    #[error("Malformed decision: {message}")]
    Malformed { message: String },

    #[error("Decision timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

pub type DecisionResult<T> = std::result::Result<T, DecisionError>;

impl From<DecisionError> for NitroBridgeError {
    fn from(err: DecisionError) -> Self {
        match err {
            DecisionError::Unavailable { provider, reason } => NitroBridgeError::transient(provider, reason),
            DecisionError::RequestFailed { message } => NitroBridgeError::transient("decision", message),
            DecisionError::Malformed { message } => NitroBridgeError::protocol(message),
            DecisionError::Timeout { elapsed_ms } => {
                NitroBridgeError::timeout("decision", std::time::Duration::from_millis(elapsed_ms))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionAction {
    TopUp,
    Monitor,
}

/// A verdict; `amount` is the recommended top-up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub action: DecisionAction,
    pub amount: TokenAmount,
    pub reason: String,
}

impl Decision {
    /// Whether this verdict asks for value to move
    pub fn wants_top_up(&self) -> bool {
        self.action == DecisionAction::TopUp && !self.amount.is_zero()
    }
}

/// What a provider decides on
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecisionRequest {
    pub address: Address,
    /// Borrowed over credit limit, in percent with two decimals
    pub utilization_pct: f64,
}

impl DecisionRequest {
    pub fn new(address: Address, utilization_pct: f64) -> Self {
        Self {
            address,
            utilization_pct,
        }
    }

    pub fn from_credit(address: Address, line: &CreditLine) -> Self {
        Self::new(address, line.utilization_pct())
    }
}

/// Source of top-up verdicts
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn decide(&self, request: &DecisionRequest) -> DecisionResult<Decision>;
}
