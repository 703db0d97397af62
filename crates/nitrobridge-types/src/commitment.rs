//! Commit-reveal records
//!
//! A commitment hides `(amount, nonce, trader)` behind a hash for at least
//! `min_age` blocks. The nonce never leaves the committing process before
//! the reveal, so it is not part of this record.

use serde::{Deserialize, Serialize};

use crate::{Address, Bytes32, TxHash};

/// Phase of one (trader, pool) commit-reveal swap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapPhase {
    Idle,
    Committed,
    Revealed,
    Executed,
    Error,
}

impl std::fmt::Display for SwapPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "IDLE",
            Self::Committed => "COMMITTED",
            Self::Revealed => "REVEALED",
            Self::Executed => "EXECUTED",
            Self::Error => "ERROR",
        };
        write!(f, "{}", s)
    }
}

/// An on-chain commitment as observed by the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub trader: Address,
    pub pool_id: Bytes32,
    pub hash: Bytes32,
    /// Block in which the commit was included
    pub block_number: u64,
    pub revealed: bool,
    #[serde(default)]
    pub commit_tx: Option<TxHash>,
}

/// Identifies a pool: the two currencies, fee tier, tick spacing and hook contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub currency0: Address,
    pub currency1: Address,
    /// Fee in hundredths of a basis point (3000 = 0.30%)
    pub fee: u32,
    pub tick_spacing: i32,
    pub hooks: Address,
}

impl PoolKey {
    /// Standard 0.30% pool with tick spacing 60
    pub fn standard(currency0: Address, currency1: Address, hooks: Address) -> Self {
        Self {
            currency0,
            currency1,
            fee: 3000,
            tick_spacing: 60,
            hooks,
        }
    }
}

/// An exact-input swap against a pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    /// `true` swaps currency0 for currency1
    pub zero_for_one: bool,
    pub amount_in: crate::TokenAmount,
}

impl Commitment {
    /// First block at which a reveal is accepted
    pub fn earliest_reveal_block(&self, min_age: u64) -> u64 {
        self.block_number.saturating_add(min_age)
    }

    /// Whether the commitment is old enough to reveal at `current_block`
    pub fn is_mature(&self, current_block: u64, min_age: u64) -> bool {
        current_block >= self.earliest_reveal_block(min_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maturity_boundary() {
        let c = Commitment {
            trader: Address::zero(),
            pool_id: Bytes32::zero(),
            hash: Bytes32([1u8; 32]),
            block_number: 100,
            revealed: false,
            commit_tx: None,
        };
        assert!(!c.is_mature(100, 1));
        assert!(c.is_mature(101, 1));
        assert_eq!(c.earliest_reveal_block(5), 105);
    }
}
