//! Credit-line snapshots
//!
//! A `CreditLine` is read from the credit-terminal collaborator for one
//! account. It is not owned by this system: `borrowed <= credit_limit` is
//! enforced by the ledger, and consecutive reads may be transiently stale.

use serde::{Deserialize, Serialize};

use crate::{Bytes32, TokenAmount};

/// Snapshot of one account's credit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLine {
    pub deposited: TokenAmount,
    pub borrowed: TokenAmount,
    pub credit_limit: TokenAmount,
    /// Unix seconds of the last on-chain update
    pub last_update: u64,
    /// Namehash of the ENS name carrying the account's credit reputation;
    /// zero when none is bound
    pub ens_hash: Bytes32,
}

impl CreditLine {
    /// An account with no credit line established
    pub fn empty() -> Self {
        Self {
            deposited: TokenAmount::ZERO,
            borrowed: TokenAmount::ZERO,
            credit_limit: TokenAmount::ZERO,
            last_update: 0,
            ens_hash: Bytes32::zero(),
        }
    }

    /// Whether a credit line has been opened
    pub fn is_established(&self) -> bool {
        !self.credit_limit.is_zero()
    }

    pub fn has_ens_name(&self) -> bool {
        !self.ens_hash.is_zero()
    }

    /// Utilization in percent (borrowed ÷ limit × 100), two-decimal precision
    ///
    /// Returns 0 when no credit line is established.
    pub fn utilization_pct(&self) -> f64 {
        if self.credit_limit.is_zero() {
            return 0.0;
        }
        let bps = self.borrowed.raw().saturating_mul(10_000) / self.credit_limit.raw();
        bps as f64 / 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilization() {
        let line = CreditLine {
            deposited: TokenAmount::from_whole(10_000),
            borrowed: TokenAmount::from_whole(8_500),
            credit_limit: TokenAmount::from_whole(15_000),
            last_update: 0,
            ens_hash: Bytes32::zero(),
        };
        assert_eq!(line.utilization_pct(), 56.66);
        assert!(!line.has_ens_name());
    }

    #[test]
    fn test_empty_line_has_zero_utilization() {
        let line = CreditLine::empty();
        assert!(!line.is_established());
        assert_eq!(line.utilization_pct(), 0.0);
    }
}
