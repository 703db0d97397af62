//! Meter events
//!
//! Signed micro-charges accumulated locally against an open channel
//! session. The list is append-only and the total is a pure fold.

use serde::{Deserialize, Serialize};

use crate::TokenAmount;

/// One signed charge against an open session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterEvent {
    /// Unix milliseconds
    pub timestamp: i64,
    pub action: String,
    pub amount: TokenAmount,
    /// Per-session monotonic nonce
    pub nonce: u64,
    /// `0x` hex signature by the session key over the event payload
    pub signature: String,
}

/// Sum of all event amounts
pub fn meter_total(events: &[MeterEvent]) -> TokenAmount {
    events.iter().fold(TokenAmount::ZERO, |acc, e| acc + e.amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(amount: u128) -> MeterEvent {
        MeterEvent {
            timestamp: 0,
            action: "quote".to_string(),
            amount: TokenAmount::from_raw(amount),
            nonce: 0,
            signature: "0x".to_string(),
        }
    }

    #[test]
    fn test_total_is_fold() {
        assert_eq!(meter_total(&[]), TokenAmount::ZERO);
        let events = vec![event(10_000), event(25_000), event(1)];
        assert_eq!(meter_total(&events), TokenAmount::from_raw(35_001));
    }
}
