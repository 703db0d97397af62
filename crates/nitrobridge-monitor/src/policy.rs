//! Top-up policy
//!
//! Pure function of one credit-line reading. A top-up fires when the share
//! of the limit still available falls below the threshold while some credit
//! is still available; it restores availability to 80% of the limit unless
//! an explicit amount overrides that.

use nitrobridge_types::{CreditLine, TokenAmount};
use serde::Serialize;

pub const DEFAULT_THRESHOLD_RATIO: f64 = 0.2;

/// Share of the credit limit a computed top-up restores availability to
pub const TARGET_AVAILABLE_NUM: u128 = 8;
pub const TARGET_AVAILABLE_DEN: u128 = 10;

/// What one reading calls for
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "assessment", rename_all = "snake_case")]
pub enum Assessment {
    /// `credit_limit == 0`; nothing to protect
    NoCreditLine,
    /// Available share at or above the threshold
    Healthy { ratio: f64 },
    /// Below the threshold with nothing available
    NothingAvailable,
    /// Below the threshold but the computed amount is zero
    AtTarget { ratio: f64 },
    TopUp { ratio: f64, amount: TokenAmount },
}

impl Assessment {
    pub fn top_up_amount(&self) -> Option<TokenAmount> {
        match self {
            Assessment::TopUp { amount, .. } => Some(*amount),
            _ => None,
        }
    }
}

/// `0.8 * limit - available`, floored at zero
pub fn target_top_up(credit_limit: TokenAmount, available: TokenAmount) -> TokenAmount {
    let target = TokenAmount::from_raw(credit_limit.raw().saturating_mul(TARGET_AVAILABLE_NUM) / TARGET_AVAILABLE_DEN);
    target.saturating_sub(available)
}

pub fn assess(
    line: &CreditLine,
    available: TokenAmount,
    threshold_ratio: f64,
    override_amount: Option<TokenAmount>,
) -> Assessment {
    let Some(ratio) = available.ratio_of(line.credit_limit) else {
        return Assessment::NoCreditLine;
    };
    if ratio >= threshold_ratio {
        return Assessment::Healthy { ratio };
    }
    if available.is_zero() {
        return Assessment::NothingAvailable;
    }
    let amount = override_amount.unwrap_or_else(|| target_top_up(line.credit_limit, available));
    if amount.is_zero() {
        Assessment::AtTarget { ratio }
    } else {
        Assessment::TopUp { ratio, amount }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitrobridge_types::Bytes32;
    use proptest::prelude::*;

    fn line(deposited: u64, borrowed: u64, limit: u64) -> CreditLine {
        CreditLine {
            deposited: TokenAmount::from_whole(deposited),
            borrowed: TokenAmount::from_whole(borrowed),
            credit_limit: TokenAmount::from_whole(limit),
            last_update: 0,
            ens_hash: Bytes32::zero(),
        }
    }

    #[test]
    fn test_near_liquidation_tops_up_to_target() {
        let assessment = assess(&line(10_000, 8_500, 15_000), TokenAmount::from_whole(1_500), 0.2, None);
        assert_eq!(
            assessment,
            Assessment::TopUp {
                ratio: 0.1,
                amount: TokenAmount::from_whole(10_500)
            }
        );
    }

    #[test]
    fn test_override_amount_wins() {
        let assessment = assess(
            &line(10_000, 8_500, 15_000),
            TokenAmount::from_whole(1_500),
            0.2,
            Some(TokenAmount::from_whole(250)),
        );
        assert_eq!(assessment.top_up_amount(), Some(TokenAmount::from_whole(250)));
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let assessment = assess(&line(10_000, 7_000, 15_000), TokenAmount::from_whole(3_000), 0.2, None);
        assert_eq!(assessment, Assessment::Healthy { ratio: 0.2 });
    }

    #[test]
    fn test_exhausted_line_not_topped_up() {
        let assessment = assess(&line(10_000, 15_000, 15_000), TokenAmount::ZERO, 0.2, None);
        assert_eq!(assessment, Assessment::NothingAvailable);
    }

    #[test]
    fn test_override_of_zero_is_at_target() {
        let assessment = assess(
            &line(10_000, 8_500, 15_000),
            TokenAmount::from_whole(1_500),
            0.2,
            Some(TokenAmount::ZERO),
        );
        assert!(matches!(assessment, Assessment::AtTarget { .. }));
    }

    proptest! {
        #[test]
        fn prop_no_credit_line_never_tops_up(available in 0u128..10_000_000_000, threshold in 0.01f64..0.99) {
            let assessment = assess(&CreditLine::empty(), TokenAmount::from_raw(available), threshold, None);
            prop_assert_eq!(assessment, Assessment::NoCreditLine);
        }

        #[test]
        fn prop_below_threshold_tops_up_to_target(
            limit in 1_000u128..1_000_000_000_000,
            available_share in 1u128..1_000,
            threshold in 0.01f64..0.99,
        ) {
            let available = TokenAmount::from_raw(limit * available_share / 1_000);
            let line = CreditLine {
                deposited: TokenAmount::from_raw(limit),
                borrowed: TokenAmount::ZERO,
                credit_limit: TokenAmount::from_raw(limit),
                last_update: 0,
                ens_hash: Bytes32::zero(),
            };
            let ratio = available.raw() as f64 / limit as f64;
            prop_assume!(!available.is_zero() && ratio < threshold);

            let expected = TokenAmount::from_raw((limit * 8 / 10).saturating_sub(available.raw()));
            match assess(&line, available, threshold, None) {
                Assessment::TopUp { amount, .. } => prop_assert_eq!(amount, expected),
                Assessment::AtTarget { .. } => prop_assert!(expected.is_zero()),
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
