//! Deterministic rule-based provider

use async_trait::async_trait;
use nitrobridge_types::TokenAmount;

use crate::{Decision, DecisionAction, DecisionProvider, DecisionRequest, DecisionResult};

/// Tops up a fixed amount once utilization passes a warning line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleBasedProvider {
    /// Percent; strictly above this triggers a top-up
    pub warning_pct: f64,
    pub top_up_amount: TokenAmount,
}

impl Default for RuleBasedProvider {
    fn default() -> Self {
        Self {
            warning_pct: 50.0,
            top_up_amount: TokenAmount::from_whole(100),
        }
    }
}

impl RuleBasedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infallible form used by the router
    pub fn evaluate(&self, request: &DecisionRequest) -> Decision {
        let utilization = request.utilization_pct;
        if utilization > self.warning_pct {
            Decision {
                action: DecisionAction::TopUp,
                amount: self.top_up_amount,
                reason: format!("Utilization is {}%, exceeding safety threshold.", utilization),
            }
        } else {
            Decision {
                action: DecisionAction::Monitor,
                amount: TokenAmount::ZERO,
                reason: format!("Utilization {}% is healthy.", utilization),
            }
        }
    }
}

#[async_trait]
impl DecisionProvider for RuleBasedProvider {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn decide(&self, request: &DecisionRequest) -> DecisionResult<Decision> {
        Ok(self.evaluate(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitrobridge_types::Address;

    #[test]
    fn test_warning_line_is_exclusive() {
        let rules = RuleBasedProvider::new();
        let at = rules.evaluate(&DecisionRequest::new(Address::zero(), 50.0));
        assert_eq!(at.action, DecisionAction::Monitor);
        assert_eq!(at.amount, TokenAmount::ZERO);

        let above = rules.evaluate(&DecisionRequest::new(Address::zero(), 50.01));
        assert_eq!(above.action, DecisionAction::TopUp);
        assert_eq!(above.amount, TokenAmount::from_whole(100));
        assert!(above.reason.contains("50.01"));
    }
}
