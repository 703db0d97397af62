//! Decision Router - primary provider with a mandatory rule-based fallback

use std::sync::Arc;
use std::time::Duration;

use nitrobridge_types::{duration_secs, NitroBridgeError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::remote::{OpenAiCompatConfig, OpenAiCompatProvider};
use crate::rules::RuleBasedProvider;
use crate::{Decision, DecisionError, DecisionProvider, DecisionRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Rule-based only
    #[default]
    Rules,
    OpenaiCompat,
}

/// `decision` configuration section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DecisionConfig {
    pub provider: ProviderKind,
    pub remote: OpenAiCompatConfig,
    /// Overall budget for one remote decision; defaults to the request timeout
    #[serde(default, with = "opt_duration_secs")]
    pub timeout: Option<Duration>,
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&d.as_secs()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_secs))
    }
}

/// Where a routed verdict came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecisionSource {
    Primary(&'static str),
    /// The rule-based path, with the reason the primary was not used
    Fallback { cause: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutedDecision {
    pub decision: Decision,
    pub source: DecisionSource,
}

impl RoutedDecision {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, DecisionSource::Fallback { .. })
    }
}

/// Always produces a decision
pub struct DecisionRouter {
    primary: Option<Arc<dyn DecisionProvider>>,
    fallback: RuleBasedProvider,
    timeout: Duration,
}

impl DecisionRouter {
    /// Rule-based decisions only
    pub fn rules_only() -> Self {
        Self {
            primary: None,
            fallback: RuleBasedProvider::default(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_primary(provider: Arc<dyn DecisionProvider>, timeout: Duration) -> Self {
        Self {
            primary: Some(provider),
            fallback: RuleBasedProvider::default(),
            timeout,
        }
    }

    pub fn with_fallback(mut self, fallback: RuleBasedProvider) -> Self {
        self.fallback = fallback;
        self
    }

    /// Build from configuration. A remote provider without an API key degrades
    /// to rules only.
    pub fn from_config(config: &DecisionConfig) -> Result<Self> {
        match config.provider {
            ProviderKind::Rules => Ok(Self::rules_only()),
            ProviderKind::OpenaiCompat => {
                if config.remote.api_key.as_deref().map_or(true, str::is_empty) {
                    warn!("Decision API key not configured, using rule-based decisions");
                    return Ok(Self::rules_only());
                }
                let provider = OpenAiCompatProvider::new(config.remote.clone())
                    .map_err(|e| NitroBridgeError::configuration(e.to_string()))?;
                let timeout = config.timeout.unwrap_or(config.remote.request_timeout);
                Ok(Self::with_primary(Arc::new(provider), timeout))
            }
        }
    }

    pub fn primary_name(&self) -> Option<&'static str> {
        self.primary.as_ref().map(|p| p.name())
    }

    /// Ask the primary within the timeout; on any failure use the rules
    pub async fn decide(&self, request: &DecisionRequest) -> RoutedDecision {
        let Some(primary) = &self.primary else {
            return RoutedDecision {
                decision: self.fallback.evaluate(request),
                source: DecisionSource::Fallback {
                    cause: "no remote provider configured".to_string(),
                },
            };
        };

        let outcome = match tokio::time::timeout(self.timeout, primary.decide(request)).await {
            Ok(result) => result,
            Err(_) => Err(DecisionError::Timeout {
                elapsed_ms: self.timeout.as_millis() as u64,
            }),
        };

        match outcome {
            Ok(decision) => {
                debug!(
                    provider = primary.name(),
                    action = ?decision.action,
                    amount = %decision.amount,
                    "Decision from provider"
                );
                RoutedDecision {
                    decision,
                    source: DecisionSource::Primary(primary.name()),
                }
            }
            Err(e) => {
                warn!(
                    provider = primary.name(),
                    account = %request.address,
                    utilization = request.utilization_pct,
                    error = %e,
                    "Decision provider failed, using rule-based fallback"
                );
                RoutedDecision {
                    decision: self.fallback.evaluate(request),
                    source: DecisionSource::Fallback { cause: e.to_string() },
                }
            }
        }
    }
}

impl Default for DecisionRouter {
    fn default() -> Self {
        Self::rules_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DecisionAction, DecisionResult};
    use async_trait::async_trait;
    use nitrobridge_types::{Address, TokenAmount};

    struct Stalled;

    #[async_trait]
    impl DecisionProvider for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn decide(&self, _request: &DecisionRequest) -> DecisionResult<Decision> {
            std::future::pending().await
        }
    }

    struct Fixed(Decision);

    #[async_trait]
    impl DecisionProvider for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        async fn decide(&self, _request: &DecisionRequest) -> DecisionResult<Decision> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_falls_back() {
        let router = DecisionRouter::with_primary(Arc::new(Stalled), Duration::from_secs(5));
        let routed = router.decide(&DecisionRequest::new(Address::zero(), 60.0)).await;
        assert!(routed.is_fallback());
        assert_eq!(routed.decision.action, DecisionAction::TopUp);
        assert_eq!(routed.decision.amount, TokenAmount::from_whole(100));
    }

    #[tokio::test]
    async fn test_primary_verdict_used() {
        let verdict = Decision {
            action: DecisionAction::TopUp,
            amount: TokenAmount::from_whole(7),
            reason: "model".to_string(),
        };
        let router = DecisionRouter::with_primary(Arc::new(Fixed(verdict.clone())), Duration::from_secs(5));
        let routed = router.decide(&DecisionRequest::new(Address::zero(), 10.0)).await;
        assert_eq!(routed.source, DecisionSource::Primary("fixed"));
        assert_eq!(routed.decision, verdict);
    }

    #[test]
    fn test_missing_key_degrades_to_rules() {
        let config = DecisionConfig {
            provider: ProviderKind::OpenaiCompat,
            ..Default::default()
        };
        let router = DecisionRouter::from_config(&config).unwrap();
        assert_eq!(router.primary_name(), None);
    }
}
