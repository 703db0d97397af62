//! OpenAI-compatible remote provider
//!
//! Works with any `/chat/completions` endpoint (OpenRouter, vLLM, llama.cpp
//! servers). Requests JSON mode; replies wrapped in markdown fences are
//! unwrapped before parsing.

use std::time::Duration;

use async_trait::async_trait;
use nitrobridge_types::{duration_secs, TokenAmount};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{Decision, DecisionAction, DecisionError, DecisionProvider, DecisionRequest, DecisionResult};

const SYSTEM_PROMPT: &str = "You are a DeFi Risk Management Agent. You must output VALID JSON only. \
Do not output markdown blocks or explanations outside the JSON.";

/// Configuration for an OpenAI-compatible endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiCompatConfig {
    /// Base URL including the API version segment, e.g. `https://openrouter.ai/api/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for OpenAiCompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key: None,
            model: "meta-llama/llama-3-8b-instruct:free".to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Remote chat-completions provider
pub struct OpenAiCompatProvider {
    config: OpenAiCompatConfig,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(config: OpenAiCompatConfig) -> DecisionResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DecisionError::Unavailable {
                provider: "openai_compat".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &OpenAiCompatConfig {
        &self.config
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    response_format: Value,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Risk prompt for one account
pub fn build_prompt(request: &DecisionRequest) -> String {
    format!(
        "You are a DeFi Risk Management Agent for the NitroBridge Vault protocol.\n\
Your job is to monitor user credit lines and prevent liquidation.\n\
\n\
User Address: {address}\n\
Current Utilization: {utilization}%\n\
Liquidation Threshold: 80%\n\
Warning Threshold: 50%\n\
\n\
Rules:\n\
1. If utilization > 70%, IMMEDIATE TOP-UP REQUIRED.\n\
2. If utilization > 50%, ADVISE TOP-UP.\n\
3. If utilization < 50%, MONITORING ONLY.\n\
\n\
Analyze the situation and decide if a top-up is needed.\n\
Respond with a JSON object ONLY:\n\
{{\n  \"action\": \"TOP_UP\" | \"MONITOR\",\n  \"reason\": \"Brief explanation of your decision\",\n  \
\"amount\": \"Recommended top-up amount in USDC (integer)\"\n}}\n",
        address = request.address,
        utilization = request.utilization_pct,
    )
}

/// Remove a surrounding ```` ```json ```` fence, if any
pub fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`json`) up to the first newline.
    let body = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest,
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    amount: Option<Value>,
}

/// Parse and validate a model reply
pub fn parse_decision(content: &str) -> DecisionResult<Decision> {
    let json = strip_code_fences(content);
    let raw: RawDecision = serde_json::from_str(json).map_err(|e| DecisionError::Malformed {
        message: format!("{}: {}", e, json),
    })?;

    let action = match raw.action.trim().to_ascii_uppercase().as_str() {
        "TOP_UP" => DecisionAction::TopUp,
        "MONITOR" => DecisionAction::Monitor,
        other => {
            return Err(DecisionError::Malformed {
                message: format!("unknown action '{}'", other),
            })
        }
    };

    let amount = match raw.amount {
        None | Some(Value::Null) => TokenAmount::ZERO,
        Some(Value::String(s)) => parse_amount(&s)?,
        Some(Value::Number(n)) => parse_amount(&n.to_string())?,
        Some(other) => {
            return Err(DecisionError::Malformed {
                message: format!("amount must be a number, got {}", other),
            })
        }
    };

    Ok(Decision {
        action,
        amount,
        reason: raw.reason.unwrap_or_default(),
    })
}

fn parse_amount(s: &str) -> DecisionResult<TokenAmount> {
    TokenAmount::from_human(s).map_err(|e| DecisionError::Malformed {
        message: format!("amount '{}': {}", s, e),
    })
}

#[async_trait]
impl DecisionProvider for OpenAiCompatProvider {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn decide(&self, request: &DecisionRequest) -> DecisionResult<Decision> {
        let chat = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: build_prompt(request),
                },
            ],
            response_format: serde_json::json!({"type": "json_object"}),
        };

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let mut req = self.client.post(&url).json(&chat);
        if let Some(ref key) = self.config.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| DecisionError::RequestFailed {
            message: e.to_string(),
        })?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DecisionError::RequestFailed {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| DecisionError::Malformed {
            message: e.to_string(),
        })?;
        let content = chat_response
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| DecisionError::Malformed {
                message: "no choices in response".to_string(),
            })?;
        debug!(content, "Decision model replied");

        parse_decision(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitrobridge_types::Address;

    #[test]
    fn test_fences_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_code_fences("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn test_parse_fenced_top_up() {
        let decision =
            parse_decision("```json\n{\"action\":\"TOP_UP\",\"reason\":\"high\",\"amount\":\"250\"}\n```").unwrap();
        assert_eq!(decision.action, DecisionAction::TopUp);
        assert_eq!(decision.amount, TokenAmount::from_whole(250));
        assert!(decision.wants_top_up());
    }

    #[test]
    fn test_parse_numeric_amount_and_missing_reason() {
        let decision = parse_decision(r#"{"action":"monitor","amount":0}"#).unwrap();
        assert_eq!(decision.action, DecisionAction::Monitor);
        assert_eq!(decision.amount, TokenAmount::ZERO);
        assert_eq!(decision.reason, "");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(parse_decision("I think you should top up"), Err(DecisionError::Malformed { .. })));
        assert!(matches!(parse_decision(r#"{"action":"PANIC"}"#), Err(DecisionError::Malformed { .. })));
        assert!(matches!(
            parse_decision(r#"{"action":"TOP_UP","amount":"-5"}"#),
            Err(DecisionError::Malformed { .. })
        ));
    }

    #[test]
    fn test_prompt_carries_utilization() {
        let prompt = build_prompt(&DecisionRequest::new(Address([1; 20]), 72.5));
        assert!(prompt.contains("Current Utilization: 72.5%"));
        assert!(prompt.contains("Liquidation Threshold: 80%"));
        assert!(prompt.contains("IMMEDIATE TOP-UP REQUIRED"));
    }
}
