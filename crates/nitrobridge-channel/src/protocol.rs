//! NitroRPC wire format
//!
//! ```text
//! request  {"req": [id, method, params, timestamp], "sig": ["0x…"]}
//! response {"res": [id, method, params, timestamp], "sig": ["0x…"]}
//! ```
//!
//! The signature covers the canonical JSON of the `req` array. Responses
//! echo the request id; unsolicited pushes carry their own ids.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{ChannelError, ChannelResult};

pub const PROTOCOL_VERSION: &str = "NitroRPC/0.2";

/// Method names
pub mod methods {
    pub const AUTH_REQUEST: &str = "auth_request";
    pub const AUTH_CHALLENGE: &str = "auth_challenge";
    pub const AUTH_VERIFY: &str = "auth_verify";
    pub const CREATE_APP_SESSION: &str = "create_app_session";
    pub const TRANSFER: &str = "transfer";
    pub const GET_LEDGER_BALANCES: &str = "get_ledger_balances";
    pub const GET_ASSETS: &str = "get_assets";
    pub const PING: &str = "ping";
    pub const PONG: &str = "pong";
    pub const ERROR: &str = "error";
}

/// The `[id, method, params, timestamp]` tuple shared by both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcFrame(pub u64, pub String, pub Value, pub u64);

impl RpcFrame {
    pub fn new(id: u64, method: &str, params: Value, timestamp: u64) -> Self {
        Self(id, method.to_string(), params, timestamp)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    pub fn method(&self) -> &str {
        &self.1
    }

    pub fn params(&self) -> &Value {
        &self.2
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub req: RpcFrame,
    #[serde(default)]
    pub sig: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub res: RpcFrame,
    #[serde(default)]
    pub sig: Vec<String>,
}

/// An off-chain balance entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub asset: String,
    pub amount: String,
}

/// Spending cap granted to the session key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    pub asset: String,
    pub amount: String,
}

/// Decoded inbound message, one variant per method the session reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    AuthChallenge {
        challenge: String,
    },
    AuthVerify {
        success: bool,
        jwt_token: Option<String>,
    },
    AppSessionCreated {
        app_session_id: Option<String>,
    },
    Transferred {
        params: Value,
    },
    Assets(Vec<String>),
    LedgerBalances(Vec<LedgerBalance>),
    Pong,
    Error {
        message: String,
    },
    Other {
        method: String,
        params: Value,
    },
}

/// A parsed response frame
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub id: u64,
    pub body: Inbound,
}

fn first_object(params: &Value) -> &Value {
    match params {
        Value::Array(items) => items.first().unwrap_or(params),
        _ => params,
    }
}

fn str_field(v: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| v.get(*k).and_then(|x| x.as_str()))
        .map(str::to_string)
}

fn parse_assets(params: &Value) -> Vec<String> {
    let entries: Vec<&Value> = match params {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map
            .values()
            .flat_map(|v| match v {
                Value::Array(items) => items.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .collect(),
        _ => Vec::new(),
    };
    entries
        .into_iter()
        .filter_map(|a| match a {
            Value::String(s) => Some(s.clone()),
            other => str_field(other, &["symbol", "asset"]),
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_balances(params: &Value) -> Vec<LedgerBalance> {
    let list = match params {
        Value::Array(items) => match items.first() {
            Some(Value::Array(inner)) => inner.clone(),
            _ => items.clone(),
        },
        Value::Object(_) => params
            .get("ledger_balances")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    list.iter()
        .filter_map(|b| {
            let asset = str_field(b, &["asset"])?;
            let amount = match b.get("amount")? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            (!asset.is_empty() && !amount.is_empty()).then_some(LedgerBalance { asset, amount })
        })
        .collect()
}

/// Parse one text frame from the relay
pub fn decode(text: &str) -> ChannelResult<InboundMessage> {
    let envelope: ResponseEnvelope =
        serde_json::from_str(text).map_err(|e| ChannelError::Protocol(format!("unparseable frame: {}", e)))?;
    let RpcFrame(id, method, params, _) = envelope.res;
    let body = match method.as_str() {
        methods::AUTH_CHALLENGE => {
            let challenge = str_field(first_object(&params), &["challenge_message", "challenge"])
                .ok_or_else(|| ChannelError::Protocol("auth_challenge without challenge".to_string()))?;
            Inbound::AuthChallenge { challenge }
        }
        methods::AUTH_VERIFY => {
            let p = first_object(&params);
            Inbound::AuthVerify {
                success: p.get("success").and_then(|v| v.as_bool()).unwrap_or(true),
                jwt_token: str_field(p, &["jwt_token", "jwtToken"]),
            }
        }
        methods::CREATE_APP_SESSION => Inbound::AppSessionCreated {
            app_session_id: str_field(first_object(&params), &["app_session_id", "appSessionId"]),
        },
        methods::TRANSFER => Inbound::Transferred { params },
        methods::GET_ASSETS | "assets" => Inbound::Assets(parse_assets(&params)),
        methods::GET_LEDGER_BALANCES | "bu" => Inbound::LedgerBalances(parse_balances(&params)),
        methods::PONG | methods::PING => Inbound::Pong,
        methods::ERROR => Inbound::Error {
            message: str_field(first_object(&params), &["error", "message"]).unwrap_or_else(|| params.to_string()),
        },
        _ => Inbound::Other { method, params },
    };
    Ok(InboundMessage { id, body })
}

// ── Request parameters ───────────────────────────────────────────────────────

pub fn auth_request_params(
    address: &str,
    session_key: &str,
    application: &str,
    scope: &str,
    expires_at: i64,
    allowances: &[Allowance],
) -> Value {
    json!({
        "address": address,
        "session_key": session_key,
        "application": application,
        "expires_at": expires_at,
        "scope": scope,
        "allowances": allowances,
    })
}

pub fn auth_verify_params(challenge: &str) -> Value {
    json!({ "challenge": challenge })
}

pub fn create_app_session_params(
    application: &str,
    participants: [&str; 2],
    asset: &str,
    nonce: u64,
) -> Value {
    json!({
        "definition": {
            "protocol": PROTOCOL_VERSION,
            "application": application,
            "participants": participants,
            "weights": [100, 0],
            "quorum": 100,
            "challenge": 0,
            "nonce": nonce,
        },
        "allocations": [
            { "participant": participants[0], "asset": asset, "amount": "0" },
            { "participant": participants[1], "asset": asset, "amount": "0" },
        ],
    })
}

pub fn transfer_params(destination: &str, asset: &str, amount: &str) -> Value {
    json!({
        "destination": destination,
        "allocations": [{ "asset": asset, "amount": amount }],
    })
}

pub fn ledger_balances_params(participant: &str) -> Value {
    json!({ "participant": participant })
}
