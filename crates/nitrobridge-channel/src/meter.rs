//! Meter ledger and settlement intent
//!
//! Each event is signed by the session key over the canonical JSON of its
//! payload. Events are only appended; the settlement total is a fold.

use nitrobridge_crypto::{canonical_json, keccak256, recover_address};
use nitrobridge_types::{meter_total, Address, MeterEvent, TokenAmount};
use serde::{Deserialize, Serialize};

use crate::signer::MessageSigner;
use crate::{ChannelError, ChannelResult};

pub const METER_EVENT_TYPE: &str = "nitrobridge_meter_event";
pub const SETTLEMENT_INTENT_TYPE: &str = "nitrobridge_settlement_intent";

/// The exact payload a meter event signature covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeterPayload {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    pub action: String,
    pub asset: String,
    /// Human-readable decimal
    pub amount: String,
    pub from: Address,
    pub session_key: Address,
    pub counterparty: Address,
    pub nonce: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentEvent {
    pub ts: i64,
    pub action: String,
    pub amount: String,
}

/// Everything needed to settle the metered usage of one app session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementIntent {
    #[serde(rename = "type")]
    pub kind: String,
    pub session_id: String,
    pub asset: String,
    pub total: String,
    pub from: Address,
    pub to: Address,
    pub events: Vec<IntentEvent>,
}

/// Signed charges against one app session
#[derive(Debug, Clone)]
pub struct MeterLedger {
    session_id: String,
    asset: String,
    from: Address,
    counterparty: Address,
    events: Vec<MeterEvent>,
}

impl MeterLedger {
    pub fn new(session_id: impl Into<String>, asset: impl Into<String>, from: Address, counterparty: Address) -> Self {
        Self {
            session_id: session_id.into(),
            asset: asset.into(),
            from,
            counterparty,
            events: Vec::new(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn payload(&self, action: &str, amount: TokenAmount, session_key: Address, nonce: u64, timestamp: i64) -> MeterPayload {
        MeterPayload {
            kind: METER_EVENT_TYPE.to_string(),
            session_id: self.session_id.clone(),
            action: action.to_string(),
            asset: self.asset.clone(),
            amount: amount.to_human(),
            from: self.from,
            session_key,
            counterparty: self.counterparty,
            nonce,
            timestamp,
        }
    }

    /// Sign and append a charge of `amount` for `action`
    pub async fn record(
        &mut self,
        signer: &dyn MessageSigner,
        action: &str,
        amount: TokenAmount,
        timestamp: i64,
    ) -> ChannelResult<MeterEvent> {
        if amount.is_zero() {
            return Err(ChannelError::InvalidAmount("meter price must be positive".to_string()));
        }
        let nonce = self.events.len() as u64;
        let payload = self.payload(action, amount, signer.address(), nonce, timestamp);
        let value = serde_json::to_value(&payload).map_err(|e| ChannelError::Signing(e.to_string()))?;
        let signature = signer.sign(&value).await?;
        let event = MeterEvent {
            timestamp,
            action: action.to_string(),
            amount,
            nonce,
            signature,
        };
        self.events.push(event.clone());
        Ok(event)
    }

    pub fn events(&self) -> &[MeterEvent] {
        &self.events
    }

    pub fn total(&self) -> TokenAmount {
        meter_total(&self.events)
    }

    /// Whether `event` was signed by `session_key` over this session's payload
    pub fn verify(&self, event: &MeterEvent, session_key: Address) -> bool {
        let payload = self.payload(&event.action, event.amount, session_key, event.nonce, event.timestamp);
        let Ok(json) = canonical_json(&payload) else {
            return false;
        };
        recover_address(&keccak256(json.as_bytes()), &event.signature).is_ok_and(|signer| signer == session_key)
    }

    pub fn settlement_intent(&self) -> SettlementIntent {
        SettlementIntent {
            kind: SETTLEMENT_INTENT_TYPE.to_string(),
            session_id: self.session_id.clone(),
            asset: self.asset.clone(),
            total: self.total().to_human(),
            from: self.from,
            to: self.counterparty,
            events: self
                .events
                .iter()
                .map(|e| IntentEvent {
                    ts: e.timestamp,
                    action: e.action.clone(),
                    amount: e.amount.to_human(),
                })
                .collect(),
        }
    }
}
