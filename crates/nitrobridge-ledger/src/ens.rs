//! ENS credit reputation
//!
//! An account's credit score and credit policy are JSON text records on its
//! ENS name, under `vnd.credit-score` and `vnd.credit-policy`. Records are
//! found through the registry's resolver for the name's namehash, the same
//! word the credit terminal stores as `ensHash`.
//!
//! A name without a resolver, or a resolver without the record, reads as
//! `None`. Malformed record JSON is a protocol violation; network failures
//! propagate unchanged so the caller can retry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nitrobridge_crypto::{keccak_word, namehash};
use nitrobridge_types::{Address, Bytes32, NitroBridgeError, Result, TokenAmount, TxHash};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// ENS registry, deployed at the same address on every network
pub const ENS_REGISTRY: Address = Address([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x0c, 0x2e, 0x07, 0x4e, 0xc6, 0x9a, 0x0d, 0xfb, 0x29, 0x97, 0xba, 0x6c, 0x7d,
    0x2e, 0x1e,
]);

pub const CREDIT_SCORE_KEY: &str = "vnd.credit-score";
pub const CREDIT_POLICY_KEY: &str = "vnd.credit-policy";

/// Repayment history published on an ENS name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreditScore {
    pub score: u32,
    pub last_updated: Option<DateTime<Utc>>,
    pub total_deposits: TokenAmount,
    pub total_repaid: TokenAmount,
    pub on_time_payments: u32,
    pub late_payments: u32,
}

impl Default for CreditScore {
    fn default() -> Self {
        Self {
            score: 750,
            last_updated: None,
            total_deposits: TokenAmount::ZERO,
            total_repaid: TokenAmount::ZERO,
            on_time_payments: 0,
            late_payments: 0,
        }
    }
}

/// Owner-set limits for automated margin management
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreditPolicy {
    pub max_credit_limit: TokenAmount,
    /// Collateral ratio in percent
    pub collateral_ratio: u32,
    pub auto_top_up_enabled: bool,
    /// Available-credit percentage that triggers a top-up
    pub auto_top_up_threshold: f64,
    /// Agents the owner allows to top up; empty allows any
    pub authorized_agents: Vec<Address>,
}

impl Default for CreditPolicy {
    fn default() -> Self {
        Self {
            max_credit_limit: TokenAmount::from_whole(10_000),
            collateral_ratio: 150,
            auto_top_up_enabled: true,
            auto_top_up_threshold: 20.0,
            authorized_agents: Vec::new(),
        }
    }
}

impl CreditPolicy {
    /// The top-up threshold as a ratio in `[0, 1]`
    pub fn threshold_ratio(&self) -> f64 {
        (self.auto_top_up_threshold / 100.0).clamp(0.0, 1.0)
    }

    pub fn authorizes(&self, agent: Address) -> bool {
        self.authorized_agents.is_empty() || self.authorized_agents.contains(&agent)
    }
}

// ============================================================================
// Records
// ============================================================================

/// Registry and resolver access for text records
#[async_trait]
pub trait TextRecords: Send + Sync {
    /// Resolver of `node`, `None` when unset
    async fn resolver(&self, node: Bytes32) -> Result<Option<Address>>;

    /// Text record `key`; empty when unset
    async fn text(&self, resolver: Address, node: Bytes32, key: &str) -> Result<String>;

    async fn set_text(&self, resolver: Address, node: Bytes32, key: &str, value: &str) -> Result<TxHash>;
}

/// Reads and publishes credit reputation on ENS names
#[derive(Clone)]
pub struct EnsReputation {
    records: Arc<dyn TextRecords>,
}

impl EnsReputation {
    pub fn new(records: Arc<dyn TextRecords>) -> Self {
        Self { records }
    }

    /// The namehash stored on-chain as a credit line's `ensHash`
    pub fn ens_hash(name: &str) -> Bytes32 {
        namehash(name)
    }

    pub async fn credit_score(&self, name: &str) -> Result<Option<CreditScore>> {
        self.read(name, CREDIT_SCORE_KEY).await
    }

    pub async fn credit_policy(&self, name: &str) -> Result<Option<CreditPolicy>> {
        self.read(name, CREDIT_POLICY_KEY).await
    }

    /// Publish `score`, stamping it with the current time
    pub async fn set_credit_score(&self, name: &str, score: &CreditScore) -> Result<TxHash> {
        let stamped = CreditScore {
            last_updated: Some(Utc::now()),
            ..score.clone()
        };
        self.write(name, CREDIT_SCORE_KEY, &stamped).await
    }

    pub async fn set_credit_policy(&self, name: &str, policy: &CreditPolicy) -> Result<TxHash> {
        self.write(name, CREDIT_POLICY_KEY, policy).await
    }

    async fn read<T: DeserializeOwned>(&self, name: &str, key: &str) -> Result<Option<T>> {
        let node = namehash(name);
        let Some(resolver) = self.records.resolver(node).await? else {
            debug!(name, "No resolver for ENS name");
            return Ok(None);
        };
        let raw = self.records.text(resolver, node, key).await?;
        if raw.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| NitroBridgeError::protocol(format!("{} record on {} is malformed: {}", key, name, e)))
    }

    async fn write<T: Serialize>(&self, name: &str, key: &str, value: &T) -> Result<TxHash> {
        let node = namehash(name);
        let resolver = self
            .records
            .resolver(node)
            .await?
            .ok_or_else(|| NitroBridgeError::invalid_input("ens_name", format!("no resolver found for {}", name)))?;
        let json = serde_json::to_string(value)
            .map_err(|e| NitroBridgeError::invalid_input(key, e.to_string()))?;
        let tx = self.records.set_text(resolver, node, key, &json).await?;
        info!(name, key, tx = %tx, "ENS record updated");
        Ok(tx)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct RecordState {
    resolvers: HashMap<Bytes32, Address>,
    texts: HashMap<(Address, Bytes32, String), String>,
    writes: u64,
}

/// Registry and resolvers held in memory
#[derive(Default, Clone)]
pub struct InMemoryTextRecords {
    state: Arc<RwLock<RecordState>>,
}

impl InMemoryTextRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point `name` at `resolver`
    pub async fn set_resolver(&self, name: &str, resolver: Address) {
        self.state.write().await.resolvers.insert(namehash(name), resolver);
    }

    /// Store a raw record for `name` on its resolver
    pub async fn put(&self, name: &str, key: &str, value: &str) {
        let node = namehash(name);
        let mut state = self.state.write().await;
        if let Some(resolver) = state.resolvers.get(&node).copied() {
            state.texts.insert((resolver, node, key.to_string()), value.to_string());
        }
    }

    pub async fn get(&self, name: &str, key: &str) -> Option<String> {
        let node = namehash(name);
        let state = self.state.read().await;
        let resolver = state.resolvers.get(&node)?;
        state.texts.get(&(*resolver, node, key.to_string())).cloned()
    }
}

#[async_trait]
impl TextRecords for InMemoryTextRecords {
    async fn resolver(&self, node: Bytes32) -> Result<Option<Address>> {
        Ok(self.state.read().await.resolvers.get(&node).copied())
    }

    async fn text(&self, resolver: Address, node: Bytes32, key: &str) -> Result<String> {
        let state = self.state.read().await;
        Ok(state
            .texts
            .get(&(resolver, node, key.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn set_text(&self, resolver: Address, node: Bytes32, key: &str, value: &str) -> Result<TxHash> {
        let mut state = self.state.write().await;
        state.texts.insert((resolver, node, key.to_string()), value.to_string());
        state.writes += 1;
        let tx = keccak_word(format!("setText:{}:{}", state.writes, key).as_bytes());
        Ok(TxHash(tx.0))
    }
}
