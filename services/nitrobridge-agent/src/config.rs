//! Agent Configuration
//!
//! Layered configuration for the NitroBridge agent: `config/default`,
//! `config/local`, an optional explicit file, then `NITROBRIDGE__`-prefixed
//! environment variables (`__` separates sections, e.g.
//! `NITROBRIDGE__MONITOR__INTERVAL=5`). A `.env` file is read first.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use nitrobridge_attestation::{ApiVersion, PollPolicy};
use nitrobridge_bridge::BridgeConfig;
use nitrobridge_channel::ChannelConfig;
use nitrobridge_decision::DecisionConfig;
use nitrobridge_ledger::{
    ChainConfig, ChainRegistry, ConfirmationPolicy, ContractAddresses, RetryPolicy, DEFAULT_RPC_TIMEOUT,
};
use nitrobridge_monitor::MonitorConfig;
use nitrobridge_swap::SwapConfig;
use nitrobridge_types::{duration_secs, Address, ChainKey, NitroBridgeError, Result};
use serde::{Deserialize, Serialize};

/// Agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Signing identity
    pub agent: AgentSettings,

    /// Per-chain overrides applied on top of the testnet presets
    pub chains: BTreeMap<String, ChainOverride>,

    pub rpc: RpcSettings,

    pub ens: EnsSettings,

    pub attestation: AttestationSettings,

    pub monitor: MonitorConfig,

    pub channel: ChannelConfig,

    pub decision: DecisionConfig,

    pub bridge: BridgeSettings,

    pub swap: SwapConfig,

    pub logging: LoggingConfig,
}

/// Signing identity
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Hex secp256k1 key used for every on-chain call and channel auth
    pub private_key: Option<String>,
}

impl std::fmt::Debug for AgentSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentSettings")
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Fields left unset keep the preset value; new chains must set all required ones
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainOverride {
    pub name: Option<String>,
    pub chain_id: Option<u64>,
    pub domain: Option<u32>,
    pub rpc_url: Option<String>,
    pub usdc: Option<Address>,
    pub token_messenger: Option<Address>,
    pub message_transmitter: Option<Address>,
    pub credit_terminal: Option<Address>,
    pub commit_hook: Option<Address>,
    pub swap_router: Option<Address>,
    pub pool_manager: Option<Address>,
}

impl ChainOverride {
    fn apply(&self, chain: &mut ChainConfig) {
        if let Some(name) = &self.name {
            chain.name = name.clone();
        }
        if let Some(id) = self.chain_id {
            chain.chain_id = id;
        }
        if let Some(domain) = self.domain {
            chain.domain = domain;
        }
        if let Some(url) = &self.rpc_url {
            chain.rpc_url = url.clone();
        }
        if let Some(usdc) = self.usdc {
            chain.contracts.usdc = usdc;
        }
        let contracts = &mut chain.contracts;
        for (slot, value) in [
            (&mut contracts.token_messenger, self.token_messenger),
            (&mut contracts.message_transmitter, self.message_transmitter),
            (&mut contracts.credit_terminal, self.credit_terminal),
            (&mut contracts.commit_hook, self.commit_hook),
            (&mut contracts.swap_router, self.swap_router),
            (&mut contracts.pool_manager, self.pool_manager),
        ] {
            if value.is_some() {
                *slot = value;
            }
        }
    }

    fn build(&self, key: &str) -> Result<ChainConfig> {
        let missing = |field: &str| {
            NitroBridgeError::configuration(format!("chain '{}' is not a preset and has no {}", key, field))
        };
        let mut chain = ChainConfig {
            key: ChainKey::new(key),
            name: self.name.clone().unwrap_or_else(|| key.to_string()),
            chain_id: self.chain_id.ok_or_else(|| missing("chain_id"))?,
            domain: self.domain.ok_or_else(|| missing("domain"))?,
            rpc_url: self.rpc_url.clone().ok_or_else(|| missing("rpc_url"))?,
            contracts: ContractAddresses {
                usdc: self.usdc.ok_or_else(|| missing("usdc"))?,
                token_messenger: None,
                message_transmitter: None,
                credit_terminal: None,
                commit_hook: None,
                swap_router: None,
                pool_manager: None,
            },
        };
        self.apply(&mut chain);
        Ok(chain)
    }
}

/// Chain RPC settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Upper bound on any single JSON-RPC request
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }
}

/// Where credit reputation records are read
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsSettings {
    /// Chain hosting the ENS registry
    pub chain: ChainKey,
}

impl Default for EnsSettings {
    fn default() -> Self {
        Self {
            chain: ChainKey::new("sepolia"),
        }
    }
}

/// Attestation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationSettings {
    pub base_url: String,
    pub version: ApiVersion,
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for AttestationSettings {
    fn default() -> Self {
        let poll = PollPolicy::default();
        Self {
            base_url: nitrobridge_attestation::iris::SANDBOX_BASE_URL.to_string(),
            version: ApiVersion::default(),
            request_timeout: Duration::from_secs(15),
            poll_interval: poll.interval,
            timeout: poll.timeout,
        }
    }
}

impl AttestationSettings {
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.poll_interval,
            timeout: self.timeout,
        }
    }
}

/// Bridge transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Directory of the transfer journal
    pub store_dir: PathBuf,
    pub retry: RetryPolicy,
    pub confirmation: ConfirmationPolicy,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("data/transfers"),
            retry: RetryPolicy::default(),
            confirmation: ConfirmationPolicy::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

// =============================================================================
// Configuration Loading
// =============================================================================

impl AgentConfig {
    /// Load configuration from `.env`, config files and the environment
    pub fn load(config_path: Option<&str>) -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("NITROBRIDGE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let agent_config: AgentConfig = builder
            .build()?
            .try_deserialize()
            .map_err(|e| NitroBridgeError::configuration(e.to_string()))?;
        Ok(agent_config)
    }

    /// Testnet presets with the configured overrides applied
    pub fn chain_registry(&self) -> Result<ChainRegistry> {
        let mut registry = ChainRegistry::testnets();
        for (key, overrides) in &self.chains {
            match registry.get_mut(&ChainKey::new(key.as_str())) {
                Some(chain) => overrides.apply(chain),
                None => registry.insert(overrides.build(key)?),
            }
        }
        Ok(registry)
    }

    pub fn private_key(&self) -> Result<&str> {
        self.agent
            .private_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                NitroBridgeError::configuration(
                    "agent private key not configured (set NITROBRIDGE__AGENT__PRIVATE_KEY or --private-key)",
                )
            })
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            retry: self.bridge.retry.clone(),
            confirmation: self.bridge.confirmation.clone(),
            attestation: self.attestation.poll_policy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.monitor.interval, Duration::from_secs(10));
        assert_eq!(config.monitor.default_threshold, 0.2);
        assert_eq!(config.channel.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.channel.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.rpc.request_timeout, Duration::from_secs(30));
        assert_eq!(config.ens.chain, ChainKey::new("sepolia"));
        assert_eq!(config.monitor.submit_timeout, Duration::from_secs(60));
        assert_eq!(config.attestation.poll_interval, Duration::from_secs(10));
        assert_eq!(config.attestation.timeout, Duration::from_secs(900));
        assert_eq!(config.logging.format, "pretty");
        assert!(config.private_key().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[agent]
private_key = "0x01"

[monitor]
interval = 5
default_threshold = 0.25
submit_timeout = 45

[rpc]
request_timeout = 8

[channel]
reconnect_delay = 2

[attestation]
version = "v1"
timeout = 60

[chains.arc]
rpc_url = "http://localhost:8545"

[chains.devnet]
chain_id = 31337
domain = 99
rpc_url = "http://localhost:9545"
usdc = "0x1111111111111111111111111111111111111111"
credit_terminal = "0x2222222222222222222222222222222222222222"
"#
        )
        .unwrap();

        let config = AgentConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.private_key().unwrap(), "0x01");
        assert_eq!(config.monitor.interval, Duration::from_secs(5));
        assert_eq!(config.monitor.default_threshold, 0.25);
        assert_eq!(config.monitor.cycle_read_timeout, Duration::from_secs(30));
        assert_eq!(config.monitor.submit_timeout, Duration::from_secs(45));
        assert_eq!(config.rpc.request_timeout, Duration::from_secs(8));
        assert_eq!(config.channel.reconnect_delay, Duration::from_secs(2));
        assert_eq!(config.channel.max_reconnect_delay, Duration::from_secs(60));
        assert_eq!(config.attestation.version, ApiVersion::V1);
        assert_eq!(config.bridge_config().attestation.timeout, Duration::from_secs(60));

        let registry = config.chain_registry().unwrap();
        let arc = registry.get(&ChainKey::new("arc")).unwrap();
        assert_eq!(arc.rpc_url, "http://localhost:8545");
        assert!(arc.credit_terminal().is_ok());
        let devnet = registry.get(&ChainKey::new("devnet")).unwrap();
        assert_eq!(devnet.domain, 99);
        assert!(devnet.credit_terminal().is_ok());
        assert!(devnet.token_messenger().is_err());
    }

    #[test]
    fn test_incomplete_new_chain_rejected() {
        let mut config = AgentConfig::default();
        config.chains.insert(
            "devnet".to_string(),
            ChainOverride {
                chain_id: Some(1),
                ..Default::default()
            },
        );
        let err = config.chain_registry().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_private_key_hidden_from_debug() {
        let settings = AgentSettings {
            private_key: Some("0xdeadbeef".to_string()),
        };
        assert!(!format!("{:?}", settings).contains("deadbeef"));
    }
}
