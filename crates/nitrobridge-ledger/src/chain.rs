//! Chain registry
//!
//! Each chain carries its EVM chain id, its CCTP domain and the contract
//! addresses the workflows call. Optional contracts are checked at the
//! point of use so a chain without a credit terminal can still bridge.

use std::collections::BTreeMap;

use nitrobridge_types::{Address, ChainKey, NitroBridgeError, Result};
use serde::{Deserialize, Serialize};

/// CCTP domain identifiers (testnets share the mainnet ids)
pub mod domains {
    pub const ETHEREUM: u32 = 0;
    pub const AVALANCHE: u32 = 1;
    pub const OPTIMISM: u32 = 2;
    pub const ARBITRUM: u32 = 3;
    pub const BASE: u32 = 6;
    pub const POLYGON: u32 = 7;
    pub const ARC: u32 = 10;
}

/// Contract addresses deployed on one chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractAddresses {
    /// The bridged stablecoin (6 decimals)
    pub usdc: Address,
    #[serde(default)]
    pub token_messenger: Option<Address>,
    #[serde(default)]
    pub message_transmitter: Option<Address>,
    #[serde(default)]
    pub credit_terminal: Option<Address>,
    #[serde(default)]
    pub commit_hook: Option<Address>,
    #[serde(default)]
    pub swap_router: Option<Address>,
    #[serde(default)]
    pub pool_manager: Option<Address>,
}

/// One chain's connection and contract configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainConfig {
    pub key: ChainKey,
    pub name: String,
    pub chain_id: u64,
    /// CCTP domain id
    pub domain: u32,
    pub rpc_url: String,
    pub contracts: ContractAddresses,
}

impl ChainConfig {
    fn require(&self, name: &str, value: Option<Address>) -> Result<Address> {
        value.ok_or_else(|| {
            NitroBridgeError::configuration(format!("chain '{}' has no {} address configured", self.key, name))
        })
    }

    pub fn token_messenger(&self) -> Result<Address> {
        self.require("token_messenger", self.contracts.token_messenger)
    }

    pub fn message_transmitter(&self) -> Result<Address> {
        self.require("message_transmitter", self.contracts.message_transmitter)
    }

    pub fn credit_terminal(&self) -> Result<Address> {
        self.require("credit_terminal", self.contracts.credit_terminal)
    }

    pub fn commit_hook(&self) -> Result<Address> {
        self.require("commit_hook", self.contracts.commit_hook)
    }

    pub fn swap_router(&self) -> Result<Address> {
        self.require("swap_router", self.contracts.swap_router)
    }

    pub fn pool_manager(&self) -> Result<Address> {
        self.require("pool_manager", self.contracts.pool_manager)
    }
}

fn addr(s: &str) -> Address {
    // Preset literals are fixed 20-byte hex strings.
    s.parse().unwrap_or_default()
}

/// Named chains known to this process
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChainRegistry {
    chains: BTreeMap<ChainKey, ChainConfig>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ethereum Sepolia, Base Sepolia and Arc testnet presets
    pub fn testnets() -> Self {
        let mut registry = Self::new();
        registry.insert(ChainConfig {
            key: ChainKey::new("sepolia"),
            name: "Ethereum Sepolia".to_string(),
            chain_id: 11_155_111,
            domain: domains::ETHEREUM,
            rpc_url: "https://rpc.sepolia.org".to_string(),
            contracts: ContractAddresses {
                usdc: addr("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"),
                token_messenger: Some(addr("0x9f3B8679c73C2Fef8b59B4f3444d4e156fb70AA5")),
                message_transmitter: Some(addr("0x7865fAfC2db2093669d92c0F33AeEF291086BEFD")),
                credit_terminal: None,
                commit_hook: None,
                swap_router: None,
                pool_manager: None,
            },
        });
        registry.insert(ChainConfig {
            key: ChainKey::new("base-sepolia"),
            name: "Base Sepolia".to_string(),
            chain_id: 84_532,
            domain: domains::BASE,
            rpc_url: "https://sepolia.base.org".to_string(),
            contracts: ContractAddresses {
                usdc: addr("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
                token_messenger: Some(addr("0x9f3B8679c73C2Fef8b59B4f3444d4e156fb70AA5")),
                message_transmitter: Some(addr("0x7865fAfC2db2093669d92c0F33AeEF291086BEFD")),
                credit_terminal: None,
                commit_hook: None,
                swap_router: None,
                pool_manager: Some(addr("0x7Da1D65F8B249183667cdE74C5CBD46dD38AA829")),
            },
        });
        registry.insert(ChainConfig {
            key: ChainKey::new("arc"),
            name: "Arc Testnet".to_string(),
            chain_id: 5_042_002,
            domain: domains::ARC,
            rpc_url: "https://rpc.testnet.arc.network".to_string(),
            contracts: ContractAddresses {
                usdc: addr("0x3600000000000000000000000000000000000000"),
                token_messenger: Some(addr("0xb43db544E2c27092c107639Ad201b3dEfAbcF192")),
                message_transmitter: Some(addr("0x8FE6B999Dc680CcFDD5Bf7EB0974218be2542DAA")),
                credit_terminal: Some(addr("0xd1835d13A9694F0E9329FfDE9b18936CE872aae5")),
                commit_hook: None,
                swap_router: None,
                pool_manager: None,
            },
        });
        registry
    }

    /// Add or replace a chain
    pub fn insert(&mut self, chain: ChainConfig) {
        self.chains.insert(chain.key.clone(), chain);
    }

    pub fn get(&self, key: &ChainKey) -> Result<&ChainConfig> {
        self.chains.get(key).ok_or_else(|| NitroBridgeError::UnknownChain {
            chain: key.to_string(),
        })
    }

    pub fn get_mut(&mut self, key: &ChainKey) -> Option<&mut ChainConfig> {
        self.chains.get_mut(key)
    }

    pub fn by_domain(&self, domain: u32) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.domain == domain)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainConfig> {
        self.chains.values()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_testnet_presets() {
        let registry = ChainRegistry::testnets();
        assert_eq!(registry.len(), 3);
        let arc = registry.get(&ChainKey::new("arc")).unwrap();
        assert_eq!(arc.domain, 10);
        assert!(arc.credit_terminal().is_ok());
        assert!(!arc.contracts.usdc.is_zero());
        assert_eq!(registry.by_domain(6).unwrap().key, ChainKey::new("base-sepolia"));
    }

    #[test]
    fn test_missing_contract_is_configuration_error() {
        let registry = ChainRegistry::testnets();
        let sepolia = registry.get(&ChainKey::new("sepolia")).unwrap();
        let err = sepolia.credit_terminal().unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_unknown_chain() {
        let registry = ChainRegistry::testnets();
        assert!(matches!(
            registry.get(&ChainKey::new("solana")),
            Err(NitroBridgeError::UnknownChain { .. })
        ));
    }
}
