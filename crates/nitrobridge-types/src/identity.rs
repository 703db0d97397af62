//! Identity types for NitroBridge
//!
//! Addresses and hashes are fixed-size byte arrays that serialize as
//! `0x`-prefixed lowercase hex, so they can be written straight into
//! JSON-RPC payloads and persisted transfer records.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::NitroBridgeError;

/// Decode a `0x`-prefixed (or bare) hex string into exactly `N` bytes
pub fn parse_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N], NitroBridgeError> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(raw).map_err(|e| NitroBridgeError::invalid_input("hex", e.to_string()))?;
    if bytes.len() != N {
        return Err(NitroBridgeError::invalid_input(
            "hex",
            format!("expected {} bytes, got {}", N, bytes.len()),
        ));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Decode `0x`-prefixed hex of any length
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, NitroBridgeError> {
    let raw = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(raw).map_err(|e| NitroBridgeError::invalid_input("hex", e.to_string()))
}

/// Encode bytes as `0x`-prefixed lowercase hex
pub fn to_prefixed_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Generates a fixed-width byte newtype with hex Display/FromStr/serde
macro_rules! define_hex_type {
    ($name:ident, $len:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            /// Length in bytes
            pub const LEN: usize = $len;

            /// All-zero value
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            /// Borrow the raw bytes
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Whether every byte is zero
            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = NitroBridgeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(parse_fixed_hex::<$len>(s)?))
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

define_hex_type!(Address, 20, "A 20-byte EVM account or contract address");
define_hex_type!(TxHash, 32, "A 32-byte transaction hash");
define_hex_type!(Bytes32, 32, "A 32-byte word (message hashes, pool ids, commitments)");

impl Address {
    /// Left-pad to 32 bytes, as used for CCTP `mintRecipient`
    pub fn to_bytes32(&self) -> Bytes32 {
        let mut out = [0u8; 32];
        out[12..].copy_from_slice(&self.0);
        Bytes32(out)
    }

    /// Recover an address from a left-padded 32-byte word
    pub fn from_bytes32(word: &Bytes32) -> Option<Self> {
        if word.0[..12].iter().any(|b| *b != 0) {
            return None;
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&word.0[12..]);
        Some(Self(out))
    }

    /// Shortened form for log lines (`0x1234abcd…`)
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}…", &full[..10])
    }
}

/// Named chain key (e.g. `sepolia`, `arc`, `base-sepolia`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainKey(pub String);

impl ChainKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChainKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainKey {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for ChainKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A principal on a specific ledger. Immutable once observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Account {
    pub address: Address,
    pub chain: ChainKey,
}

impl Account {
    pub fn new(address: Address, chain: impl Into<ChainKey>) -> Self {
        Self {
            address,
            chain: chain.into(),
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.address, self.chain)
    }
}

/// Unique identifier for a bridge transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransferId(pub Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string (with or without `xfer_` prefix)
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        let s = s.strip_prefix("xfer_").unwrap_or(s);
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xfer_{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip() {
        let addr: Address = "0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238".parse().unwrap();
        assert_eq!(addr.to_string(), "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238");
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
    }

    #[test]
    fn test_bytes32_padding() {
        let addr: Address = "0x036CbD53842c5426634e7929541eC2318f3dCF7e".parse().unwrap();
        let word = addr.to_bytes32();
        assert!(word.0[..12].iter().all(|b| *b == 0));
        assert_eq!(Address::from_bytes32(&word), Some(addr));
    }

    #[test]
    fn test_serde_as_hex_string() {
        let hash = TxHash([0xab; 32]);
        let json = serde_json::to_string(&hash).unwrap();
        assert!(json.starts_with("\"0xabab"));
        let back: TxHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
    }

    #[test]
    fn test_chain_key_is_lowercase() {
        assert_eq!(ChainKey::new("Arc").as_str(), "arc");
    }

    #[test]
    fn test_transfer_id_prefix() {
        let id = TransferId::new();
        let parsed = TransferId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
    }
}
