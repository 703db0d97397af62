//! Transaction receipts and event logs
//!
//! Receipts are the only evidence of inclusion we accept. `success` mirrors
//! the EVM status flag and must be checked explicitly: a mined-but-reverted
//! transaction carries a receipt too.

use serde::{Deserialize, Serialize};

use crate::{Address, Bytes32, TxHash};

/// Serde helpers for `Vec<u8>` as `0x` hex
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&crate::to_prefixed_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        crate::parse_hex_bytes(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde helpers for `Option<Vec<u8>>` as `0x` hex
pub mod opt_hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&crate::to_prefixed_hex(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        let s: Option<String> = Option::deserialize(deserializer)?;
        s.map(|s| crate::parse_hex_bytes(&s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// One event log emitted during a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature hash
    pub topics: Vec<Bytes32>,
    /// ABI-encoded non-indexed data
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl LogEntry {
    /// Whether this log is the given event emitted by the given contract
    pub fn is_event(&self, emitter: &Address, signature_topic: &Bytes32) -> bool {
        &self.address == emitter && self.topics.first() == Some(signature_topic)
    }
}

/// Receipt of an included transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub block_number: u64,
    /// EVM status flag: `false` means the transaction was mined but reverted
    pub success: bool,
    #[serde(default)]
    pub gas_used: Option<u64>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    /// Find the first log matching emitter + event signature
    pub fn find_log(&self, emitter: &Address, signature_topic: &Bytes32) -> Option<&LogEntry> {
        self.logs.iter().find(|log| log.is_event(emitter, signature_topic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_log_matches_emitter_and_topic() {
        let emitter = Address([1u8; 20]);
        let topic = Bytes32([9u8; 32]);
        let receipt = TxReceipt {
            tx_hash: TxHash([0u8; 32]),
            block_number: 10,
            success: true,
            gas_used: None,
            logs: vec![
                LogEntry { address: Address([2u8; 20]), topics: vec![topic], data: vec![] },
                LogEntry { address: emitter, topics: vec![topic], data: vec![0xaa] },
            ],
        };
        let log = receipt.find_log(&emitter, &topic).unwrap();
        assert_eq!(log.data, vec![0xaa]);
        assert!(receipt.find_log(&emitter, &Bytes32([8u8; 32])).is_none());
    }

    #[test]
    fn test_log_data_serializes_as_hex() {
        let log = LogEntry { address: Address::zero(), topics: vec![], data: vec![0xde, 0xad] };
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["data"], "0xdead");
    }
}
