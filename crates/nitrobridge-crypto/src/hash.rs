//! Keccak-256 hashing

use nitrobridge_types::Bytes32;
use sha3::{Digest, Keccak256};

/// Compute Keccak-256 of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute Keccak-256 of the concatenation of several items
pub fn keccak256_all(items: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for item in items {
        hasher.update(item);
    }
    hasher.finalize().into()
}

/// Keccak-256 as a `Bytes32`
pub fn keccak_word(data: &[u8]) -> Bytes32 {
    Bytes32(keccak256(data))
}

/// Topic hash of an event signature such as `MessageSent(bytes)`
pub fn event_topic(signature: &str) -> Bytes32 {
    keccak_word(signature.as_bytes())
}

/// First four bytes of the Keccak-256 of a function signature
pub fn function_selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// ENS namehash: fold the label hashes from the rightmost label inwards.
/// The empty name hashes to the zero word.
pub fn namehash(name: &str) -> Bytes32 {
    let mut node = [0u8; 32];
    if !name.is_empty() {
        for label in name.rsplit('.') {
            node = keccak256_all(&[&node, &keccak256(label.as_bytes())]);
        }
    }
    Bytes32(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_erc20_selectors() {
        assert_eq!(hex::encode(function_selector("transfer(address,uint256)")), "a9059cbb");
        assert_eq!(hex::encode(function_selector("approve(address,uint256)")), "095ea7b3");
        assert_eq!(hex::encode(function_selector("balanceOf(address)")), "70a08231");
    }

    #[test]
    fn test_transfer_event_topic() {
        assert_eq!(
            event_topic("Transfer(address,address,uint256)").to_string(),
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
        );
    }

    #[test]
    fn test_keccak_all_matches_concat() {
        assert_eq!(keccak256_all(&[b"ab", b"cd"]), keccak256(b"abcd"));
    }

    #[test]
    fn test_namehash_vectors() {
        assert_eq!(namehash(""), Bytes32([0u8; 32]));
        assert_eq!(
            hex::encode(namehash("eth").as_bytes()),
            "93cdeb708b7545dc668eb9280176169d1c33cfd8ed6f04690a0bcc88a93fc4ae"
        );
        assert_eq!(
            hex::encode(namehash("foo.eth").as_bytes()),
            "de9b09fd7c5f901e23a3f19fecc54828e9c848539801e86591bd9801b019f84f"
        );
    }
}
