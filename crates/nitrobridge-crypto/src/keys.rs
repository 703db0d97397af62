//! secp256k1 session keys
//!
//! A `SessionKey` is an ephemeral signer for one channel session or one
//! agent identity. Its EVM address is the last 20 bytes of the Keccak-256
//! of the uncompressed public key without the `0x04` prefix.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint as _;
use nitrobridge_types::Address;
use rand::rngs::OsRng;
use serde::Serialize;

use crate::{canonical_json, keccak256, CryptoError, CryptoResult};

/// Derive the EVM address of a verifying key
pub fn address_of(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let hash = keccak256(&encoded.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&hash[12..]);
    Address(out)
}

/// Hash a message the way `personal_sign` does (EIP-191 version `0x45`)
pub fn eip191_hash(message: &[u8]) -> [u8; 32] {
    let prefix = format!("\x19Ethereum Signed Message:\n{}", message.len());
    crate::keccak256_all(&[prefix.as_bytes(), message])
}

/// Recover the signer address from a 65-byte `r || s || v` signature over a digest
pub fn recover_address(digest: &[u8; 32], signature_hex: &str) -> CryptoResult<Address> {
    let raw = signature_hex.strip_prefix("0x").unwrap_or(signature_hex);
    let bytes = hex::decode(raw).map_err(|e| CryptoError::VerificationFailed(e.to_string()))?;
    if bytes.len() != 65 {
        return Err(CryptoError::VerificationFailed(format!(
            "expected 65-byte signature, got {}",
            bytes.len()
        )));
    }
    let signature =
        Signature::from_slice(&bytes[..64]).map_err(|e| CryptoError::VerificationFailed(e.to_string()))?;
    let v = bytes[64];
    let recovery = RecoveryId::from_byte(if v >= 27 { v - 27 } else { v })
        .ok_or_else(|| CryptoError::VerificationFailed(format!("invalid recovery byte {}", v)))?;
    let key = VerifyingKey::recover_from_prehash(digest, &signature, recovery)
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))?;
    Ok(address_of(&key))
}

/// An ephemeral secp256k1 signer
#[derive(Clone)]
pub struct SessionKey {
    signing_key: SigningKey,
    address: Address,
}

impl SessionKey {
    /// Generate a fresh random key
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    /// Load from a hex private key (with or without `0x`)
    pub fn from_hex(private_key: &str) -> CryptoResult<Self> {
        let raw = private_key.trim().strip_prefix("0x").unwrap_or(private_key.trim());
        let bytes = hex::decode(raw).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let address = address_of(signing_key.verifying_key());
        Self { signing_key, address }
    }

    /// EVM address of this key
    pub fn address(&self) -> Address {
        self.address
    }

    /// Private key bytes as hex, for persisting an agent identity
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.signing_key.to_bytes()))
    }

    /// Sign a 32-byte digest; returns `0x` + `r || s || v` with `v ∈ {27, 28}`
    pub fn sign_digest(&self, digest: &[u8; 32]) -> CryptoResult<String> {
        let (signature, recovery) = self
            .signing_key
            .sign_prehash_recoverable(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let mut out = Vec::with_capacity(65);
        out.extend_from_slice(&signature.to_bytes());
        out.push(27 + recovery.to_byte());
        Ok(format!("0x{}", hex::encode(out)))
    }

    /// Sign `keccak256(message)` without a prefix
    pub fn sign_raw(&self, message: &[u8]) -> CryptoResult<String> {
        self.sign_digest(&keccak256(message))
    }

    /// Sign with the EIP-191 `personal_sign` prefix
    pub fn sign_personal(&self, message: &[u8]) -> CryptoResult<String> {
        self.sign_digest(&eip191_hash(message))
    }

    /// Sign the canonical JSON of a payload
    pub fn sign_json<T: Serialize>(&self, payload: &T) -> CryptoResult<String> {
        let json = canonical_json(payload)?;
        self.sign_raw(json.as_bytes())
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").field("address", &self.address).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // Well-known test key (hardhat account #0)
    const HARDHAT_0: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_address_derivation() {
        let key = SessionKey::from_hex(HARDHAT_0).unwrap();
        assert_eq!(key.address().to_string(), "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");
    }

    #[test]
    fn test_sign_and_recover() {
        let key = SessionKey::generate();
        let sig = key.sign_raw(b"hello").unwrap();
        assert_eq!(sig.len(), 2 + 130);
        let recovered = recover_address(&keccak256(b"hello"), &sig).unwrap();
        assert_eq!(recovered, key.address());
    }

    #[test]
    fn test_personal_sign_recovers() {
        let key = SessionKey::from_hex(HARDHAT_0).unwrap();
        let sig = key.sign_personal(b"challenge-123").unwrap();
        let recovered = recover_address(&eip191_hash(b"challenge-123"), &sig).unwrap();
        assert_eq!(recovered, key.address());
    }

    #[test]
    fn test_sign_json_is_field_order_independent() {
        let key = SessionKey::generate();
        let a = key.sign_json(&json!({"a": 1, "b": 2})).unwrap();
        let b = key.sign_json(&json!({"b": 2, "a": 1})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_bad_key() {
        assert!(matches!(SessionKey::from_hex("0x1234"), Err(CryptoError::InvalidKeyFormat(_))));
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = SessionKey::from_hex(HARDHAT_0).unwrap();
        assert!(!format!("{:?}", key).contains("ac0974"));
    }
}
