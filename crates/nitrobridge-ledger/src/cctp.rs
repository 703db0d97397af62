//! CCTP message format
//!
//! ```text
//! header (116 bytes)
//!   version u32 | source_domain u32 | destination_domain u32 | nonce u64
//!   sender bytes32 | recipient bytes32 | destination_caller bytes32
//! burn body (132 bytes)
//!   version u32 | burn_token bytes32 | mint_recipient bytes32
//!   amount uint256 | message_sender bytes32
//! ```
//!
//! The bridge treats messages as opaque for minting; decoding exists so the
//! orchestrator can check a burn message says what it asked for.

use nitrobridge_types::{Bytes32, NitroBridgeError, Result, TokenAmount};

const HEADER_LEN: usize = 116;
const BODY_LEN: usize = 132;

/// Decoded burn message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnMessage {
    pub version: u32,
    pub source_domain: u32,
    pub destination_domain: u32,
    pub nonce: u64,
    pub sender: Bytes32,
    pub recipient: Bytes32,
    pub destination_caller: Bytes32,
    pub burn_token: Bytes32,
    pub mint_recipient: Bytes32,
    pub amount: TokenAmount,
    pub message_sender: Bytes32,
}

fn read_u32(b: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&b[at..at + 4]);
    u32::from_be_bytes(buf)
}

fn read_u64(b: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&b[at..at + 8]);
    u64::from_be_bytes(buf)
}

fn read_word(b: &[u8], at: usize) -> Bytes32 {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&b[at..at + 32]);
    Bytes32(buf)
}

impl BurnMessage {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + BODY_LEN);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.source_domain.to_be_bytes());
        out.extend_from_slice(&self.destination_domain.to_be_bytes());
        out.extend_from_slice(&self.nonce.to_be_bytes());
        out.extend_from_slice(&self.sender.0);
        out.extend_from_slice(&self.recipient.0);
        out.extend_from_slice(&self.destination_caller.0);
        out.extend_from_slice(&self.version.to_be_bytes());
        out.extend_from_slice(&self.burn_token.0);
        out.extend_from_slice(&self.mint_recipient.0);
        out.extend_from_slice(&self.amount.to_be_word());
        out.extend_from_slice(&self.message_sender.0);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN + BODY_LEN {
            return Err(NitroBridgeError::protocol(format!(
                "burn message too short: {} bytes, expected at least {}",
                bytes.len(),
                HEADER_LEN + BODY_LEN
            )));
        }
        let body = HEADER_LEN;
        let amount_word = read_word(bytes, body + 68);
        if amount_word.0[..16].iter().any(|b| *b != 0) {
            return Err(NitroBridgeError::AmountOverflow);
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&amount_word.0[16..]);
        Ok(Self {
            version: read_u32(bytes, 0),
            source_domain: read_u32(bytes, 4),
            destination_domain: read_u32(bytes, 8),
            nonce: read_u64(bytes, 12),
            sender: read_word(bytes, 20),
            recipient: read_word(bytes, 52),
            destination_caller: read_word(bytes, 84),
            burn_token: read_word(bytes, body + 4),
            mint_recipient: read_word(bytes, body + 36),
            amount: TokenAmount::from_raw(u128::from_be_bytes(low)),
            message_sender: read_word(bytes, body + 100),
        })
    }

    /// Key a destination transmitter uses to reject replays
    pub fn source_and_nonce(&self) -> (u32, u64) {
        (self.source_domain, self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let msg = BurnMessage {
            version: 0,
            source_domain: 0,
            destination_domain: 10,
            nonce: 42,
            sender: Bytes32([1; 32]),
            recipient: Bytes32([2; 32]),
            destination_caller: Bytes32::zero(),
            burn_token: Bytes32([3; 32]),
            mint_recipient: Bytes32([4; 32]),
            amount: TokenAmount::from_whole(100),
            message_sender: Bytes32([5; 32]),
        };
        let bytes = msg.encode();
        assert_eq!(bytes.len(), 248);
        assert_eq!(BurnMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_short_message_rejected() {
        assert!(BurnMessage::decode(&[0u8; 100]).is_err());
    }
}
