//! Typed extraction of the burn message from a burn receipt
//!
//! The message is only ever taken from the transmitter's `MessageSent(bytes)`
//! log. A receipt without that log is a protocol violation; no other log or
//! calldata is consulted.

use nitrobridge_crypto::{event_topic, keccak_word};
use nitrobridge_ledger::abi::{self, signatures};
use nitrobridge_ledger::BurnMessage;
use nitrobridge_types::{Address, Bytes32, NitroBridgeError, Result, TokenAmount, TxReceipt};

/// Message bytes, their hash and decoded fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnEvidence {
    pub message_bytes: Vec<u8>,
    pub message_hash: Bytes32,
    pub message: BurnMessage,
}

/// What the burn is expected to say
#[derive(Debug, Clone, Copy)]
pub struct ExpectedBurn {
    pub amount: TokenAmount,
    pub destination_domain: u32,
    pub mint_recipient: Bytes32,
}

/// Locate and decode `MessageSent(bytes)` emitted by `transmitter`
pub fn extract_burn_message(receipt: &TxReceipt, transmitter: &Address) -> Result<BurnEvidence> {
    let topic = event_topic(signatures::MESSAGE_SENT_EVENT);
    let log = receipt
        .find_log(transmitter, &topic)
        .ok_or_else(|| NitroBridgeError::MissingEvent {
            event: "MessageSent".to_string(),
            tx_hash: receipt.tx_hash.to_string(),
        })?;
    let message_bytes = abi::decode_bytes(&log.data)?;
    let message = BurnMessage::decode(&message_bytes)?;
    Ok(BurnEvidence {
        message_hash: keccak_word(&message_bytes),
        message_bytes,
        message,
    })
}

impl BurnEvidence {
    /// Fail unless the decoded message matches what was requested
    pub fn check(&self, expected: &ExpectedBurn) -> Result<()> {
        let m = &self.message;
        if m.amount != expected.amount {
            return Err(NitroBridgeError::protocol(format!(
                "burn message amount {} differs from requested {}",
                m.amount, expected.amount
            )));
        }
        if m.destination_domain != expected.destination_domain {
            return Err(NitroBridgeError::protocol(format!(
                "burn message targets domain {}, expected {}",
                m.destination_domain, expected.destination_domain
            )));
        }
        if m.mint_recipient != expected.mint_recipient {
            return Err(NitroBridgeError::protocol("burn message mint recipient differs from requested"));
        }
        Ok(())
    }
}
