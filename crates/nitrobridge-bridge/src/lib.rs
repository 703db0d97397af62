//! NitroBridge Bridge - Cross-chain stablecoin transfers
//!
//! Moves value between chains by burning on the source, waiting for the
//! attestation service to sign the burn message, and minting on the
//! destination.
//!
//! # Guarantees
//!
//! - A burn is submitted at most once per transfer
//! - The message minted against is exactly the one emitted by the burn
//! - A failure names its step and whether it can be resumed
//! - An attestation timeout keeps the burn, and `resume` continues from it

pub mod decoder;
pub mod orchestrator;
pub mod store;

pub use decoder::{extract_burn_message, BurnEvidence, ExpectedBurn};
pub use orchestrator::{
    BridgeConfig, BridgeError, BridgeOrchestrator, BridgeResult, ChainBalance, TransferRequest,
};
pub use store::{InMemoryTransferStore, JsonFileTransferStore, TransferStore};
