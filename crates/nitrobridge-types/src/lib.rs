//! NitroBridge Types - Canonical domain types for the cross-chain protection core
//!
//! This crate contains the foundational types shared by every NitroBridge
//! workflow, with zero dependencies on other nitrobridge crates:
//!
//! - Identity types (Address, TxHash, ChainKey, Account, TransferId)
//! - Stablecoin amounts at 6-decimal fixed-point precision
//! - Credit-line snapshots read from the credit terminal
//! - Transaction receipts and event logs
//! - Bridge transfer, commitment and meter-event records
//! - The error taxonomy used across all crates
//!
//! # Workflow Invariants
//!
//! 1. Within one transfer or one commit-reveal instance, steps are strictly sequential
//! 2. A mined-but-reverted transaction is a failure, never a success
//! 3. Missing protocol events are fatal; nothing is guessed from other data
//! 4. Every failure names the step it happened in and what can be resumed

pub mod identity;
pub mod amount;
pub mod credit;
pub mod receipt;
pub mod bridge;
pub mod commitment;
pub mod meter;
pub mod error;
pub mod durations;

pub use identity::*;
pub use amount::*;
pub use credit::*;
pub use receipt::*;
pub use bridge::*;
pub use commitment::*;
pub use meter::*;
pub use error::*;
pub use durations::{duration_ms, duration_secs};

/// Version of the NitroBridge types schema
pub const TYPES_VERSION: &str = "0.1.0";
