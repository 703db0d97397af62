//! NitroBridge Swap - Commit-reveal protected swaps
//!
//! A trader first commits `keccak256(amount || nonce || trader)` to the pool's
//! hook, reveals `(amount, nonce)` once the commitment is old enough, and
//! only then swaps. The hook rejects swaps tagged `REQUIRE_COMMIT` without a
//! matching reveal, so the size of a pending swap cannot be front-run.

pub mod coordinator;

pub use coordinator::{CommitRevealCoordinator, SwapConfig, SwapStatus};
pub use nitrobridge_ledger::abi::{commitment_hash, pool_id, REQUIRE_COMMIT_HOOK_DATA};
pub use nitrobridge_types::{Commitment, PoolKey, SwapPhase, SwapRequest};
