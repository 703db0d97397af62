//! NitroBridge Monitor - Margin protection control loop
//!
//! Polls credit lines on the credit terminal, and when the available share of
//! an account's limit drops below its threshold, tops the account up: an
//! optional off-chain channel transfer followed by on-chain settlement.
//!
//! A decision router may be attached; it is consulted on cycles where the
//! threshold rule does not fire, and a TOP_UP verdict is executed.

pub mod executor;
pub mod monitor;
pub mod policy;

pub use executor::{TopUpExecutor, TopUpOutcome, DEFAULT_SUBMIT_TIMEOUT};
pub use monitor::{CycleOutcome, MarginMonitor, MonitorConfig, MonitorOptions, MonitorTarget, TopUpTrigger};
pub use policy::{assess, target_top_up, Assessment, DEFAULT_THRESHOLD_RATIO};
