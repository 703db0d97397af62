//! NitroBridge Agent
//!
//! Operational binary for the cross-chain protection core.
//!
//! # Usage
//!
//! ```bash
//! # Protect accounts on the credit terminal
//! nitrobridge-agent monitor --account 0xabc... --account 0xdef...
//!
//! # Bridge 25 USDC from Base Sepolia to Arc
//! nitrobridge-agent bridge 25 --from base-sepolia --to arc
//!
//! # Continue an interrupted transfer
//! nitrobridge-agent resume xfer_3f0c...
//!
//! # Environment overrides
//! NITROBRIDGE__MONITOR__INTERVAL=5 nitrobridge-agent monitor --account 0xabc...
//! ```

mod commands;
mod config;

use clap::{Args, Parser, Subcommand};
use nitrobridge_types::{Address, ChainKey, TokenAmount, TxHash};
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::{AgentConfig, LoggingConfig};

// =============================================================================
// CLI Arguments
// =============================================================================

/// NitroBridge Agent - margin protection, bridging and protected swaps
#[derive(Parser, Debug)]
#[command(name = "nitrobridge-agent")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (TOML, JSON, or YAML)
    #[arg(short, long, global = true, env = "NITROBRIDGE_CONFIG")]
    config: Option<String>,

    /// Agent private key (hex)
    #[arg(long, global = true, env = "NITROBRIDGE_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Log level or filter directive
    #[arg(long, global = true, env = "NITROBRIDGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, global = true, env = "NITROBRIDGE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch credit lines and top up accounts near liquidation
    Monitor(MonitorArgs),

    /// Bridge stablecoin between chains
    Bridge(BridgeArgs),

    /// Continue a journaled transfer, or finish one from its burn transaction
    Resume(ResumeArgs),

    /// Show stablecoin balances on every configured chain
    Balances {
        /// Owner address (defaults to the agent)
        owner: Option<Address>,
    },

    /// Swap through the commit-reveal protected pool
    Swap(SwapArgs),

    /// Open a clearing-channel session, meter usage and print the settlement intent
    Channel(ChannelArgs),
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Account to protect (repeatable)
    #[arg(long = "account", required = true)]
    accounts: Vec<Address>,

    /// Chain hosting the credit terminal
    #[arg(long, default_value = "arc")]
    chain: ChainKey,

    /// Available-credit share that triggers a top-up
    #[arg(long)]
    threshold: Option<f64>,

    /// Fixed top-up amount instead of restoring 80% availability
    #[arg(long)]
    amount: Option<TokenAmount>,

    /// Send an off-chain channel transfer ahead of each settlement
    #[arg(long)]
    channel: bool,

    /// ENS name publishing an account's credit policy, as account=name (repeatable)
    #[arg(long = "ens", value_parser = parse_ens_binding)]
    ens: Vec<(Address, String)>,

    /// Skip the decision provider and act on the threshold rule alone
    #[arg(long, env = "NITROBRIDGE_NO_DECISIONS")]
    no_decisions: bool,
}

#[derive(Args, Debug)]
struct BridgeArgs {
    /// Amount in whole or fractional USDC, e.g. 25 or 0.5
    amount: TokenAmount,

    #[arg(long)]
    from: ChainKey,

    #[arg(long)]
    to: ChainKey,

    /// Recipient on the destination chain (defaults to the agent)
    #[arg(long)]
    recipient: Option<Address>,
}

#[derive(Args, Debug)]
struct ResumeArgs {
    /// Journaled transfer id
    #[arg(required_unless_present = "burn_tx")]
    transfer_id: Option<String>,

    /// Burn transaction to finish instead of a journaled transfer
    #[arg(long, requires_all = ["from", "to"], conflicts_with = "transfer_id")]
    burn_tx: Option<TxHash>,

    #[arg(long)]
    from: Option<ChainKey>,

    #[arg(long)]
    to: Option<ChainKey>,
}

#[derive(Args, Debug)]
struct SwapArgs {
    /// Amount of the input currency
    amount: TokenAmount,

    #[arg(long, default_value = "base-sepolia")]
    chain: ChainKey,

    /// Pool currency0 (defaults to native)
    #[arg(long)]
    currency0: Option<Address>,

    /// Pool currency1 (defaults to the chain's stablecoin)
    #[arg(long)]
    currency1: Option<Address>,

    /// Sell currency0 instead of currency1
    #[arg(long)]
    zero_for_one: bool,
}

#[derive(Args, Debug)]
struct ChannelArgs {
    /// App session counterparty
    #[arg(long)]
    counterparty: Option<Address>,

    /// Meter event as `action=amount` (repeatable)
    #[arg(long = "meter", value_parser = parse_meter_event)]
    meter: Vec<(String, TokenAmount)>,
}

fn parse_meter_event(s: &str) -> Result<(String, TokenAmount), String> {
    let (action, amount) = s
        .split_once('=')
        .ok_or_else(|| format!("expected action=amount, got '{}'", s))?;
    if action.is_empty() {
        return Err("action must not be empty".to_string());
    }
    let amount = TokenAmount::from_human(amount).map_err(|e| e.to_string())?;
    Ok((action.to_string(), amount))
}

fn parse_ens_binding(s: &str) -> Result<(Address, String), String> {
    let (account, name) = s
        .split_once('=')
        .ok_or_else(|| format!("expected account=name, got '{}'", s))?;
    let account = account.parse::<Address>().map_err(|e| e.to_string())?;
    if name.trim().is_empty() {
        return Err("ENS name must not be empty".to_string());
    }
    Ok((account, name.trim().to_string()))
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut agent_config = AgentConfig::load(cli.config.as_deref())?;
    if let Some(key) = cli.private_key {
        agent_config.agent.private_key = Some(key);
    }
    if let Some(level) = cli.log_level {
        agent_config.logging.level = level;
    }
    if let Some(format) = cli.log_format {
        agent_config.logging.format = format;
    }

    init_logging(&agent_config.logging);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting NitroBridge agent");

    match cli.command {
        Commands::Monitor(args) => commands::monitor(&agent_config, args).await,
        Commands::Bridge(args) => commands::bridge(&agent_config, args).await,
        Commands::Resume(args) => commands::resume(&agent_config, args).await,
        Commands::Balances { owner } => commands::balances(&agent_config, owner).await,
        Commands::Swap(args) => commands::swap(&agent_config, args).await,
        Commands::Channel(args) => commands::channel(&agent_config, args).await,
    }
}

// =============================================================================
// Initialization Functions
// =============================================================================

/// Initialize tracing/logging
fn init_logging(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match config.format.as_str() {
        "json" => {
            subscriber.with(fmt::layer().json().with_target(true)).init();
        }
        _ => {
            subscriber.with(fmt::layer().pretty().with_target(true)).init();
        }
    }
}

// =============================================================================
// Graceful Shutdown
// =============================================================================

/// Wait for Ctrl+C or SIGTERM
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monitor_parsing() {
        let cli = Cli::parse_from([
            "nitrobridge-agent",
            "monitor",
            "--account",
            "0x1111111111111111111111111111111111111111",
            "--threshold",
            "0.3",
        ]);
        match cli.command {
            Commands::Monitor(args) => {
                assert_eq!(args.accounts, vec![Address([0x11; 20])]);
                assert_eq!(args.chain, ChainKey::new("arc"));
                assert_eq!(args.threshold, Some(0.3));
                assert!(!args.no_decisions);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_decisions_can_be_switched_off() {
        let cli = Cli::parse_from([
            "nitrobridge-agent",
            "monitor",
            "--account",
            "0x1111111111111111111111111111111111111111",
            "--no-decisions",
        ]);
        match cli.command {
            Commands::Monitor(args) => assert!(args.no_decisions),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_bridge_amount_is_human() {
        let cli = Cli::parse_from(["nitrobridge-agent", "bridge", "0.5", "--from", "base-sepolia", "--to", "arc"]);
        match cli.command {
            Commands::Bridge(args) => assert_eq!(args.amount, TokenAmount::from_raw(500_000)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_resume_by_burn_needs_chains() {
        let tx = format!("0x{}", "ab".repeat(32));
        assert!(Cli::try_parse_from(["nitrobridge-agent", "resume", "--burn-tx", tx.as_str()]).is_err());
        assert!(Cli::try_parse_from([
            "nitrobridge-agent",
            "resume",
            "--burn-tx",
            tx.as_str(),
            "--from",
            "sepolia",
            "--to",
            "arc"
        ])
        .is_ok());
    }

    #[test]
    fn test_meter_event_parsing() {
        assert_eq!(
            parse_meter_event("api_call=0.01").unwrap(),
            ("api_call".to_string(), TokenAmount::from_raw(10_000))
        );
        assert!(parse_meter_event("api_call").is_err());
        assert!(parse_meter_event("=1").is_err());
    }

    #[test]
    fn test_ens_binding_parsing() {
        let cli = Cli::parse_from([
            "nitrobridge-agent",
            "monitor",
            "--account",
            "0x1111111111111111111111111111111111111111",
            "--ens",
            "0x1111111111111111111111111111111111111111=alice.eth",
        ]);
        match cli.command {
            Commands::Monitor(args) => assert_eq!(args.ens, vec![(Address([0x11; 20]), "alice.eth".to_string())]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse_ens_binding("alice.eth").is_err());
        assert!(parse_ens_binding("0x1111111111111111111111111111111111111111=").is_err());
    }
}
