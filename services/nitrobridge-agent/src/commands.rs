//! Subcommand implementations
//!
//! Every command validates its configuration before touching the network.
//! Results are printed to stdout as JSON; progress goes to the log.

use std::sync::Arc;

use anyhow::Context;
use nitrobridge_attestation::IrisClient;
use nitrobridge_bridge::{BridgeError, BridgeOrchestrator, JsonFileTransferStore, TransferRequest};
use nitrobridge_channel::ChannelSession;
use nitrobridge_crypto::SessionKey;
use nitrobridge_decision::DecisionRouter;
use nitrobridge_ledger::{EnsReputation, EvmLedger, LedgerClient};
use nitrobridge_monitor::{MarginMonitor, MonitorOptions, TopUpExecutor};
use nitrobridge_swap::{CommitRevealCoordinator, PoolKey};
use nitrobridge_types::{Account, Address, TransferId};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::{shutdown_signal, BridgeArgs, ChannelArgs, MonitorArgs, ResumeArgs, SwapArgs};

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn identity(config: &AgentConfig) -> anyhow::Result<SessionKey> {
    let key = config.private_key()?;
    SessionKey::from_hex(key).context("invalid agent private key")
}

fn connect_ledger(config: &AgentConfig, chain: &nitrobridge_types::ChainKey) -> anyhow::Result<EvmLedger> {
    let registry = config.chain_registry()?;
    let chain = registry.get(chain)?.clone();
    Ok(EvmLedger::connect_with_timeout(chain, config.private_key()?, config.rpc.request_timeout)?)
}

async fn connect_channel(config: &AgentConfig) -> anyhow::Result<ChannelSession> {
    let identity = identity(config)?;
    let session_key = SessionKey::generate();
    info!(
        relay = %config.channel.ws_url,
        identity = %identity.address(),
        session_key = %session_key.address(),
        "Connecting to clearing relay"
    );
    let session = ChannelSession::connect_ws(config.channel.clone(), Arc::new(identity), Arc::new(session_key)).await?;
    Ok(session)
}

// =============================================================================
// monitor
// =============================================================================

pub async fn monitor(config: &AgentConfig, args: MonitorArgs) -> anyhow::Result<()> {
    let ledger: Arc<dyn LedgerClient> = Arc::new(connect_ledger(config, &args.chain)?);
    ledger.chain().credit_terminal()?;

    let mut executor = TopUpExecutor::new(ledger.clone(), config.monitor.confirmation.clone())
        .with_retry(config.monitor.retry.clone());
    let mut channel = None;
    if args.channel {
        match connect_channel(config).await {
            Ok(session) => {
                executor = executor.with_channel(session.clone());
                channel = Some(session);
            }
            Err(e) => warn!(error = %e, "Channel unavailable, top-ups settle on-chain only"),
        }
    }

    let mut monitor = MarginMonitor::new(executor, config.monitor.clone());
    if !args.no_decisions {
        let router = DecisionRouter::from_config(&config.decision)?;
        info!(provider = router.primary_name().unwrap_or("rules"), "Decision provider attached");
        monitor = monitor.with_decision_router(Arc::new(router));
    }

    let options = MonitorOptions {
        threshold_ratio: args.threshold,
        top_up_override: args.amount,
    };
    let reputation = if args.ens.is_empty() {
        None
    } else {
        Some(EnsReputation::new(Arc::new(connect_ledger(config, &config.ens.chain)?)))
    };
    for address in &args.accounts {
        let name = args.ens.iter().find(|(account, _)| account == address).map(|(_, name)| name.as_str());
        let options = match (&reputation, name) {
            (Some(reputation), Some(name)) => {
                match seed_from_ens(reputation, ledger.as_ref(), *address, name, options).await {
                    Some(options) => options,
                    None => continue,
                }
            }
            _ => options,
        };
        monitor
            .start_monitoring(Account::new(*address, args.chain.clone()), options)
            .await?;
    }

    shutdown_signal().await;

    let stopped = monitor.stop_all().await;
    if let Some(session) = channel {
        session.disconnect().await;
    }
    print_json(&stopped)
}

/// Apply the account's ENS credit policy; `None` when the owner opted out.
/// Unreadable records leave the options untouched.
async fn seed_from_ens(
    reputation: &EnsReputation,
    ledger: &dyn LedgerClient,
    account: Address,
    name: &str,
    options: MonitorOptions,
) -> Option<MonitorOptions> {
    match ledger.credit_line(account).await {
        Ok(line) if line.has_ens_name() && line.ens_hash != EnsReputation::ens_hash(name) => {
            warn!(account = %account, name, "ENS name does not match the credit line's ensHash");
        }
        Ok(_) => {}
        Err(e) => warn!(account = %account, error = %e, "Could not read credit line for ENS check"),
    }

    let policy = match reputation.credit_policy(name).await {
        Ok(Some(policy)) => policy,
        Ok(None) => {
            info!(account = %account, name, "No credit policy published, using defaults");
            return Some(options);
        }
        Err(e) => {
            warn!(account = %account, name, error = %e, "Credit policy unreadable, using defaults");
            return Some(options);
        }
    };
    if !policy.authorizes(ledger.signer()) {
        warn!(account = %account, agent = %ledger.signer(), "Agent is not in the owner's authorized agents");
    }
    match options.with_policy(&policy) {
        Some(seeded) => {
            info!(account = %account, name, threshold = ?seeded.threshold_ratio, "Credit policy applied");
            Some(seeded)
        }
        None => {
            info!(account = %account, name, "Owner disabled automatic top-ups, not monitoring");
            None
        }
    }
}

// =============================================================================
// bridge / resume / balances
// =============================================================================

async fn orchestrator(config: &AgentConfig) -> anyhow::Result<BridgeOrchestrator> {
    let registry = config.chain_registry()?;
    let key = config.private_key()?;
    let attestation = IrisClient::new(
        config.attestation.base_url.clone(),
        config.attestation.version,
        config.attestation.request_timeout,
    )?;
    let store = JsonFileTransferStore::open(&config.bridge.store_dir)
        .await
        .with_context(|| format!("opening transfer journal at {}", config.bridge.store_dir.display()))?;

    let mut orchestrator = BridgeOrchestrator::new(Arc::new(attestation), Arc::new(store), config.bridge_config());
    for chain in registry.iter() {
        let ledger = EvmLedger::connect_with_timeout(chain.clone(), key, config.rpc.request_timeout)?;
        orchestrator = orchestrator.with_ledger(Arc::new(ledger));
    }
    Ok(orchestrator)
}

/// Print the failure record before returning the error
fn report(result: Result<nitrobridge_types::BridgeTransfer, BridgeError>) -> anyhow::Result<()> {
    match result {
        Ok(transfer) => print_json(&transfer),
        Err(err) => {
            if let Some(transfer) = err.transfer() {
                print_json(transfer)?;
                warn!(
                    transfer_id = %transfer.id,
                    funds = ?transfer.funds_location(),
                    resumable = err.is_resumable(),
                    "Transfer failed"
                );
            }
            Err(err.into())
        }
    }
}

pub async fn bridge(config: &AgentConfig, args: BridgeArgs) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config).await?;
    let recipient = match args.recipient {
        Some(recipient) => recipient,
        None => identity(config)?.address(),
    };
    let request = TransferRequest {
        amount: args.amount,
        source: args.from,
        dest: args.to,
        recipient,
    };
    report(orchestrator.transfer(request).await)
}

pub async fn resume(config: &AgentConfig, args: ResumeArgs) -> anyhow::Result<()> {
    let orchestrator = orchestrator(config).await?;
    let result = match (args.transfer_id, args.burn_tx, args.from, args.to) {
        (Some(id), _, _, _) => {
            let id = TransferId::parse(&id).with_context(|| format!("invalid transfer id '{}'", id))?;
            orchestrator.resume(&id).await
        }
        (None, Some(burn_tx), Some(from), Some(to)) => orchestrator.resume_from_burn(&from, &to, burn_tx).await,
        _ => anyhow::bail!("either a transfer id or --burn-tx with --from and --to is required"),
    };
    report(result)
}

pub async fn balances(config: &AgentConfig, owner: Option<Address>) -> anyhow::Result<()> {
    let owner = match owner {
        Some(owner) => owner,
        None => identity(config)?.address(),
    };
    let registry = config.chain_registry()?;
    // Reads only; an ephemeral key stands in when none is configured.
    let key = match config.private_key() {
        Ok(key) => key.to_string(),
        Err(_) => SessionKey::generate().to_hex(),
    };

    let mut orchestrator = BridgeOrchestrator::new(
        Arc::new(IrisClient::new(
            config.attestation.base_url.clone(),
            config.attestation.version,
            config.attestation.request_timeout,
        )?),
        Arc::new(nitrobridge_bridge::InMemoryTransferStore::new()),
        config.bridge_config(),
    );
    for chain in registry.iter() {
        let ledger = EvmLedger::connect_with_timeout(chain.clone(), &key, config.rpc.request_timeout)?;
        orchestrator = orchestrator.with_ledger(Arc::new(ledger));
    }
    print_json(&orchestrator.balances(owner).await)
}

// =============================================================================
// swap
// =============================================================================

pub async fn swap(config: &AgentConfig, args: SwapArgs) -> anyhow::Result<()> {
    let ledger = connect_ledger(config, &args.chain)?;
    let chain = ledger.chain();
    let pool_key = PoolKey::standard(
        args.currency0.unwrap_or_else(Address::zero),
        args.currency1.unwrap_or(chain.contracts.usdc),
        chain.commit_hook()?,
    );
    let mut swap_config = config.swap.clone();
    swap_config.zero_for_one = args.zero_for_one;

    let coordinator = CommitRevealCoordinator::new(Arc::new(ledger), pool_key, swap_config)?;
    info!(pool_id = %coordinator.pool_id(), amount = %args.amount, "Starting protected swap");
    match coordinator.run(args.amount).await {
        Ok(status) => print_json(&status),
        Err(e) => {
            print_json(&coordinator.status().await)?;
            Err(e.into())
        }
    }
}

// =============================================================================
// channel
// =============================================================================

#[derive(Serialize)]
struct ChannelReport {
    app_session_id: String,
    balances: Vec<nitrobridge_channel::LedgerBalance>,
    settlement_intent: Option<nitrobridge_channel::SettlementIntent>,
}

pub async fn channel(config: &AgentConfig, args: ChannelArgs) -> anyhow::Result<()> {
    let session = connect_channel(config).await?;
    let outcome = async {
        let app_session_id = session.create_app_session(args.counterparty).await?;
        for (action, amount) in &args.meter {
            session.record_meter_event(action, *amount).await?;
        }
        let settlement_intent = if args.meter.is_empty() {
            None
        } else {
            Some(session.settlement_intent().await?)
        };
        let balances = session.refresh_balances().await?;
        anyhow::Ok(ChannelReport {
            app_session_id,
            balances,
            settlement_intent,
        })
    }
    .await;
    session.disconnect().await;
    print_json(&outcome?)
}
