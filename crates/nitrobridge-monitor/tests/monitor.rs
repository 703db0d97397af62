//! Margin monitor against the simulated chain

use std::sync::Arc;
use std::time::Duration;

use nitrobridge_decision::DecisionRouter;
use nitrobridge_ledger::ens::CREDIT_POLICY_KEY;
use nitrobridge_ledger::{
    ChainRegistry, ConfirmationPolicy, CreditPolicy, EnsReputation, InMemoryLedger, InMemoryTextRecords, LedgerClient,
    LedgerFault, RetryPolicy,
};
use nitrobridge_monitor::{
    Assessment, CycleOutcome, MarginMonitor, MonitorConfig, MonitorOptions, TopUpExecutor, TopUpTrigger,
};
use nitrobridge_types::{Account, Address, Bytes32, ChainKey, CreditLine, TokenAmount};

const AGENT: Address = Address([0xa6; 20]);
const ALICE: Address = Address([0x11; 20]);
const BOB: Address = Address([0x22; 20]);

fn line(deposited: u64, borrowed: u64, limit: u64) -> CreditLine {
    CreditLine {
        deposited: TokenAmount::from_whole(deposited),
        borrowed: TokenAmount::from_whole(borrowed),
        credit_limit: TokenAmount::from_whole(limit),
        last_update: 0,
        ens_hash: Bytes32::zero(),
    }
}

async fn arc_ledger() -> InMemoryLedger {
    let chain = ChainRegistry::testnets().get(&ChainKey::new("arc")).cloned().unwrap();
    let ledger = InMemoryLedger::new(chain, AGENT);
    ledger.mint_tokens(AGENT, TokenAmount::from_whole(100_000)).await;
    ledger.authorize_agent(AGENT).await;
    ledger
}

fn config() -> MonitorConfig {
    MonitorConfig {
        interval: Duration::from_secs(10),
        cycle_read_timeout: Duration::from_secs(30),
        submit_timeout: Duration::from_secs(30),
        confirmation: ConfirmationPolicy {
            poll_interval: Duration::from_millis(10),
            timeout: Duration::from_secs(5),
        },
        retry: RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn monitor_for(ledger: &InMemoryLedger) -> MarginMonitor {
    let config = config();
    let executor =
        TopUpExecutor::new(Arc::new(ledger.clone()), config.confirmation.clone()).with_retry(config.retry.clone());
    MarginMonitor::new(executor, config)
}

fn arc(address: Address) -> Account {
    Account::new(address, "arc")
}

#[tokio::test(start_paused = true)]
async fn test_near_liquidation_topped_up_once() {
    let ledger = arc_ledger().await;
    ledger.set_credit_line(ALICE, line(10_000, 8_500, 15_000)).await;
    let monitor = monitor_for(&ledger);

    monitor.start_monitoring(arc(ALICE), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(25)).await;
    let target = monitor.stop_monitoring(&ALICE).await.unwrap();

    let top_ups = ledger.submitted_for("agent_top_up").await;
    assert_eq!(top_ups.len(), 1);
    assert_eq!(top_ups[0].args[1], TokenAmount::from_whole(10_500).to_be_word().to_vec());
    assert_eq!(ledger.credit_line(ALICE).await.unwrap().deposited, TokenAmount::from_whole(20_500));

    assert_eq!(target.cycles, 3);
    assert!(target.last_top_up_at.is_some());
    assert!(matches!(
        target.last_outcome,
        Some(CycleOutcome::NoAction {
            assessment: Assessment::Healthy { .. },
            decision: None
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_account_without_credit_line_skipped() {
    let ledger = arc_ledger().await;
    let monitor = monitor_for(&ledger);

    monitor.start_monitoring(arc(ALICE), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let target = monitor.target(&ALICE).await.unwrap();
    assert_eq!(target.last_outcome, Some(CycleOutcome::NoCreditLine));
    assert!(ledger.submitted_for("agent_top_up").await.is_empty());
    monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_stalled_account_does_not_block_others() {
    let ledger = arc_ledger().await;
    ledger.set_credit_line(ALICE, line(10_000, 8_500, 15_000)).await;
    ledger.set_credit_line(BOB, line(10_000, 1_000, 15_000)).await;
    ledger.stall_reads_for(BOB).await;
    let monitor = monitor_for(&ledger);

    monitor.start_monitoring(arc(BOB), MonitorOptions::default()).await.unwrap();
    monitor.start_monitoring(arc(ALICE), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(35)).await;

    let alice = monitor.target(&ALICE).await.unwrap();
    assert_eq!(alice.cycles, 4);
    assert_eq!(ledger.submitted_for("agent_top_up").await.len(), 1);

    // Read timeout fired at 30s; the next cycle is not due until 40s.
    let bob = monitor.target(&BOB).await.unwrap();
    assert_eq!(bob.cycles, 1);
    assert!(bob.skipped_ticks >= 3);
    assert!(matches!(bob.last_outcome, Some(CycleOutcome::ReadFailed { .. })));

    monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_waits_for_in_flight_cycle() {
    let ledger = arc_ledger().await;
    ledger.set_credit_line(ALICE, line(10_000, 8_500, 15_000)).await;
    ledger.stall_reads_for(ALICE).await;
    let monitor = monitor_for(&ledger);

    monitor.start_monitoring(arc(ALICE), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let target = monitor.stop_monitoring(&ALICE).await.unwrap();
    assert_eq!(target.cycles, 1);
    assert!(matches!(target.last_outcome, Some(CycleOutcome::ReadFailed { .. })));
    assert!(!monitor.is_monitoring(&ALICE));
    assert!(monitor.stop_monitoring(&ALICE).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_hung_top_up_does_not_block_other_accounts() {
    let ledger = arc_ledger().await;
    ledger.set_credit_line(ALICE, line(10_000, 8_500, 15_000)).await;
    ledger.set_credit_line(BOB, line(10_000, 8_500, 15_000)).await;
    ledger.inject_fault("agent_top_up", LedgerFault::Hang).await;
    let monitor = Arc::new(monitor_for(&ledger));

    // ALICE's first cycle takes the hanging submission.
    monitor.start_monitoring(arc(ALICE), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let stopping = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.stop_monitoring(&ALICE).await })
    };
    tokio::task::yield_now().await;

    tokio::time::timeout(
        Duration::from_secs(1),
        monitor.start_monitoring(arc(BOB), MonitorOptions::default()),
    )
    .await
    .expect("BOB starts while ALICE drains")
    .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let bob = monitor.target(&BOB).await.unwrap();
    assert!(matches!(bob.last_outcome, Some(CycleOutcome::ToppedUp { .. })));
    assert!(!stopping.is_finished());

    // The submission deadline ends ALICE's cycle, then the stop completes.
    let alice = stopping.await.unwrap().unwrap();
    match alice.last_outcome {
        Some(CycleOutcome::TopUpFailed { error, .. }) => assert!(error.contains("agentTopUp submission")),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(alice.cycles, 1);
    assert!(!monitor.is_monitoring(&ALICE));
    assert_eq!(ledger.submitted_for("agent_top_up").await.len(), 1);

    let stopped = monitor.stop_all().await;
    assert_eq!(stopped.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_restart_replaces_existing_loop() {
    let ledger = arc_ledger().await;
    ledger.set_credit_line(ALICE, line(10_000, 1_000, 15_000)).await;
    let monitor = monitor_for(&ledger);

    monitor.start_monitoring(arc(ALICE), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(15)).await;
    monitor
        .start_monitoring(
            arc(ALICE),
            MonitorOptions {
                threshold_ratio: Some(0.5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let targets = monitor.targets().await;
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].threshold_ratio, 0.5);
    assert_eq!(targets[0].cycles, 1);
    monitor.stop_all().await;
}

#[tokio::test(start_paused = true)]
async fn test_decision_router_can_trigger_top_up() {
    let ledger = arc_ledger().await;
    // 60% utilized, yet a third of the limit is still available.
    ledger.set_credit_line(ALICE, line(10_000, 9_000, 15_000)).await;
    ledger.set_available_credit(ALICE, TokenAmount::from_whole(5_000)).await;
    let monitor = monitor_for(&ledger).with_decision_router(Arc::new(DecisionRouter::rules_only()));

    monitor.start_monitoring(arc(ALICE), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    let target = monitor.stop_monitoring(&ALICE).await.unwrap();
    match target.last_outcome {
        Some(CycleOutcome::ToppedUp { trigger, amount, .. }) => {
            assert_eq!(trigger, TopUpTrigger::Decision);
            assert_eq!(amount, TokenAmount::from_whole(100));
        }
        other => panic!("expected decision top-up, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_top_up_does_not_stop_loop() {
    let ledger = arc_ledger().await;
    ledger.set_credit_line(ALICE, line(10_000, 8_500, 15_000)).await;
    ledger.inject_fault("agent_top_up", LedgerFault::Revert).await;
    let monitor = monitor_for(&ledger);

    monitor.start_monitoring(arc(ALICE), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    let first = monitor.target(&ALICE).await.unwrap();
    assert!(matches!(
        first.last_outcome,
        Some(CycleOutcome::TopUpFailed {
            trigger: TopUpTrigger::Threshold,
            ..
        })
    ));

    tokio::time::sleep(Duration::from_secs(10)).await;
    let target = monitor.stop_monitoring(&ALICE).await.unwrap();
    assert!(matches!(target.last_outcome, Some(CycleOutcome::ToppedUp { .. })));
    assert_eq!(ledger.credit_line(ALICE).await.unwrap().deposited, TokenAmount::from_whole(20_500));
}

#[tokio::test]
async fn test_rejects_foreign_chain_and_bad_threshold() {
    let ledger = arc_ledger().await;
    let monitor = monitor_for(&ledger);

    let err = monitor
        .start_monitoring(Account::new(ALICE, "base-sepolia"), MonitorOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_INPUT");

    let err = monitor
        .start_monitoring(
            arc(ALICE),
            MonitorOptions {
                threshold_ratio: Some(1.5),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_INPUT");
    assert!(!monitor.is_monitoring(&ALICE));
}

#[tokio::test(start_paused = true)]
async fn test_ens_policy_sets_threshold() {
    let ledger = arc_ledger().await;
    // 25% available: healthy at the default threshold.
    ledger.set_credit_line(ALICE, line(10_000, 6_250, 15_000)).await;
    ledger.set_credit_line(BOB, line(10_000, 6_250, 15_000)).await;

    let records = InMemoryTextRecords::new();
    records.set_resolver("alice.eth", Address([0x44; 20])).await;
    records
        .put("alice.eth", CREDIT_POLICY_KEY, r#"{"autoTopUpThreshold":35}"#)
        .await;
    let reputation = EnsReputation::new(Arc::new(records));
    let policy = reputation.credit_policy("alice.eth").await.unwrap().unwrap();

    let seeded = MonitorOptions::default().with_policy(&policy).unwrap();
    assert_eq!(seeded.threshold_ratio, Some(0.35));

    let monitor = monitor_for(&ledger);
    monitor.start_monitoring(arc(ALICE), seeded).await.unwrap();
    monitor.start_monitoring(arc(BOB), MonitorOptions::default()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;

    let top_ups = ledger.submitted_for("agent_top_up").await;
    assert_eq!(top_ups.len(), 1);
    assert_eq!(top_ups[0].args[1], TokenAmount::from_whole(8_250).to_be_word().to_vec());
    assert_eq!(monitor.target(&ALICE).await.unwrap().threshold_ratio, 0.35);
    assert_eq!(monitor.stop_all().await.len(), 2);
}

#[test]
fn test_policy_seeding_rules() {
    let explicit = MonitorOptions {
        threshold_ratio: Some(0.5),
        top_up_override: None,
    };
    let policy = CreditPolicy {
        auto_top_up_threshold: 30.0,
        ..Default::default()
    };
    assert_eq!(explicit.with_policy(&policy).unwrap().threshold_ratio, Some(0.5));

    let disabled = CreditPolicy {
        auto_top_up_enabled: false,
        ..Default::default()
    };
    assert_eq!(MonitorOptions::default().with_policy(&disabled), None);
}
