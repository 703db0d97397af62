//! Commit-reveal swaps against the simulated chain

use std::sync::Arc;
use std::time::Duration;

use nitrobridge_ledger::{ChainConfig, ChainRegistry, CommitPolicy, ConfirmationPolicy, InMemoryLedger, LedgerClient};
use nitrobridge_swap::{commitment_hash, CommitRevealCoordinator, PoolKey, SwapConfig, SwapPhase};
use nitrobridge_types::{Address, Bytes32, ChainKey, TokenAmount};

const TRADER: Address = Address([0x77; 20]);
const HOOK: Address = Address([0xc0; 20]);

fn hooked_chain() -> ChainConfig {
    let mut chain = ChainRegistry::testnets()
        .get(&ChainKey::new("base-sepolia"))
        .cloned()
        .unwrap();
    chain.contracts.commit_hook = Some(HOOK);
    chain
}

async fn funded_ledger(chain: ChainConfig) -> InMemoryLedger {
    let ledger = InMemoryLedger::new(chain, TRADER);
    ledger.mint_tokens(TRADER, TokenAmount::from_whole(1_000)).await;
    ledger
}

fn pool_key(chain: &ChainConfig) -> PoolKey {
    PoolKey::standard(Address::zero(), chain.contracts.usdc, HOOK)
}

fn config(min_commit_age: u64) -> SwapConfig {
    SwapConfig {
        min_commit_age,
        block_poll_interval: Duration::from_millis(10),
        maturity_timeout: Duration::from_secs(1),
        confirmation: ConfirmationPolicy {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_secs(1),
        },
        ..Default::default()
    }
}

fn coordinator(ledger: &InMemoryLedger, min_commit_age: u64) -> CommitRevealCoordinator {
    let chain = ledger.chain().clone();
    CommitRevealCoordinator::new(Arc::new(ledger.clone()), pool_key(&chain), config(min_commit_age)).unwrap()
}

fn operations(txs: &[nitrobridge_ledger::SubmittedTx]) -> Vec<&'static str> {
    txs.iter().map(|tx| tx.operation).collect()
}

#[tokio::test]
async fn test_full_sequence_executes_swap() {
    let ledger = funded_ledger(hooked_chain()).await;
    let coordinator = coordinator(&ledger, 1);

    let status = coordinator.run(TokenAmount::from_whole(25)).await.unwrap();

    assert_eq!(status.phase, SwapPhase::Executed);
    assert!(status.commit_tx.is_some() && status.reveal_tx.is_some() && status.swap_tx.is_some());
    let submitted = ledger.submitted().await;
    assert_eq!(operations(&submitted), vec!["commit", "reveal", "approve", "swap"]);
    assert!(submitted.iter().all(|tx| tx.success));
    assert_eq!(submitted[3].args[2], b"REQUIRE_COMMIT".to_vec());
    assert_eq!(ledger.balance_of(TRADER).await.unwrap(), TokenAmount::from_whole(975));
}

#[tokio::test]
async fn test_nonce_not_sent_before_reveal() {
    let ledger = funded_ledger(hooked_chain()).await;
    let coordinator = coordinator(&ledger, 1);
    let amount = TokenAmount::from_whole(10);

    coordinator.commit(amount).await.unwrap();
    coordinator.reveal().await.unwrap();

    let commit = &ledger.submitted_for("commit").await[0];
    let reveal = &ledger.submitted_for("reveal").await[0];
    let nonce = Bytes32(reveal.args[1].clone().try_into().unwrap());
    assert!(commit.args.iter().all(|arg| arg != &reveal.args[1]));
    assert_eq!(commit.args[0], commitment_hash(amount, &nonce, &TRADER).0.to_vec());
}

#[tokio::test]
async fn test_early_reveal_rejected_locally() {
    let ledger = funded_ledger(hooked_chain()).await.with_min_commit_age(5);
    let coordinator = coordinator(&ledger, 5);

    coordinator.commit(TokenAmount::from_whole(10)).await.unwrap();
    ledger.advance_blocks(3).await;

    let err = coordinator.reveal().await.unwrap_err();
    assert_eq!(err.error_code(), "REVEAL_TOO_EARLY");
    assert!(ledger.submitted_for("reveal").await.is_empty());
    assert_eq!(coordinator.phase().await, SwapPhase::Committed);

    ledger.advance_blocks(1).await;
    coordinator.reveal().await.unwrap();
    assert_eq!(coordinator.phase().await, SwapPhase::Revealed);
}

#[tokio::test]
async fn test_recommit_overwrite_adopts_new_secret() {
    let ledger = funded_ledger(hooked_chain()).await;
    let coordinator = coordinator(&ledger, 1);

    coordinator.commit(TokenAmount::from_whole(10)).await.unwrap();
    coordinator.commit(TokenAmount::from_whole(20)).await.unwrap();

    assert_eq!(coordinator.status().await.amount, Some(TokenAmount::from_whole(20)));
    coordinator.reveal().await.unwrap();
    coordinator.execute_swap().await.unwrap();
    assert_eq!(ledger.balance_of(TRADER).await.unwrap(), TokenAmount::from_whole(980));
}

#[tokio::test]
async fn test_recommit_rejected_keeps_earlier_commitment() {
    let ledger = funded_ledger(hooked_chain())
        .await
        .with_commit_policy(CommitPolicy::Reject);
    let coordinator = coordinator(&ledger, 1);

    coordinator.commit(TokenAmount::from_whole(10)).await.unwrap();
    let err = coordinator.commit(TokenAmount::from_whole(20)).await.unwrap_err();

    assert_eq!(err.error_code(), "TRANSACTION_REVERTED");
    let status = coordinator.status().await;
    assert_eq!(status.phase, SwapPhase::Committed);
    assert_eq!(status.amount, Some(TokenAmount::from_whole(10)));
    assert!(status.last_error.is_some());

    coordinator.reveal().await.unwrap();
    coordinator.execute_swap().await.unwrap();
    assert_eq!(ledger.balance_of(TRADER).await.unwrap(), TokenAmount::from_whole(990));
}

#[tokio::test]
async fn test_foreign_commitment_is_hash_mismatch() {
    let ledger = funded_ledger(hooked_chain()).await;
    let coordinator = coordinator(&ledger, 1);
    coordinator.commit(TokenAmount::from_whole(10)).await.unwrap();

    // Another process commits for the same trader and pool.
    ledger.commit(Bytes32([9; 32]), coordinator.pool_id()).await.unwrap();

    let err = coordinator.reveal().await.unwrap_err();
    assert_eq!(err.error_code(), "HASH_MISMATCH");
    assert!(!err.is_retriable());
    assert!(ledger.submitted_for("reveal").await.is_empty());
    assert_eq!(coordinator.phase().await, SwapPhase::Error);

    let err = coordinator.reveal().await.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_STATE");
}

#[tokio::test]
async fn test_ledger_rejected_reveal_moves_to_error() {
    let ledger = funded_ledger(hooked_chain()).await.with_min_commit_age(3);
    let coordinator = coordinator(&ledger, 1);

    coordinator.commit(TokenAmount::from_whole(10)).await.unwrap();
    let err = coordinator.reveal().await.unwrap_err();

    assert_eq!(err.error_code(), "TRANSACTION_REVERTED");
    assert_eq!(coordinator.phase().await, SwapPhase::Error);
}

#[tokio::test]
async fn test_swap_requires_reveal() {
    let ledger = funded_ledger(hooked_chain()).await;
    let coordinator = coordinator(&ledger, 1);
    coordinator.commit(TokenAmount::from_whole(10)).await.unwrap();

    let err = coordinator.execute_swap().await.unwrap_err();
    assert_eq!(err.error_code(), "INVALID_STATE");
    assert!(ledger.submitted_for("swap").await.is_empty());
}

#[tokio::test]
async fn test_existing_allowance_skips_approve() {
    let ledger = funded_ledger(hooked_chain()).await;
    let pool_manager = ledger.chain().contracts.pool_manager.unwrap();
    ledger.approve(pool_manager, TokenAmount::from_whole(500)).await.unwrap();
    let coordinator = coordinator(&ledger, 1);

    coordinator.run(TokenAmount::from_whole(25)).await.unwrap();

    assert_eq!(ledger.submitted_for("approve").await.len(), 1);
}

#[test]
fn test_rejects_chain_without_hook() {
    let chain = ChainRegistry::testnets()
        .get(&ChainKey::new("base-sepolia"))
        .cloned()
        .unwrap();
    let key = pool_key(&chain);
    let ledger = InMemoryLedger::new(chain, TRADER);

    let err = CommitRevealCoordinator::new(Arc::new(ledger), key, SwapConfig::default())
        .err()
        .unwrap();
    assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
}
