//! Cross-contract flows against the simulated chain

use nitrobridge_crypto::event_topic;
use nitrobridge_ledger::abi::{self, signatures, REQUIRE_COMMIT_HOOK_DATA};
use nitrobridge_ledger::{
    confirm, BurnMessage, ChainConfig, ChainRegistry, ConfirmationPolicy, InMemoryLedger, LedgerClient,
};
use nitrobridge_types::{Address, Bytes32, ChainKey, PoolKey, SwapRequest, TokenAmount};

fn chain(key: &str) -> ChainConfig {
    ChainRegistry::testnets().get(&ChainKey::new(key)).cloned().unwrap()
}

fn fast() -> ConfirmationPolicy {
    ConfirmationPolicy {
        poll_interval: std::time::Duration::from_millis(1),
        timeout: std::time::Duration::from_millis(50),
    }
}

#[tokio::test]
async fn test_burn_then_mint_once() {
    let user = Address([0x11; 20]);
    let source = InMemoryLedger::new(chain("sepolia"), user);
    let dest = InMemoryLedger::new(chain("arc"), user);
    source.mint_tokens(user, TokenAmount::from_whole(50)).await;

    let messenger = source.chain().token_messenger().unwrap();
    let amount = TokenAmount::from_whole(20);
    let tx = source.approve(messenger, amount).await.unwrap();
    confirm(&source, tx, "approve", &fast()).await.unwrap();

    let usdc = source.chain().contracts.usdc;
    let tx = source
        .deposit_for_burn(amount, dest.chain().domain, user.to_bytes32(), usdc)
        .await
        .unwrap();
    let receipt = confirm(&source, tx, "depositForBurn", &fast()).await.unwrap();
    assert_eq!(source.balance_of(user).await.unwrap(), TokenAmount::from_whole(30));

    let transmitter = source.chain().message_transmitter().unwrap();
    let log = receipt
        .find_log(&transmitter, &event_topic(signatures::MESSAGE_SENT_EVENT))
        .expect("MessageSent log");
    let message = abi::decode_bytes(&log.data).unwrap();
    let decoded = BurnMessage::decode(&message).unwrap();
    assert_eq!(decoded.amount, amount);
    assert_eq!(decoded.destination_domain, dest.chain().domain);

    let attestation = vec![0xaa; 65];
    let tx = dest.receive_message(&message, &attestation).await.unwrap();
    confirm(&dest, tx, "receiveMessage", &fast()).await.unwrap();
    assert_eq!(dest.balance_of(user).await.unwrap(), amount);

    // Replay is rejected on-chain and mints nothing.
    let tx = dest.receive_message(&message, &attestation).await.unwrap();
    let err = confirm(&dest, tx, "receiveMessage", &fast()).await.unwrap_err();
    assert_eq!(err.error_code(), "TRANSACTION_REVERTED");
    assert_eq!(dest.balance_of(user).await.unwrap(), amount);
}

#[tokio::test]
async fn test_commit_reveal_swap() {
    let trader = Address([0x22; 20]);
    let mut config = chain("base-sepolia");
    let hook = Address([0x44; 20]);
    config.contracts.commit_hook = Some(hook);
    let ledger = InMemoryLedger::new(config, trader).with_min_commit_age(2);
    let usdc = ledger.chain().contracts.usdc;
    let pool_manager = ledger.chain().pool_manager().unwrap();
    ledger.mint_tokens(trader, TokenAmount::from_whole(10)).await;

    let key = PoolKey::standard(usdc, Address([0x55; 20]), hook);
    let pool_id = abi::pool_id(&key);
    let amount = TokenAmount::from_whole(1);
    let nonce = Bytes32([9; 32]);
    let hash = abi::commitment_hash(amount, &nonce, &trader);

    let tx = ledger.commit(hash, pool_id).await.unwrap();
    confirm(&ledger, tx, "commit", &fast()).await.unwrap();
    let stored = ledger.commitment(trader, pool_id).await.unwrap().unwrap();
    assert_eq!(stored.hash, hash);
    assert!(!stored.revealed);

    // Too young: the reveal would land one block after the commit.
    let tx = ledger.reveal(amount, nonce, &key).await.unwrap();
    assert!(confirm(&ledger, tx, "reveal", &fast()).await.is_err());

    ledger.advance_blocks(2).await;
    let tx = ledger.reveal(amount, nonce, &key).await.unwrap();
    confirm(&ledger, tx, "reveal", &fast()).await.unwrap();

    let tx = ledger.approve(pool_manager, amount).await.unwrap();
    confirm(&ledger, tx, "approve", &fast()).await.unwrap();
    let request = SwapRequest {
        zero_for_one: true,
        amount_in: amount,
    };
    let tx = ledger.swap(&key, request, REQUIRE_COMMIT_HOOK_DATA).await.unwrap();
    confirm(&ledger, tx, "swap", &fast()).await.unwrap();
    assert_eq!(ledger.balance_of(trader).await.unwrap(), TokenAmount::from_whole(9));
}

#[tokio::test]
async fn test_swap_without_reveal_reverts() {
    let trader = Address([0x33; 20]);
    let mut config = chain("base-sepolia");
    config.contracts.commit_hook = Some(Address([0x44; 20]));
    let ledger = InMemoryLedger::new(config, trader);
    let key = PoolKey::standard(ledger.chain().contracts.usdc, Address([0x55; 20]), Address([0x44; 20]));
    let request = SwapRequest {
        zero_for_one: true,
        amount_in: TokenAmount::from_whole(1),
    };
    let tx = ledger.swap(&key, request, REQUIRE_COMMIT_HOOK_DATA).await.unwrap();
    let err = confirm(&ledger, tx, "swap", &fast()).await.unwrap_err();
    assert_eq!(err.error_code(), "TRANSACTION_REVERTED");
}
