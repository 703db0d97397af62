//! NitroBridge Ledger - Typed access to one chain's contracts
//!
//! One `LedgerClient` per chain. Reads return decoded values; writes return
//! the transaction hash as soon as the transaction is accepted, so callers
//! can persist it before waiting for inclusion with [`confirm`].
//!
//! Two implementations ship here:
//! - [`EvmLedger`]: JSON-RPC over HTTP with a local signer
//! - [`InMemoryLedger`]: a deterministic simulated chain for tests and demos

pub mod abi;
pub mod cctp;
pub mod chain;
pub mod confirm;
pub mod ens;
pub mod evm;
pub mod memory;
pub mod retry;

pub use cctp::BurnMessage;
pub use chain::{domains, ChainConfig, ChainRegistry, ContractAddresses};
pub use confirm::{confirm, require_success, wait_for_receipt, ConfirmationPolicy};
pub use ens::{CreditPolicy, CreditScore, EnsReputation, InMemoryTextRecords, TextRecords, ENS_REGISTRY};
pub use evm::{EvmLedger, DEFAULT_RPC_TIMEOUT};
pub use memory::{CommitPolicy, InMemoryLedger, LedgerFault, SubmittedTx};
pub use retry::RetryPolicy;

use async_trait::async_trait;
use nitrobridge_types::{
    Address, Bytes32, Commitment, CreditLine, PoolKey, Result, SwapRequest, TokenAmount, TxHash, TxReceipt,
};

/// Typed read/write access to one chain
///
/// Token reads and writes address the chain's stablecoin. All amounts are
/// raw 6-decimal units.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Chain this client talks to
    fn chain(&self) -> &ChainConfig;

    /// Account that signs submitted transactions
    fn signer(&self) -> Address;

    // ── Reads ────────────────────────────────────────────────────────────────

    async fn block_number(&self) -> Result<u64>;

    async fn balance_of(&self, owner: Address) -> Result<TokenAmount>;

    async fn allowance(&self, owner: Address, spender: Address) -> Result<TokenAmount>;

    /// Credit terminal `getCreditInfo`
    async fn credit_line(&self, account: Address) -> Result<CreditLine>;

    /// Credit terminal `getAvailableCredit`
    async fn available_credit(&self, account: Address) -> Result<TokenAmount>;

    /// Credit terminal `authorizedAgents`
    async fn is_authorized_agent(&self, agent: Address) -> Result<bool>;

    /// Commitment stored by the hook for (trader, pool), if any
    async fn commitment(&self, trader: Address, pool_id: Bytes32) -> Result<Option<Commitment>>;

    /// `None` while the transaction is pending
    async fn transaction_receipt(&self, tx: TxHash) -> Result<Option<TxReceipt>>;

    // ── Writes ───────────────────────────────────────────────────────────────

    async fn approve(&self, spender: Address, amount: TokenAmount) -> Result<TxHash>;

    /// Token messenger `depositForBurn`; the receipt carries `MessageSent(bytes)`
    async fn deposit_for_burn(
        &self,
        amount: TokenAmount,
        destination_domain: u32,
        mint_recipient: Bytes32,
        burn_token: Address,
    ) -> Result<TxHash>;

    /// Message transmitter `receiveMessage`
    async fn receive_message(&self, message: &[u8], attestation: &[u8]) -> Result<TxHash>;

    async fn agent_top_up(&self, user: Address, amount: TokenAmount) -> Result<TxHash>;

    async fn request_margin_top_up(&self, amount: TokenAmount) -> Result<TxHash>;

    async fn settle_credit(&self, amount: TokenAmount) -> Result<TxHash>;

    async fn commit(&self, hash: Bytes32, pool_id: Bytes32) -> Result<TxHash>;

    async fn reveal(&self, amount: TokenAmount, nonce: Bytes32, pool_key: &PoolKey) -> Result<TxHash>;

    async fn swap(&self, pool_key: &PoolKey, request: SwapRequest, hook_data: &[u8]) -> Result<TxHash>;
}
