//! JSON-RPC ledger
//!
//! Talks to an EVM node over HTTP and signs locally with the configured
//! key. Submission returns as soon as the node accepts the transaction;
//! inclusion is observed separately through `transaction_receipt`. Every
//! HTTP request carries a timeout, so no call waits on a silent node forever.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{ParamType, Token};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionRequest, H256, I256, U256};
use nitrobridge_types::{
    Address, Bytes32, Commitment, CreditLine, LogEntry, NitroBridgeError, PoolKey, Result, SwapRequest,
    TokenAmount, TxHash, TxReceipt,
};
use tracing::{debug, info};

use crate::abi::{self, signatures};
use crate::ens::{TextRecords, ENS_REGISTRY};
use crate::{ChainConfig, LedgerClient};

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Gas limit for the agent top-up call
pub const AGENT_TOP_UP_GAS: u64 = 200_000;

/// Per-request budget used by [`EvmLedger::connect`]
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// Map a provider error string onto the error taxonomy
fn classify(operation: &str, message: String) -> NitroBridgeError {
    let lower = message.to_lowercase();
    if lower.contains("revert") || lower.contains("insufficient funds") || lower.contains("nonce too low") {
        NitroBridgeError::LedgerRejected {
            operation: operation.to_string(),
            reason: message,
        }
    } else {
        NitroBridgeError::transient(operation, message)
    }
}

/// `LedgerClient` over JSON-RPC with a local signer
pub struct EvmLedger {
    chain: ChainConfig,
    client: Arc<SignerClient>,
    signer: Address,
}

impl EvmLedger {
    /// Connect to the chain's RPC endpoint and sign with `private_key`
    pub fn connect(chain: ChainConfig, private_key: &str) -> Result<Self> {
        Self::connect_with_timeout(chain, private_key, DEFAULT_RPC_TIMEOUT)
    }

    /// Like [`connect`](Self::connect), failing any single RPC request after `request_timeout`
    pub fn connect_with_timeout(chain: ChainConfig, private_key: &str, request_timeout: Duration) -> Result<Self> {
        let url = reqwest::Url::parse(&chain.rpc_url)
            .map_err(|e| NitroBridgeError::configuration(format!("invalid rpc url for {}: {}", chain.key, e)))?;
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| NitroBridgeError::configuration(format!("http client for {}: {}", chain.key, e)))?;
        let provider = Provider::new(Http::new_with_client(url, http)).interval(Duration::from_millis(500));
        let wallet = private_key
            .trim()
            .trim_start_matches("0x")
            .parse::<LocalWallet>()
            .map_err(|e| NitroBridgeError::configuration(format!("invalid private key: {}", e)))?
            .with_chain_id(chain.chain_id);
        let signer = abi::from_h160(wallet.address());
        info!(chain = %chain.key, chain_id = chain.chain_id, signer = %signer, "EVM ledger connected");
        Ok(Self {
            chain,
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            signer,
        })
    }

    async fn call(&self, to: Address, data: Vec<u8>, operation: &str) -> Result<Vec<u8>> {
        let tx: TypedTransaction = TransactionRequest::new()
            .to(abi::to_h160(&to))
            .data(Bytes::from(data))
            .into();
        let out = self
            .client
            .call(&tx, None)
            .await
            .map_err(|e| classify(operation, e.to_string()))?;
        Ok(out.to_vec())
    }

    async fn send(&self, to: Address, data: Vec<u8>, gas: Option<u64>, operation: &str) -> Result<TxHash> {
        let mut tx = TransactionRequest::new()
            .to(abi::to_h160(&to))
            .data(Bytes::from(data));
        if let Some(gas) = gas {
            tx = tx.gas(gas);
        }
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| classify(operation, e.to_string()))?;
        let hash = TxHash(pending.tx_hash().0);
        info!(chain = %self.chain.key, operation, tx = %hash, "Transaction submitted");
        Ok(hash)
    }
}

#[async_trait]
impl LedgerClient for EvmLedger {
    fn chain(&self) -> &ChainConfig {
        &self.chain
    }

    fn signer(&self) -> Address {
        self.signer
    }

    async fn block_number(&self) -> Result<u64> {
        let block = self
            .client
            .get_block_number()
            .await
            .map_err(|e| classify("eth_blockNumber", e.to_string()))?;
        Ok(block.as_u64())
    }

    async fn balance_of(&self, owner: Address) -> Result<TokenAmount> {
        let data = abi::calldata(signatures::BALANCE_OF, &[abi::address_token(&owner)]);
        let out = self.call(self.chain.contracts.usdc, data, "balanceOf").await?;
        abi::u256_to_amount(abi::decode_uint("balanceOf", &out)?)
    }

    async fn allowance(&self, owner: Address, spender: Address) -> Result<TokenAmount> {
        let data = abi::calldata(
            signatures::ALLOWANCE,
            &[abi::address_token(&owner), abi::address_token(&spender)],
        );
        let out = self.call(self.chain.contracts.usdc, data, "allowance").await?;
        abi::u256_to_amount(abi::decode_uint("allowance", &out)?)
    }

    async fn credit_line(&self, account: Address) -> Result<CreditLine> {
        let terminal = self.chain.credit_terminal()?;
        let data = abi::calldata(signatures::GET_CREDIT_INFO, &[abi::address_token(&account)]);
        let out = self.call(terminal, data, "getCreditInfo").await?;
        let tokens = abi::decode_output(
            "getCreditInfo",
            &[
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::FixedBytes(32),
            ],
            &out,
        )?;
        let uint = |i: usize| -> Result<U256> {
            match tokens.get(i) {
                Some(Token::Uint(v)) => Ok(*v),
                _ => Err(NitroBridgeError::protocol("getCreditInfo returned an unexpected shape")),
            }
        };
        let ens_hash = match tokens.get(4) {
            Some(Token::FixedBytes(word)) if word.len() == 32 => {
                let mut out = [0u8; 32];
                out.copy_from_slice(word);
                Bytes32(out)
            }
            _ => return Err(NitroBridgeError::protocol("getCreditInfo returned an unexpected shape")),
        };
        Ok(CreditLine {
            deposited: abi::u256_to_amount(uint(0)?)?,
            borrowed: abi::u256_to_amount(uint(1)?)?,
            credit_limit: abi::u256_to_amount(uint(2)?)?,
            last_update: uint(3)?.low_u64(),
            ens_hash,
        })
    }

    async fn available_credit(&self, account: Address) -> Result<TokenAmount> {
        let terminal = self.chain.credit_terminal()?;
        let data = abi::calldata(signatures::GET_AVAILABLE_CREDIT, &[abi::address_token(&account)]);
        let out = self.call(terminal, data, "getAvailableCredit").await?;
        abi::u256_to_amount(abi::decode_uint("getAvailableCredit", &out)?)
    }

    async fn is_authorized_agent(&self, agent: Address) -> Result<bool> {
        let terminal = self.chain.credit_terminal()?;
        let data = abi::calldata(signatures::AUTHORIZED_AGENTS, &[abi::address_token(&agent)]);
        let out = self.call(terminal, data, "authorizedAgents").await?;
        abi::decode_bool("authorizedAgents", &out)
    }

    async fn commitment(&self, trader: Address, pool_id: Bytes32) -> Result<Option<Commitment>> {
        let hook = self.chain.commit_hook()?;
        let data = abi::calldata(
            signatures::GET_COMMITMENT,
            &[abi::address_token(&trader), abi::word_token(&pool_id)],
        );
        let out = self.call(hook, data, "getCommitment").await?;
        let tokens = abi::decode_output(
            "getCommitment",
            &[ParamType::FixedBytes(32), ParamType::Uint(256), ParamType::Bool],
            &out,
        )?;
        match tokens.as_slice() {
            [Token::FixedBytes(hash), Token::Uint(block), Token::Bool(revealed)] => {
                let mut word = [0u8; 32];
                word.copy_from_slice(hash);
                if word == [0u8; 32] {
                    return Ok(None);
                }
                Ok(Some(Commitment {
                    trader,
                    pool_id,
                    hash: Bytes32(word),
                    block_number: block.low_u64(),
                    revealed: *revealed,
                    commit_tx: None,
                }))
            }
            _ => Err(NitroBridgeError::protocol("getCommitment returned an unexpected shape")),
        }
    }

    async fn transaction_receipt(&self, tx: TxHash) -> Result<Option<TxReceipt>> {
        let receipt = self
            .client
            .get_transaction_receipt(H256::from(tx.0))
            .await
            .map_err(|e| classify("eth_getTransactionReceipt", e.to_string()))?;
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let Some(block) = receipt.block_number else {
            return Ok(None);
        };
        debug!(chain = %self.chain.key, tx = %tx, block = block.as_u64(), "Receipt observed");
        Ok(Some(TxReceipt {
            tx_hash: tx,
            block_number: block.as_u64(),
            success: receipt.status.map(|s| s.as_u64() == 1).unwrap_or(false),
            gas_used: receipt.gas_used.map(|g| g.low_u64()),
            logs: receipt
                .logs
                .into_iter()
                .map(|log| LogEntry {
                    address: abi::from_h160(log.address),
                    topics: log.topics.into_iter().map(|t| Bytes32(t.0)).collect(),
                    data: log.data.to_vec(),
                })
                .collect(),
        }))
    }

    async fn approve(&self, spender: Address, amount: TokenAmount) -> Result<TxHash> {
        let data = abi::calldata(
            signatures::APPROVE,
            &[abi::address_token(&spender), abi::amount_token(amount)],
        );
        self.send(self.chain.contracts.usdc, data, None, "approve").await
    }

    async fn deposit_for_burn(
        &self,
        amount: TokenAmount,
        destination_domain: u32,
        mint_recipient: Bytes32,
        burn_token: Address,
    ) -> Result<TxHash> {
        let messenger = self.chain.token_messenger()?;
        let data = abi::calldata(
            signatures::DEPOSIT_FOR_BURN,
            &[
                abi::amount_token(amount),
                Token::Uint(U256::from(destination_domain)),
                abi::word_token(&mint_recipient),
                abi::address_token(&burn_token),
            ],
        );
        self.send(messenger, data, None, "depositForBurn").await
    }

    async fn receive_message(&self, message: &[u8], attestation: &[u8]) -> Result<TxHash> {
        let transmitter = self.chain.message_transmitter()?;
        let data = abi::calldata(
            signatures::RECEIVE_MESSAGE,
            &[Token::Bytes(message.to_vec()), Token::Bytes(attestation.to_vec())],
        );
        self.send(transmitter, data, None, "receiveMessage").await
    }

    async fn agent_top_up(&self, user: Address, amount: TokenAmount) -> Result<TxHash> {
        let terminal = self.chain.credit_terminal()?;
        let data = abi::calldata(
            signatures::AGENT_TOP_UP,
            &[abi::address_token(&user), abi::amount_token(amount)],
        );
        self.send(terminal, data, Some(AGENT_TOP_UP_GAS), "agentTopUp").await
    }

    async fn request_margin_top_up(&self, amount: TokenAmount) -> Result<TxHash> {
        let terminal = self.chain.credit_terminal()?;
        let data = abi::calldata(signatures::REQUEST_MARGIN_TOP_UP, &[abi::amount_token(amount)]);
        self.send(terminal, data, None, "requestMarginTopUp").await
    }

    async fn settle_credit(&self, amount: TokenAmount) -> Result<TxHash> {
        let terminal = self.chain.credit_terminal()?;
        let data = abi::calldata(signatures::SETTLE_CREDIT, &[abi::amount_token(amount)]);
        self.send(terminal, data, None, "settleCredit").await
    }

    async fn commit(&self, hash: Bytes32, pool_id: Bytes32) -> Result<TxHash> {
        let hook = self.chain.commit_hook()?;
        let data = abi::calldata(signatures::COMMIT, &[abi::word_token(&hash), abi::word_token(&pool_id)]);
        self.send(hook, data, None, "commit").await
    }

    async fn reveal(&self, amount: TokenAmount, nonce: Bytes32, pool_key: &PoolKey) -> Result<TxHash> {
        let hook = self.chain.commit_hook()?;
        let data = abi::calldata(
            signatures::REVEAL,
            &[
                abi::amount_token(amount),
                Token::Uint(U256::from_big_endian(&nonce.0)),
                abi::pool_key_token(pool_key),
            ],
        );
        self.send(hook, data, None, "reveal").await
    }

    async fn swap(&self, pool_key: &PoolKey, request: SwapRequest, hook_data: &[u8]) -> Result<TxHash> {
        let router = self.chain.swap_router()?;
        let raw = i128::try_from(request.amount_in.raw()).map_err(|_| NitroBridgeError::AmountOverflow)?;
        // Exact input is expressed as a negative amountSpecified.
        let amount_specified = -I256::from(raw);
        let data = abi::calldata(
            signatures::SWAP,
            &[
                abi::pool_key_token(pool_key),
                Token::Tuple(vec![
                    Token::Bool(request.zero_for_one),
                    Token::Int(amount_specified.into_raw()),
                    Token::Uint(abi::sqrt_price_limit(request.zero_for_one)),
                ]),
                Token::Tuple(vec![Token::Bool(false), Token::Bool(false)]),
                Token::Bytes(hook_data.to_vec()),
            ],
        );
        self.send(router, data, None, "swap").await
    }
}

// ENS lives on the chain this ledger is connected to.
#[async_trait]
impl TextRecords for EvmLedger {
    async fn resolver(&self, node: Bytes32) -> Result<Option<Address>> {
        let data = abi::calldata(signatures::ENS_RESOLVER, &[abi::word_token(&node)]);
        let out = self.call(ENS_REGISTRY, data, "resolver").await?;
        let resolver = abi::decode_address("resolver", &out)?;
        Ok((!resolver.is_zero()).then_some(resolver))
    }

    async fn text(&self, resolver: Address, node: Bytes32, key: &str) -> Result<String> {
        let data = abi::calldata(
            signatures::ENS_TEXT,
            &[abi::word_token(&node), Token::String(key.to_string())],
        );
        let out = self.call(resolver, data, "text").await?;
        abi::decode_string("text", &out)
    }

    async fn set_text(&self, resolver: Address, node: Bytes32, key: &str, value: &str) -> Result<TxHash> {
        let data = abi::calldata(
            signatures::ENS_SET_TEXT,
            &[
                abi::word_token(&node),
                Token::String(key.to_string()),
                Token::String(value.to_string()),
            ],
        );
        self.send(resolver, data, None, "setText").await
    }
}
