//! Minimal ABI surface
//!
//! Calldata is built from function signatures and `ethers::abi` tokens.
//! Return data that does not decode to the expected shape is a protocol
//! violation: the contract at that address is not the one we think it is.

use ethers::abi::{self, ParamType, Token};
use ethers::types::{H160, I256, U256};
use nitrobridge_crypto::{function_selector, keccak256_all, keccak_word};
use nitrobridge_types::{Address, Bytes32, NitroBridgeError, PoolKey, Result, TokenAmount};

/// Function and event signatures of every contract call we make
pub mod signatures {
    pub const BALANCE_OF: &str = "balanceOf(address)";
    pub const ALLOWANCE: &str = "allowance(address,address)";
    pub const APPROVE: &str = "approve(address,uint256)";

    pub const DEPOSIT_FOR_BURN: &str = "depositForBurn(uint256,uint32,bytes32,address)";
    pub const RECEIVE_MESSAGE: &str = "receiveMessage(bytes,bytes)";
    pub const MESSAGE_SENT_EVENT: &str = "MessageSent(bytes)";

    pub const GET_CREDIT_INFO: &str = "getCreditInfo(address)";
    pub const GET_AVAILABLE_CREDIT: &str = "getAvailableCredit(address)";
    pub const AGENT_TOP_UP: &str = "agentTopUp(address,uint256)";
    pub const AUTHORIZED_AGENTS: &str = "authorizedAgents(address)";
    pub const REQUEST_MARGIN_TOP_UP: &str = "requestMarginTopUp(uint256)";
    pub const SETTLE_CREDIT: &str = "settleCredit(uint256)";

    pub const COMMIT: &str = "commit(bytes32,bytes32)";
    pub const REVEAL: &str = "reveal(uint256,uint256,(address,address,uint24,int24,address))";
    pub const GET_COMMITMENT: &str = "getCommitment(address,bytes32)";
    pub const SWAP: &str =
        "swap((address,address,uint24,int24,address),(bool,int256,uint160),(bool,bool),bytes)";

    pub const ENS_RESOLVER: &str = "resolver(bytes32)";
    pub const ENS_TEXT: &str = "text(bytes32,string)";
    pub const ENS_SET_TEXT: &str = "setText(bytes32,string,string)";
}

/// Hook data that asks the pool hook to enforce a revealed commitment
pub const REQUIRE_COMMIT_HOOK_DATA: &[u8] = b"REQUIRE_COMMIT";

/// Swap price bounds one step inside the tick-math limits
pub fn sqrt_price_limit(zero_for_one: bool) -> U256 {
    if zero_for_one {
        U256::from(4_295_128_739u64) + U256::one()
    } else {
        U256::from_dec_str("1461446703485210103287273052203988822378723970342")
            .unwrap_or_default()
            .saturating_sub(U256::one())
    }
}

pub fn to_h160(address: &Address) -> H160 {
    H160::from(address.0)
}

pub fn from_h160(address: H160) -> Address {
    Address(address.0)
}

pub fn amount_token(amount: TokenAmount) -> Token {
    Token::Uint(U256::from(amount.raw()))
}

pub fn address_token(address: &Address) -> Token {
    Token::Address(to_h160(address))
}

pub fn word_token(word: &Bytes32) -> Token {
    Token::FixedBytes(word.0.to_vec())
}

/// Interpret a `uint256` as a token amount
pub fn u256_to_amount(value: U256) -> Result<TokenAmount> {
    if value > U256::from(u128::MAX) {
        return Err(NitroBridgeError::AmountOverflow);
    }
    Ok(TokenAmount::from_raw(value.as_u128()))
}

/// `selector || abi.encode(args)`
pub fn calldata(signature: &str, args: &[Token]) -> Vec<u8> {
    let mut out = function_selector(signature).to_vec();
    out.extend_from_slice(&abi::encode(args));
    out
}

/// Decode return data or fail with a protocol violation naming the call
pub fn decode_output(call: &str, types: &[ParamType], data: &[u8]) -> Result<Vec<Token>> {
    abi::decode(types, data)
        .map_err(|e| NitroBridgeError::protocol(format!("malformed return data from {}: {}", call, e)))
}

pub fn decode_uint(call: &str, data: &[u8]) -> Result<U256> {
    match decode_output(call, &[ParamType::Uint(256)], data)?.pop() {
        Some(Token::Uint(v)) => Ok(v),
        _ => Err(NitroBridgeError::protocol(format!("{} did not return a uint256", call))),
    }
}

pub fn decode_bool(call: &str, data: &[u8]) -> Result<bool> {
    match decode_output(call, &[ParamType::Bool], data)?.pop() {
        Some(Token::Bool(v)) => Ok(v),
        _ => Err(NitroBridgeError::protocol(format!("{} did not return a bool", call))),
    }
}

pub fn decode_address(call: &str, data: &[u8]) -> Result<Address> {
    match decode_output(call, &[ParamType::Address], data)?.pop() {
        Some(Token::Address(v)) => Ok(from_h160(v)),
        _ => Err(NitroBridgeError::protocol(format!("{} did not return an address", call))),
    }
}

pub fn decode_string(call: &str, data: &[u8]) -> Result<String> {
    match decode_output(call, &[ParamType::String], data)?.pop() {
        Some(Token::String(v)) => Ok(v),
        _ => Err(NitroBridgeError::protocol(format!("{} did not return a string", call))),
    }
}

/// ABI-encode a single `bytes` value, as in `MessageSent(bytes)` log data
pub fn encode_bytes(payload: &[u8]) -> Vec<u8> {
    abi::encode(&[Token::Bytes(payload.to_vec())])
}

/// Decode log data that holds a single `bytes` value
pub fn decode_bytes(data: &[u8]) -> Result<Vec<u8>> {
    match decode_output("MessageSent", &[ParamType::Bytes], data)?.pop() {
        Some(Token::Bytes(b)) => Ok(b),
        _ => Err(NitroBridgeError::protocol("log data is not a single bytes value")),
    }
}

pub fn pool_key_token(key: &PoolKey) -> Token {
    Token::Tuple(vec![
        address_token(&key.currency0),
        address_token(&key.currency1),
        Token::Uint(U256::from(key.fee)),
        Token::Int(I256::from(key.tick_spacing).into_raw()),
        address_token(&key.hooks),
    ])
}

/// `keccak256(abi.encode(poolKey))`
pub fn pool_id(key: &PoolKey) -> Bytes32 {
    keccak_word(&abi::encode(&[pool_key_token(key)]))
}

/// `keccak256(abi.encodePacked(uint256 amount, uint256 nonce, address trader))`
pub fn commitment_hash(amount: TokenAmount, nonce: &Bytes32, trader: &Address) -> Bytes32 {
    Bytes32(keccak256_all(&[&amount.to_be_word(), &nonce.0, &trader.0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calldata_layout() {
        let data = calldata(
            signatures::APPROVE,
            &[address_token(&Address([0x11; 20])), amount_token(TokenAmount::from_raw(5))],
        );
        assert_eq!(hex::encode(&data[..4]), "095ea7b3");
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[16..36], &[0x11; 20]);
        assert_eq!(data[67], 5);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let message = vec![0xab; 150];
        let encoded = encode_bytes(&message);
        assert_eq!(encoded.len() % 32, 0);
        assert_eq!(decode_bytes(&encoded).unwrap(), message);
    }

    #[test]
    fn test_decode_garbage_is_protocol_violation() {
        let err = decode_bytes(&[1, 2, 3]).unwrap_err();
        assert_eq!(err.error_code(), "PROTOCOL_VIOLATION");
    }

    #[test]
    fn test_commitment_hash_is_packed() {
        let trader = Address([0x22; 20]);
        let nonce = Bytes32([0x33; 32]);
        let amount = TokenAmount::from_whole(100);
        let mut packed = Vec::new();
        packed.extend_from_slice(&amount.to_be_word());
        packed.extend_from_slice(&nonce.0);
        packed.extend_from_slice(&trader.0);
        assert_eq!(packed.len(), 84);
        assert_eq!(commitment_hash(amount, &nonce, &trader), keccak_word(&packed));
    }

    #[test]
    fn test_pool_id_depends_on_every_field() {
        let key = PoolKey::standard(Address::zero(), Address([1; 20]), Address([2; 20]));
        let mut other = key;
        other.tick_spacing = 10;
        assert_ne!(pool_id(&key), pool_id(&other));
        assert_eq!(pool_id(&key), pool_id(&key));
    }

    #[test]
    fn test_u256_overflow() {
        assert!(u256_to_amount(U256::MAX).is_err());
        assert_eq!(u256_to_amount(U256::from(7u64)).unwrap(), TokenAmount::from_raw(7));
    }

    #[test]
    fn test_text_record_round_trip() {
        let data = abi::encode(&[Token::String("{\"score\":710}".to_string())]);
        assert_eq!(decode_string("text", &data).unwrap(), "{\"score\":710}");
        assert!(decode_string("text", &[0u8; 3]).is_err());

        let registry = abi::encode(&[Token::Address(H160::repeat_byte(0x42))]);
        assert_eq!(decode_address("resolver", &registry).unwrap(), Address([0x42; 20]));
    }
}
