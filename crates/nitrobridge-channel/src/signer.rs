//! Message signing seam
//!
//! The session key signs NitroRPC requests and meter events; the identity
//! signer answers the authentication challenge. Both sign the canonical JSON
//! of a payload.

use async_trait::async_trait;
use nitrobridge_crypto::SessionKey;
use nitrobridge_types::Address;
use serde_json::Value;

use crate::{ChannelError, ChannelResult};

#[async_trait]
pub trait MessageSigner: Send + Sync {
    fn address(&self) -> Address;

    /// `0x` hex signature over the canonical JSON of `payload`
    async fn sign(&self, payload: &Value) -> ChannelResult<String>;
}

#[async_trait]
impl MessageSigner for SessionKey {
    fn address(&self) -> Address {
        SessionKey::address(self)
    }

    async fn sign(&self, payload: &Value) -> ChannelResult<String> {
        self.sign_json(payload).map_err(|e| ChannelError::Signing(e.to_string()))
    }
}
