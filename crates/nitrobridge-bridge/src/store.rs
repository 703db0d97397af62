//! Transfer journal
//!
//! Every transition is saved before the orchestrator suspends, so a
//! restarted process can resume from the last persisted record.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use nitrobridge_types::{BridgeTransfer, NitroBridgeError, Result, TransferId, TxHash};
use tokio::sync::RwLock;
use tracing::debug;

/// Persistence for transfer records
#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Insert or replace the record with the same id
    async fn save(&self, transfer: &BridgeTransfer) -> Result<()>;

    async fn load(&self, id: &TransferId) -> Result<BridgeTransfer>;

    async fn list(&self) -> Result<Vec<BridgeTransfer>>;

    /// The transfer that owns a given burn, if one was recorded
    async fn find_by_burn(&self, burn_tx: &TxHash) -> Result<Option<BridgeTransfer>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .find(|t| t.burn_tx.as_ref() == Some(burn_tx)))
    }
}

/// Process-local store
#[derive(Default, Clone)]
pub struct InMemoryTransferStore {
    transfers: Arc<RwLock<HashMap<TransferId, BridgeTransfer>>>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransferStore for InMemoryTransferStore {
    async fn save(&self, transfer: &BridgeTransfer) -> Result<()> {
        self.transfers.write().await.insert(transfer.id, transfer.clone());
        Ok(())
    }

    async fn load(&self, id: &TransferId) -> Result<BridgeTransfer> {
        self.transfers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| NitroBridgeError::TransferNotFound {
                transfer_id: id.to_string(),
            })
    }

    async fn list(&self) -> Result<Vec<BridgeTransfer>> {
        let mut all: Vec<_> = self.transfers.read().await.values().cloned().collect();
        all.sort_by_key(|t| t.created_at);
        Ok(all)
    }
}

/// One pretty-printed JSON file per transfer
///
/// Writes go to a temporary file that is renamed over the record, so a
/// crash mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct JsonFileTransferStore {
    dir: PathBuf,
}

impl JsonFileTransferStore {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| NitroBridgeError::storage(format!("create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    fn path_for(&self, id: &TransferId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }
}

#[async_trait]
impl TransferStore for JsonFileTransferStore {
    async fn save(&self, transfer: &BridgeTransfer) -> Result<()> {
        let path = self.path_for(&transfer.id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(transfer)
            .map_err(|e| NitroBridgeError::storage(format!("serialize {}: {}", transfer.id, e)))?;
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| NitroBridgeError::storage(format!("write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| NitroBridgeError::storage(format!("rename {}: {}", path.display(), e)))?;
        debug!(transfer_id = %transfer.id, state = %transfer.state, "Transfer persisted");
        Ok(())
    }

    async fn load(&self, id: &TransferId) -> Result<BridgeTransfer> {
        let path = self.path_for(id);
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NitroBridgeError::TransferNotFound {
                    transfer_id: id.to_string(),
                })
            }
            Err(e) => return Err(NitroBridgeError::storage(format!("read {}: {}", path.display(), e))),
        };
        serde_json::from_slice(&body)
            .map_err(|e| NitroBridgeError::storage(format!("parse {}: {}", path.display(), e)))
    }

    async fn list(&self) -> Result<Vec<BridgeTransfer>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| NitroBridgeError::storage(format!("list {}: {}", self.dir.display(), e)))?;
        let mut all = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| NitroBridgeError::storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let body = tokio::fs::read(&path)
                .await
                .map_err(|e| NitroBridgeError::storage(format!("read {}: {}", path.display(), e)))?;
            let transfer: BridgeTransfer = serde_json::from_slice(&body)
                .map_err(|e| NitroBridgeError::storage(format!("parse {}: {}", path.display(), e)))?;
            all.push(transfer);
        }
        all.sort_by_key(|t| t.created_at);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nitrobridge_types::{Address, BridgeState, ChainKey, TokenAmount};

    fn transfer() -> BridgeTransfer {
        BridgeTransfer::new(
            ChainKey::new("sepolia"),
            ChainKey::new("arc"),
            10,
            TokenAmount::from_whole(100),
            Address([1; 20]),
            Address([2; 20]),
        )
    }

    #[tokio::test]
    async fn test_json_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = transfer();
        {
            let store = JsonFileTransferStore::open(dir.path()).await.unwrap();
            store.save(&t).await.unwrap();
            t.burn_tx = Some(TxHash([7; 32]));
            t.transition(BridgeState::PendingAttestation);
            store.save(&t).await.unwrap();
        }
        let store = JsonFileTransferStore::open(dir.path()).await.unwrap();
        let loaded = store.load(&t.id).await.unwrap();
        assert_eq!(loaded, t);
        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(store.find_by_burn(&TxHash([7; 32])).await.unwrap(), Some(t));
    }

    #[tokio::test]
    async fn test_missing_transfer() {
        let store = InMemoryTransferStore::new();
        let err = store.load(&TransferId::new()).await.unwrap_err();
        assert_eq!(err.error_code(), "TRANSFER_NOT_FOUND");
    }
}
