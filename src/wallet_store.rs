//! Saved wallet batches: list what exists, load one by identifier.
//!
//! The store only promises those two capabilities; encryption-at-rest is an
//! external concern and payloads this build cannot parse are listed but fail
//! to load with a descriptive error (they are likely encrypted exports).

use std::path::PathBuf;

use serde::Deserialize;
use solana_sdk::signature::Keypair;
use thiserror::Error;
use tracing::warn;

use crate::wallet::parse_private_key;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("wallet batch {0:?} not found")]
    NotFound(String),
    #[error("wallet batch {id:?} unreadable: {reason}")]
    Unreadable { id: String, reason: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchInfo {
    pub id: String,
    pub wallet_count: Option<usize>,
}

pub trait WalletStore: Send + Sync {
    fn list_batches(&self) -> Result<Vec<BatchInfo>, StoreError>;
    fn load_batch(&self, id: &str) -> Result<Vec<Keypair>, StoreError>;
}

#[derive(Debug, Deserialize)]
struct StoredWallet {
    secret_key: String,
}

/// Directory of `*.json` batch files, each a JSON array of
/// `{"secret_key": "<base58 or JSON array>"}` objects.
pub struct DirWalletStore {
    dir: PathBuf,
}

impl DirWalletStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn parse_batch(&self, id: &str, raw: &str) -> Result<Vec<Keypair>, StoreError> {
        let stored: Vec<StoredWallet> =
            serde_json::from_str(raw).map_err(|e| StoreError::Unreadable {
                id: id.to_string(),
                reason: format!("not a wallet batch (encrypted export?): {e}"),
            })?;
        stored
            .iter()
            .enumerate()
            .map(|(i, w)| {
                parse_private_key(&w.secret_key, &format!("batch {id} wallet {}", i + 1)).map_err(
                    |e| StoreError::Unreadable {
                        id: id.to_string(),
                        reason: e.to_string(),
                    },
                )
            })
            .collect()
    }
}

impl WalletStore for DirWalletStore {
    fn list_batches(&self) -> Result<Vec<BatchInfo>, StoreError> {
        let mut batches = Vec::new();
        if !self.dir.exists() {
            return Ok(batches);
        }
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let id = match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            let wallet_count = std::fs::read_to_string(&path)
                .ok()
                .and_then(|raw| serde_json::from_str::<Vec<StoredWallet>>(&raw).ok())
                .map(|wallets| wallets.len());
            if wallet_count.is_none() {
                warn!(batch = %id, "listing unreadable wallet batch");
            }
            batches.push(BatchInfo { id, wallet_count });
        }
        batches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(batches)
    }

    fn load_batch(&self, id: &str) -> Result<Vec<Keypair>, StoreError> {
        let path = self.dir.join(format!("{id}.json"));
        if !path.exists() {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let raw = std::fs::read_to_string(&path)?;
        self.parse_batch(id, &raw)
    }
}
