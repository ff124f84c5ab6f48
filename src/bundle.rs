//! Size-bounded atomic bundles: chunk planning, tip transactions, and
//! competitive relay submission with endpoint rotation.
//!
//! Chunk rule: the first chunk keeps one slot for a mandatory leading
//! transaction (when present) and one for the tip; every later chunk keeps a
//! slot for the tip only. Bundles across chunks are independent -- a failed
//! chunk never rolls back earlier ones.

use std::ops::Range;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use solana_sdk::{
    instruction::Instruction, pubkey::Pubkey, system_instruction,
    transaction::VersionedTransaction,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::retry::{Backoff, RetryDirective, RetryPolicy};

/// Competitive relay endpoints the submitter rotates across.
pub const DEFAULT_RELAY_ENDPOINTS: [&str; 4] = [
    "https://amsterdam.mainnet.block-engine.jito.wtf/api/v1/bundles",
    "https://frankfurt.mainnet.block-engine.jito.wtf/api/v1/bundles",
    "https://ny.mainnet.block-engine.jito.wtf/api/v1/bundles",
    "https://tokyo.mainnet.block-engine.jito.wtf/api/v1/bundles",
];

/// Tip collector addresses; one is picked at random per bundle.
pub const DEFAULT_TIP_ACCOUNTS: [&str; 4] = [
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
];

const SUBMIT_ATTEMPTS: u32 = 5;
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle submission failed after {attempts} attempts: {message}")]
    SubmissionFailed { attempts: u32, message: String },
    #[error("transaction serialization failed: {0}")]
    Serialize(String),
}

/// Wallet-index ranges per chunk. The ranges cover `wallet_count` exactly;
/// serialized chunk size is the range length plus leading tx (chunk 1 only)
/// plus one tip.
pub fn plan_chunks(
    wallet_count: usize,
    bundle_size: usize,
    with_leading: bool,
) -> Vec<Range<usize>> {
    let first_cap = if with_leading {
        bundle_size.saturating_sub(2).max(1)
    } else {
        bundle_size.saturating_sub(1).max(1)
    };
    let rest_cap = bundle_size.saturating_sub(1).max(1);

    if wallet_count == 0 {
        // A leading transaction still needs a chunk of its own.
        return if with_leading { vec![0..0] } else { Vec::new() };
    }

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < wallet_count {
        let cap = if start == 0 { first_cap } else { rest_cap };
        let end = (start + cap).min(wallet_count);
        chunks.push(start..end);
        start = end;
    }
    chunks
}

/// Serialize a signed transaction into the relay's base58 wire form.
pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String, BundleError> {
    let bytes = bincode::serialize(tx).map_err(|e| BundleError::Serialize(e.to_string()))?;
    Ok(bs58::encode(bytes).into_string())
}

pub fn random_tip_account(tip_accounts: &[Pubkey]) -> Pubkey {
    tip_accounts[fastrand::usize(..tip_accounts.len())]
}

/// Plain system transfer to a tip collector; always the last transaction of
/// a bundle.
pub fn tip_instruction(payer: &Pubkey, tip_account: &Pubkey, lamports: u64) -> Instruction {
    system_instruction::transfer(payer, tip_account, lamports)
}

/// Relay seam: production posts JSON-RPC `sendBundle`, tests inject a mock.
#[async_trait]
pub trait BundleRelay: Send + Sync {
    /// Submit one ordered bundle; returns the relay's bundle identifier.
    async fn submit_bundle(&self, transactions: &[String]) -> Result<String, BundleError>;
}

pub struct RelayClient {
    http: reqwest::Client,
    relays: Vec<String>,
}

impl RelayClient {
    pub fn new(relays: Vec<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(SUBMIT_TIMEOUT)
            .build()
            .expect("reqwest client");
        Self { http, relays }
    }

    async fn post_once(&self, relay: &str, transactions: &[String]) -> Result<String, String> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [transactions],
        });

        let response = self
            .http
            .post(relay)
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("request error: {e}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("HTTP {status}: {body}"));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| format!("invalid JSON response: {e}"))?;

        // A 200 without a bundle id is still a failure.
        match body.get("result").and_then(|r| r.as_str()) {
            Some(id) => Ok(id.to_string()),
            None => match body.get("error") {
                Some(err) => Err(format!("relay error: {err}")),
                None => Err(format!("response lacked a bundle id: {body}")),
            },
        }
    }
}

#[async_trait]
impl BundleRelay for RelayClient {
    async fn submit_bundle(&self, transactions: &[String]) -> Result<String, BundleError> {
        let policy = RetryPolicy::new(
            SUBMIT_ATTEMPTS,
            Backoff::LinearCapped {
                base: Duration::from_millis(1000),
                cap: Duration::from_millis(5000),
            },
        );

        policy
            .run(
                |attempt| async move {
                    // New random relay each attempt.
                    let relay = &self.relays[fastrand::usize(..self.relays.len())];
                    debug!(%relay, attempt, txs = transactions.len(), "submitting bundle");
                    match self.post_once(relay, transactions).await {
                        Ok(id) => {
                            info!(%relay, bundle_id = %id, "bundle accepted");
                            Ok(id)
                        }
                        Err(message) => {
                            warn!(%relay, attempt, error = %message, "bundle submission attempt failed");
                            Err(message)
                        }
                    }
                },
                |_| RetryDirective::Backoff,
            )
            .await
            .map_err(|message| BundleError::SubmissionFailed {
                attempts: SUBMIT_ATTEMPTS,
                message,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_lengths(chunks: &[Range<usize>]) -> Vec<usize> {
        chunks.iter().map(|r| r.len()).collect()
    }

    #[test]
    fn twelve_wallets_with_leading_tx() {
        // bundle_size 5: first chunk reserves leading + tip, later chunks tip
        // only. Serialized sizes are 5,5,5,2 and wallet counts sum to 12.
        let chunks = plan_chunks(12, 5, true);
        assert_eq!(chunk_lengths(&chunks), vec![3, 4, 4, 1]);
        assert_eq!(chunks.iter().map(|r| r.len()).sum::<usize>(), 12);
        // leading tx occupies a slot only in chunk 1
        let serialized: Vec<usize> = chunks
            .iter()
            .enumerate()
            .map(|(i, r)| r.len() + usize::from(i == 0) + 1)
            .collect();
        assert_eq!(serialized, vec![5, 5, 5, 2]);
        assert!(serialized.iter().all(|&s| s <= 5));
    }

    #[test]
    fn no_leading_tx_uses_full_width() {
        let chunks = plan_chunks(12, 5, false);
        assert_eq!(chunk_lengths(&chunks), vec![4, 4, 4]);
    }

    #[test]
    fn zero_wallets_with_leading_still_bundles_the_leader() {
        let chunks = plan_chunks(0, 5, true);
        assert_eq!(chunks, vec![0..0]);
        assert!(plan_chunks(0, 5, false).is_empty());
    }

    #[test]
    fn degenerate_bundle_size_still_makes_progress() {
        // Caps floor at one wallet per chunk rather than looping forever.
        let chunks = plan_chunks(3, 2, true);
        assert_eq!(chunk_lengths(&chunks), vec![1, 1, 1]);
    }

    #[test]
    fn ranges_are_contiguous_and_ordered() {
        let chunks = plan_chunks(23, 5, true);
        let mut expected_start = 0;
        for chunk in &chunks {
            assert_eq!(chunk.start, expected_start);
            expected_start = chunk.end;
        }
        assert_eq!(expected_start, 23);
    }

    #[test]
    fn tip_instruction_is_a_system_transfer() {
        let payer = Pubkey::new_unique();
        let tip = Pubkey::new_unique();
        let ix = tip_instruction(&payer, &tip, 100_000);
        assert_eq!(ix.program_id, solana_sdk::system_program::id());
        assert_eq!(ix.accounts[0].pubkey, payer);
        assert_eq!(ix.accounts[1].pubkey, tip);
    }

    #[test]
    fn encode_transaction_is_base58() {
        let tx = VersionedTransaction::default();
        let encoded = encode_transaction(&tx).unwrap();
        assert!(bs58::decode(&encoded).into_vec().is_ok());
    }
}
