//! Chain read/write gateway.
//!
//! The one seam between the crate and the network: account fetch, balances,
//! latest checkpoint, simulation, and direct transaction submission. Flows
//! depend on the [`ChainGateway`] trait so tests can inject a mock; the
//! production wiring injects [`RpcGateway`] backed by the connection pool.

use std::sync::Arc;

use async_trait::async_trait;
use solana_client::{
    rpc_config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig},
    rpc_response::RpcSimulateTransactionResult,
};
use solana_sdk::{
    commitment_config::{CommitmentConfig, CommitmentLevel},
    hash::Hash,
    instruction::InstructionError,
    pubkey::Pubkey,
    signature::Signature,
    transaction::{TransactionError, VersionedTransaction},
};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::connection::{is_rate_limit_message, ConnectionError, ConnectionPool};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("rate limited by {url}")]
    RateLimited { url: String },
    #[error("no healthy RPC endpoint available")]
    NoEndpointAvailable,
    #[error("rpc error: {0}")]
    Rpc(String),
}

impl From<ConnectionError> for GatewayError {
    fn from(e: ConnectionError) -> Self {
        match e {
            ConnectionError::NoEndpointAvailable => GatewayError::NoEndpointAvailable,
            ConnectionError::RateLimited { url } => GatewayError::RateLimited { url },
            other => GatewayError::Rpc(other.to_string()),
        }
    }
}

/// Structured simulation failure: enough to tell the caller which instruction
/// died and with which program error code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimFailure {
    pub instruction_index: Option<u8>,
    pub custom_code: Option<u32>,
    pub message: String,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationOutcome {
    Passed { units_consumed: Option<u64> },
    Failed(SimFailure),
}

impl SimulationOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, SimulationOutcome::Passed { .. })
    }
}

/// SPL token account amount field (bytes 64..72). `None` when the buffer is
/// not a token account.
pub fn token_account_amount(data: &[u8]) -> Option<u64> {
    data.get(64..72)
        .map(|bytes| u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
}

#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Raw account data, `None` when the account does not exist.
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError>;
    async fn lamport_balance(&self, address: &Pubkey) -> Result<u64, GatewayError>;
    async fn latest_blockhash(&self) -> Result<Hash, GatewayError>;
    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome, GatewayError>;
    async fn send_transaction(&self, tx: &VersionedTransaction)
        -> Result<Signature, GatewayError>;
}

fn map_simulation(value: RpcSimulateTransactionResult) -> SimulationOutcome {
    let logs = value.logs.unwrap_or_default();
    match value.err {
        None => SimulationOutcome::Passed {
            units_consumed: value.units_consumed,
        },
        Some(err) => {
            let (instruction_index, custom_code) = match &err {
                TransactionError::InstructionError(idx, inner) => {
                    let code = match inner {
                        InstructionError::Custom(code) => Some(*code),
                        _ => None,
                    };
                    (Some(*idx), code)
                }
                _ => (None, None),
            };
            SimulationOutcome::Failed(SimFailure {
                instruction_index,
                custom_code,
                message: err.to_string(),
                logs,
            })
        }
    }
}

/// Production gateway: holds the pool, keeps the last live endpoint warm, and
/// rotates away from it on failure.
pub struct RpcGateway {
    pool: Arc<ConnectionPool>,
    active: RwLock<Option<(String, Arc<solana_client::nonblocking::rpc_client::RpcClient>)>>,
}

impl RpcGateway {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool,
            active: RwLock::new(None),
        }
    }

    async fn active_client(
        &self,
    ) -> Result<(String, Arc<solana_client::nonblocking::rpc_client::RpcClient>), GatewayError>
    {
        if let Some(pair) = self.active.read().await.clone() {
            return Ok(pair);
        }
        let pair = self.pool.healthy_client().await?;
        *self.active.write().await = Some(pair.clone());
        Ok(pair)
    }

    /// Classify an RPC error, penalize the endpoint, and drop it from the
    /// warm slot so the next call re-selects.
    async fn fail(&self, url: String, message: String) -> GatewayError {
        let rate_limited = is_rate_limit_message(&message);
        warn!(%url, rate_limited, error = %message, "gateway call failed");
        self.pool.note_failure(&url, rate_limited).await;
        *self.active.write().await = None;
        if rate_limited {
            GatewayError::RateLimited { url }
        } else {
            GatewayError::Rpc(message)
        }
    }
}

#[async_trait]
impl ChainGateway for RpcGateway {
    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError> {
        let (url, client) = self.active_client().await?;
        match client
            .get_account_with_commitment(address, CommitmentConfig::confirmed())
            .await
        {
            Ok(response) => Ok(response.value.map(|account| account.data)),
            Err(e) => Err(self.fail(url, e.to_string()).await),
        }
    }

    async fn lamport_balance(&self, address: &Pubkey) -> Result<u64, GatewayError> {
        let (url, client) = self.active_client().await?;
        match client.get_balance(address).await {
            Ok(balance) => Ok(balance),
            Err(e) => Err(self.fail(url, e.to_string()).await),
        }
    }

    async fn latest_blockhash(&self) -> Result<Hash, GatewayError> {
        // Delegates to the pool's retrying accessor (endpoint switch on rate
        // limit, linear backoff otherwise).
        Ok(self.pool.latest_blockhash().await?)
    }

    async fn simulate(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome, GatewayError> {
        let (url, client) = self.active_client().await?;
        let config = RpcSimulateTransactionConfig {
            sig_verify: false,
            commitment: Some(CommitmentConfig::processed()),
            ..Default::default()
        };
        match client.simulate_transaction_with_config(tx, config).await {
            Ok(response) => {
                let outcome = map_simulation(response.value);
                debug!(passed = outcome.passed(), "simulation complete");
                Ok(outcome)
            }
            Err(e) => Err(self.fail(url, e.to_string()).await),
        }
    }

    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
    ) -> Result<Signature, GatewayError> {
        let (url, client) = self.active_client().await?;
        let config = RpcSendTransactionConfig {
            skip_preflight: true,
            preflight_commitment: Some(CommitmentLevel::Confirmed),
            max_retries: Some(3),
            ..Default::default()
        };
        match client.send_transaction_with_config(tx, config).await {
            Ok(signature) => Ok(signature),
            Err(e) => Err(self.fail(url, e.to_string()).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_amount_decodes_at_spl_offset() {
        let mut data = vec![0u8; 165];
        data[64..72].copy_from_slice(&123_456_789u64.to_le_bytes());
        assert_eq!(token_account_amount(&data), Some(123_456_789));
        assert_eq!(token_account_amount(&[0u8; 10]), None);
    }

    #[test]
    fn simulation_mapping_extracts_instruction_error() {
        let value = RpcSimulateTransactionResult {
            err: Some(TransactionError::InstructionError(
                3,
                InstructionError::Custom(6004),
            )),
            logs: Some(vec!["Program log: ExceededSlippage".to_string()]),
            accounts: None,
            units_consumed: None,
            return_data: None,
            inner_instructions: None,
            replacement_blockhash: None,
            loaded_accounts_data_size: None,
        };
        match map_simulation(value) {
            SimulationOutcome::Failed(failure) => {
                assert_eq!(failure.instruction_index, Some(3));
                assert_eq!(failure.custom_code, Some(6004));
                assert_eq!(failure.logs.len(), 1);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn simulation_mapping_passes_clean_run() {
        let value = RpcSimulateTransactionResult {
            err: None,
            logs: Some(vec![]),
            accounts: None,
            units_consumed: Some(45_000),
            return_data: None,
            inner_instructions: None,
            replacement_blockhash: None,
            loaded_accounts_data_size: None,
        };
        assert_eq!(
            map_simulation(value),
            SimulationOutcome::Passed {
                units_consumed: Some(45_000)
            }
        );
    }
}
