//! End-to-end orchestration flows: create+bundle, buy-only, sell,
//! consolidate, distribute, and balance reporting.
//!
//! Every flow applies the same best-effort-per-wallet policy: a wallet whose
//! pricing, build, or simulation fails gets a terminal `failed`/`skipped`
//! outcome and drops out of its chunk; the flow continues with the rest. A
//! chunk left empty submits nothing. The flow as a whole succeeds iff at
//! least one wallet lands in an accepted bundle (or direct submission for
//! the RPC flows). Only endpoint exhaustion, a failed mandatory create, or a
//! malformed request kill a flow outright.
//!
//! Wallets within a chunk are processed sequentially so bundle order stays
//! deterministic and each buy prices against the curve as if the previous
//! one already executed.

mod balances;
mod buy;
mod consolidate;
mod create;
mod distribute;
mod sell;

use std::sync::Arc;

use anyhow::{Context, Result};
use solana_sdk::{hash::Hash, pubkey::Pubkey, signature::Keypair};

use crate::bundle::{self, BundleRelay};
use crate::config::Config;
use crate::gateway::{ChainGateway, GatewayError, SimFailure};
use crate::tx_builder::{TransactionBuilder, TxBuildError};
use crate::types::{StepLog, TradeParams, WalletOutcome, WalletStatus};
use crate::wallet::parse_address;
use crate::wallet_store::{BatchInfo, DirWalletStore, WalletStore};

/// Owns the collaborators one flow execution needs. Construct once, run any
/// number of flows; nothing here is request-scoped.
pub struct FlowRunner {
    pub(crate) gateway: Arc<dyn ChainGateway>,
    pub(crate) relay: Arc<dyn BundleRelay>,
    pub(crate) tx_builder: TransactionBuilder,
    pub(crate) config: Config,
    pub(crate) tip_accounts: Vec<Pubkey>,
    pub(crate) store: DirWalletStore,
}

impl FlowRunner {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        relay: Arc<dyn BundleRelay>,
        config: Config,
    ) -> Result<Self> {
        let tip_accounts = config
            .tip_accounts
            .iter()
            .map(|s| parse_address(s))
            .collect::<Result<Vec<_>, _>>()
            .context("parsing configured tip accounts")?;
        let tx_builder = TransactionBuilder::new(Arc::clone(&gateway));
        let store = DirWalletStore::new(config.wallet_dir.clone());
        Ok(Self {
            gateway,
            relay,
            tx_builder,
            config,
            tip_accounts,
            store,
        })
    }

    /// List saved wallet batches from the configured store directory.
    pub fn wallet_batches(&self) -> Result<Vec<BatchInfo>> {
        Ok(self.store.list_batches()?)
    }

    pub(crate) fn trade_params(&self, slippage_override: Option<u32>) -> TradeParams {
        TradeParams {
            compute_unit_limit: self.config.compute_unit_limit,
            compute_unit_price_micro_lamports: self.config.compute_unit_price,
            slippage_pct: slippage_override.unwrap_or(self.config.default_slippage_pct),
        }
    }

    pub(crate) fn bundle_size_for(&self, override_size: Option<usize>) -> usize {
        override_size.unwrap_or(self.config.bundle_size).clamp(2, 5)
    }

    /// Build, sign, and encode the tip transfer that closes every bundle.
    pub(crate) fn encoded_tip(&self, payer: &Keypair, recent_blockhash: Hash) -> Result<String> {
        use solana_sdk::signer::Signer;
        let tip_account = bundle::random_tip_account(&self.tip_accounts);
        let ix = bundle::tip_instruction(&payer.pubkey(), &tip_account, self.config.tip_lamports);
        let tx = self
            .tx_builder
            .compile_and_sign(&[ix], payer, &[], recent_blockhash)?;
        Ok(bundle::encode_transaction(&tx)?)
    }

    /// Submit one chunk's bundle; logs either way and returns the bundle id
    /// on acceptance. A rejected chunk is terminal for that chunk only.
    pub(crate) async fn submit_chunk(
        &self,
        log: &mut StepLog,
        chunk_no: usize,
        encoded: &[String],
    ) -> Option<String> {
        log.say(format!(
            "Submitting chunk {chunk_no}: {} transaction(s)",
            encoded.len()
        ));
        match self.relay.submit_bundle(encoded).await {
            Ok(bundle_id) => {
                log.say(format!("Chunk {chunk_no} accepted, bundle id {bundle_id}"));
                Some(bundle_id)
            }
            Err(e) => {
                log.say(format!("Chunk {chunk_no} submission failed: {e}"));
                None
            }
        }
    }
}

pub(crate) fn describe_sim_failure(failure: &SimFailure) -> String {
    match (failure.instruction_index, failure.custom_code) {
        (Some(idx), Some(code)) => {
            format!("simulation failed at instruction {idx} (custom error {code})")
        }
        (Some(idx), None) => format!("simulation failed at instruction {idx}: {}", failure.message),
        _ => format!("simulation failed: {}", failure.message),
    }
}

/// A build error is flow-fatal only when the endpoint pool is exhausted;
/// anything else stays a per-wallet outcome.
pub(crate) fn fatal_build_error(error: &TxBuildError) -> bool {
    matches!(
        error,
        TxBuildError::Gateway(GatewayError::NoEndpointAvailable)
    )
}

pub(crate) fn failed_outcome(index: usize, pubkey: &Pubkey, detail: String) -> WalletOutcome {
    WalletOutcome {
        index,
        pubkey: pubkey.to_string(),
        status: WalletStatus::Failed,
        detail: Some(detail),
        bundle_id: None,
        signature: None,
    }
}

pub(crate) fn skipped_outcome(index: usize, pubkey: &Pubkey, detail: String) -> WalletOutcome {
    WalletOutcome {
        index,
        pubkey: pubkey.to_string(),
        status: WalletStatus::Skipped,
        detail: Some(detail),
        bundle_id: None,
        signature: None,
    }
}

/// A wallet transaction that made it into a chunk and is waiting on the
/// relay's verdict for its final status.
pub(crate) struct PreparedWallet {
    pub index: usize,
    pub pubkey: Pubkey,
}

pub(crate) fn settle_chunk(
    outcomes: &mut Vec<WalletOutcome>,
    prepared: Vec<PreparedWallet>,
    bundle_id: Option<&str>,
) {
    for wallet in prepared {
        let outcome = match bundle_id {
            Some(id) => WalletOutcome {
                index: wallet.index,
                pubkey: wallet.pubkey.to_string(),
                status: WalletStatus::Bundled,
                detail: None,
                bundle_id: Some(id.to_string()),
                signature: None,
            },
            None => failed_outcome(
                wallet.index,
                &wallet.pubkey,
                "bundle submission failed".to_string(),
            ),
        };
        outcomes.push(outcome);
    }
}
