//! Compile, sign, and dry-run one wallet's transaction.
//!
//! Responsibilities:
//! - fetch a recent blockhash through the gateway (which retries and rotates
//!   endpoints underneath)
//! - compile a V0 message with the wallet as fee payer
//! - sign with the wallet plus any co-signers (the generated mint key for
//!   `create`)
//! - dry-run against current network state unless the flow skips simulation
//!   for throughput (create-flow buyer transactions: the mint does not exist
//!   until the bundle lands)
//!
//! A simulation failure never throws for the caller's whole batch; it is
//! recorded on the [`PendingTransaction`] and the flow decides per wallet.

use std::sync::Arc;

use solana_sdk::{
    hash::Hash,
    instruction::Instruction,
    message::{v0::Message as MessageV0, VersionedMessage},
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
    transaction::VersionedTransaction,
};
use thiserror::Error;
use tracing::debug;

use crate::gateway::{ChainGateway, GatewayError, SimFailure, SimulationOutcome};

#[derive(Debug, Error)]
pub enum TxBuildError {
    #[error("failed to compile message: {0}")]
    Compile(String),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationStatus {
    Unverified,
    Passed,
    Failed(SimFailure),
}

/// A built, signed transaction awaiting chunking. Discarded once serialized
/// into a bundle.
#[derive(Debug)]
pub struct PendingTransaction {
    pub tx: VersionedTransaction,
    pub payer: Pubkey,
    pub status: SimulationStatus,
}

impl PendingTransaction {
    pub fn simulation_failed(&self) -> Option<&SimFailure> {
        match &self.status {
            SimulationStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

pub struct TransactionBuilder {
    gateway: Arc<dyn ChainGateway>,
}

impl TransactionBuilder {
    pub fn new(gateway: Arc<dyn ChainGateway>) -> Self {
        Self { gateway }
    }

    /// Compile and sign without touching the network; the caller supplies the
    /// blockhash (flows fetch one per wallet batch, not per transaction).
    pub fn compile_and_sign(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        co_signers: &[&Keypair],
        recent_blockhash: Hash,
    ) -> Result<VersionedTransaction, TxBuildError> {
        let message =
            MessageV0::try_compile(&payer.pubkey(), instructions, &[], recent_blockhash)
                .map_err(|e| TxBuildError::Compile(e.to_string()))?;

        let mut signers: Vec<&dyn Signer> = Vec::with_capacity(1 + co_signers.len());
        signers.push(payer);
        for co_signer in co_signers {
            signers.push(*co_signer);
        }

        VersionedTransaction::try_new(VersionedMessage::V0(message), &signers)
            .map_err(|e| TxBuildError::Signing(e.to_string()))
    }

    /// Full per-wallet path: blockhash, compile, sign, and (optionally)
    /// simulate. Gateway failures during simulation are build errors; a
    /// *failed* simulation is not, it is state on the returned transaction.
    pub async fn build(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        co_signers: &[&Keypair],
        simulate: bool,
    ) -> Result<PendingTransaction, TxBuildError> {
        let recent_blockhash = self.gateway.latest_blockhash().await?;
        self.build_with_blockhash(instructions, payer, co_signers, recent_blockhash, simulate)
            .await
    }

    pub async fn build_with_blockhash(
        &self,
        instructions: &[Instruction],
        payer: &Keypair,
        co_signers: &[&Keypair],
        recent_blockhash: Hash,
        simulate: bool,
    ) -> Result<PendingTransaction, TxBuildError> {
        let tx = self.compile_and_sign(instructions, payer, co_signers, recent_blockhash)?;
        let payer_key = payer.pubkey();

        let status = if simulate {
            match self.gateway.simulate(&tx).await? {
                SimulationOutcome::Passed { units_consumed } => {
                    debug!(payer = %payer_key, ?units_consumed, "simulation passed");
                    SimulationStatus::Passed
                }
                SimulationOutcome::Failed(failure) => {
                    debug!(
                        payer = %payer_key,
                        instruction = ?failure.instruction_index,
                        code = ?failure.custom_code,
                        "simulation failed"
                    );
                    SimulationStatus::Failed(failure)
                }
            }
        } else {
            SimulationStatus::Unverified
        };

        Ok(PendingTransaction {
            tx,
            payer: payer_key,
            status,
        })
    }
}
