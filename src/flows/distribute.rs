//! Distribution flow: fund N target wallets with a fixed SOL amount from a
//! master wallet, balance-checked up front, sent individually over RPC.

use anyhow::{bail, Result};
use solana_sdk::{signer::Signer, system_instruction};

use super::{failed_outcome, FlowRunner};
use crate::types::{DistributeRequest, FlowReport, StepLog, WalletOutcome, WalletStatus};
use crate::wallet::{parse_address, parse_private_key};

// Rough per-transfer fee allowance used for the up-front balance check.
const FEE_ALLOWANCE_LAMPORTS: u64 = 10_000;

impl FlowRunner {
    pub async fn distribute(&self, request: &DistributeRequest) -> Result<FlowReport> {
        let mut log = StepLog::new();
        let master = parse_private_key(&request.master_private_key, "master wallet")?;
        if request.targets.is_empty() {
            bail!("no target wallets provided");
        }
        if !request.sol_amount.is_finite() || request.sol_amount <= 0.0 {
            bail!("sol_amount must be a positive number");
        }
        let lamports_each = (request.sol_amount * 1_000_000_000.0).floor() as u64;

        let mut targets = Vec::with_capacity(request.targets.len());
        for (i, address) in request.targets.iter().enumerate() {
            targets.push(
                parse_address(address)
                    .map_err(|e| anyhow::anyhow!("target {}: {e}", i + 1))?,
            );
        }

        let master_balance = self.gateway.lamport_balance(&master.pubkey()).await?;
        let required =
            (lamports_each + FEE_ALLOWANCE_LAMPORTS) * targets.len() as u64;
        log.say(format!(
            "Master {} holds {master_balance} lamports; distributing {lamports_each} to {} target(s)",
            master.pubkey(),
            targets.len()
        ));
        if master_balance < required {
            bail!(
                "insufficient master balance: need {required} lamports, have {master_balance}"
            );
        }

        let mut outcomes = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            let ix = system_instruction::transfer(&master.pubkey(), target, lamports_each);
            let outcome = match self.tx_builder.build(&[ix], &master, &[], false).await {
                Ok(pending) => match self.gateway.send_transaction(&pending.tx).await {
                    Ok(signature) => {
                        log.say(format!("Target {}: funded, {signature}", index + 1));
                        WalletOutcome {
                            index,
                            pubkey: target.to_string(),
                            status: WalletStatus::Submitted,
                            detail: None,
                            bundle_id: None,
                            signature: Some(signature.to_string()),
                        }
                    }
                    Err(e) => {
                        log.say(format!("Target {}: send failed: {e}", index + 1));
                        failed_outcome(index, target, e.to_string())
                    }
                },
                Err(e) if super::fatal_build_error(&e) => return Err(e.into()),
                Err(e) => {
                    log.say(format!("Target {}: build failed: {e}", index + 1));
                    failed_outcome(index, target, e.to_string())
                }
            };
            outcomes.push(outcome);
        }

        let success = outcomes
            .iter()
            .any(|o| o.status == WalletStatus::Submitted);
        Ok(FlowReport {
            success,
            mint: None,
            bundle_ids: vec![],
            outcomes,
            log: log.into_entries(),
        })
    }
}
