//! Consolidation flow: sweep SOL and/or token balances from many wallets to
//! one target. Transfers go out individually over RPC, not bundled; there is
//! nothing to win atomically and the per-wallet fee payer differs anyway.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use solana_sdk::{
    compute_budget::ComputeBudgetInstruction, instruction::Instruction, pubkey::Pubkey,
    signature::Keypair, signer::Signer, system_instruction,
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use tokio::time::sleep;

use super::{failed_outcome, FlowRunner};
use crate::gateway::token_account_amount;
use crate::types::{
    ConsolidateRequest, FlowReport, StepLog, WalletOutcome, WalletStatus,
};
use crate::wallet::{parse_address, parse_private_key};
use crate::wallet_store::WalletStore;

const INTER_SEND_PAUSE: Duration = Duration::from_secs(1);

struct SweepJob {
    wallet_index: usize,
    description: &'static str,
    instructions: Vec<Instruction>,
}

impl FlowRunner {
    pub async fn consolidate(&self, request: &ConsolidateRequest) -> Result<FlowReport> {
        let mut log = StepLog::new();
        let mint = parse_address(&request.mint)?;
        let target = parse_address(&request.target_address)?;

        let keypairs = match (&request.wallet_batch, request.wallets.is_empty()) {
            (Some(batch), true) => {
                let loaded = self.store.load_batch(batch)?;
                log.say(format!(
                    "Loaded {} wallet(s) from batch {batch:?}",
                    loaded.len()
                ));
                loaded
            }
            (None, true) => bail!("no wallets to consolidate"),
            _ => {
                let mut keypairs = Vec::with_capacity(request.wallets.len());
                for (i, key) in request.wallets.iter().enumerate() {
                    keypairs.push(parse_private_key(key, &format!("wallet {}", i + 1))?);
                }
                keypairs
            }
        };
        log.say(format!(
            "Consolidating {} wallet(s) into {target} (sol: {}, tokens: {})",
            keypairs.len(),
            request.consolidate_sol,
            request.consolidate_tokens
        ));

        let target_ata = get_associated_token_address(&target, &mint);
        let mut jobs = Vec::new();
        let mut outcomes = Vec::new();

        for (index, keypair) in keypairs.iter().enumerate() {
            let owner = keypair.pubkey();

            let lamports = self
                .gateway
                .lamport_balance(&owner)
                .await
                .with_context(|| format!("balance of wallet {}", index + 1))?;

            let token_balance = if request.consolidate_tokens {
                let ata = get_associated_token_address(&owner, &mint);
                match self.gateway.account_data(&ata).await {
                    Ok(data) => data.as_deref().and_then(token_account_amount).unwrap_or(0),
                    Err(e) => {
                        log.say(format!(
                            "Wallet {}: token account unreadable ({e}); treating as empty",
                            index + 1
                        ));
                        0
                    }
                }
            } else {
                0
            };
            log.say(format!(
                "Wallet {}: {} lamports, {token_balance} tokens",
                index + 1,
                lamports
            ));

            if lamports <= self.config.dust_threshold_lamports && token_balance == 0 {
                outcomes.push(WalletOutcome {
                    index,
                    pubkey: owner.to_string(),
                    status: WalletStatus::Skipped,
                    detail: Some("no assets above dust threshold".to_string()),
                    bundle_id: None,
                    signature: None,
                });
                continue;
            }

            if token_balance > 0 {
                let source_ata = get_associated_token_address(&owner, &mint);
                let transfer = spl_token::instruction::transfer(
                    &spl_token::id(),
                    &source_ata,
                    &target_ata,
                    &owner,
                    &[],
                    token_balance,
                )
                .context("token transfer instruction")?;
                jobs.push(SweepJob {
                    wallet_index: index,
                    description: "token sweep",
                    instructions: vec![
                        ComputeBudgetInstruction::set_compute_unit_price(
                            self.config.compute_unit_price,
                        ),
                        // Idempotent: a no-op when the target account exists.
                        create_associated_token_account_idempotent(
                            &owner,
                            &target,
                            &mint,
                            &spl_token::id(),
                        ),
                        transfer,
                    ],
                });
            }

            if request.consolidate_sol && lamports > self.config.rent_reserve_lamports {
                let amount = lamports - self.config.rent_reserve_lamports;
                jobs.push(SweepJob {
                    wallet_index: index,
                    description: "sol sweep",
                    instructions: vec![
                        ComputeBudgetInstruction::set_compute_unit_price(
                            self.config.compute_unit_price,
                        ),
                        system_instruction::transfer(&owner, &target, amount),
                    ],
                });
                log.say(format!(
                    "Wallet {}: sweeping {amount} lamports (keeping rent reserve)",
                    index + 1
                ));
            }
        }

        if jobs.is_empty() {
            log.say("Nothing to consolidate");
            return Ok(FlowReport {
                success: false,
                mint: Some(mint.to_string()),
                bundle_ids: vec![],
                outcomes,
                log: log.into_entries(),
            });
        }
        log.say(format!("Built {} sweep transaction(s)", jobs.len()));

        let total = jobs.len();
        for (job_no, job) in jobs.into_iter().enumerate() {
            let keypair: &Keypair = &keypairs[job.wallet_index];
            let owner: Pubkey = keypair.pubkey();
            log.say(format!(
                "Sending {} {}/{} for wallet {}",
                job.description,
                job_no + 1,
                total,
                job.wallet_index + 1
            ));

            let outcome = match self
                .tx_builder
                .build(&job.instructions, keypair, &[], false)
                .await
            {
                Ok(pending) => match self.gateway.send_transaction(&pending.tx).await {
                    Ok(signature) => {
                        log.say(format!("{}: submitted {signature}", job.description));
                        WalletOutcome {
                            index: job.wallet_index,
                            pubkey: owner.to_string(),
                            status: WalletStatus::Submitted,
                            detail: Some(job.description.to_string()),
                            bundle_id: None,
                            signature: Some(signature.to_string()),
                        }
                    }
                    Err(e) => {
                        log.say(format!("{} failed: {e}", job.description));
                        failed_outcome(job.wallet_index, &owner, e.to_string())
                    }
                },
                Err(e) if super::fatal_build_error(&e) => return Err(e.into()),
                Err(e) => {
                    log.say(format!("{} build failed: {e}", job.description));
                    failed_outcome(job.wallet_index, &owner, e.to_string())
                }
            };
            outcomes.push(outcome);

            if job_no + 1 < total {
                sleep(INTER_SEND_PAUSE).await;
            }
        }

        outcomes.sort_by_key(|o| o.index);
        let success = outcomes
            .iter()
            .any(|o| o.status == WalletStatus::Submitted);
        Ok(FlowReport {
            success,
            mint: Some(mint.to_string()),
            bundle_ids: vec![],
            outcomes,
            log: log.into_entries(),
        })
    }
}
