//! Token creation with a coordinated buyer bundle.
//!
//! The creation transaction is mandatory: it leads chunk 1 and a failed
//! simulation aborts the whole flow before anything is submitted (no buy can
//! land before the mint exists). Buyer transactions skip simulation -- they
//! reference a mint that only comes into existence inside the bundle.

use std::time::Duration;

use anyhow::{Context, Result};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use tokio::time::sleep;

use super::{failed_outcome, fatal_build_error, settle_chunk, FlowRunner, PreparedWallet};
use crate::assembler::assemble;
use crate::bundle::{encode_transaction, plan_chunks};
use crate::regime::RegimeSnapshot;
use crate::tx_builder::SimulationStatus;
use crate::types::{CreateRequest, FlowReport, StepLog, TradeIntent, WalletOutcome, WalletStatus};
use crate::wallet::{parse_private_key, parse_wallet_lines};

const INTER_CHUNK_PAUSE: Duration = Duration::from_secs(2);

impl FlowRunner {
    pub async fn create_and_bundle(&self, request: &CreateRequest) -> Result<FlowReport> {
        let mut log = StepLog::new();
        let dev = parse_private_key(&request.dev_private_key, "dev wallet")?;
        let buyers = parse_wallet_lines(&request.buyers)?;
        let mint = Keypair::new();
        log.say(format!("Dev wallet: {}", dev.pubkey()));
        log.say(format!("Mint address: {}", mint.pubkey()));
        log.say(format!("Found {} buyer(s)", buyers.len()));

        let params = self.trade_params(request.slippage_pct);
        let bundle_size = self.bundle_size_for(request.bundle_size);

        // A brand-new curve prices against the program's initial virtual
        // reserves; the dev buy and every buyer walk this local copy forward.
        let snapshot = RegimeSnapshot::fresh_curve(self.config.fees.reserve_state(
            self.config.initial_virtual_base_reserves,
            self.config.initial_virtual_quote_reserves,
            Some(dev.pubkey()),
        ));
        let mut reserves = snapshot.reserves;

        let dev_buy_lamports = (request.dev_buy_sol * 1_000_000_000.0).floor() as u64;
        let create_trade = assemble(
            &TradeIntent::Create {
                name: request.token_name.clone(),
                symbol: request.token_symbol.clone(),
                uri: request.token_uri.clone(),
                dev_buy_lamports,
            },
            &snapshot,
            &mint.pubkey(),
            &dev.pubkey(),
            &params,
        )?;
        if let (Some(r), Some(priced)) = (reserves.as_mut(), create_trade.priced.as_ref()) {
            r.apply(priced);
        }

        log.say("Building create transaction");
        let recent_blockhash = self
            .gateway
            .latest_blockhash()
            .await
            .context("blockhash for create")?;
        let create_pending = self
            .tx_builder
            .build_with_blockhash(
                &create_trade.instructions,
                &dev,
                &[&mint],
                recent_blockhash,
                true,
            )
            .await?;

        if let SimulationStatus::Failed(failure) = &create_pending.status {
            // Mandatory transaction: abort before any chunk submission.
            let detail = super::describe_sim_failure(failure);
            log.say(format!("Create transaction {detail}; aborting flow"));
            return Ok(FlowReport {
                success: false,
                mint: Some(mint.pubkey().to_string()),
                bundle_ids: vec![],
                outcomes: vec![failed_outcome(0, &dev.pubkey(), detail)],
                log: log.into_entries(),
            });
        }
        log.say("Create transaction built, simulated, and signed");
        let create_encoded = encode_transaction(&create_pending.tx)?;

        let chunks = plan_chunks(buyers.len(), bundle_size, true);
        let mut outcomes = Vec::with_capacity(buyers.len() + 1);
        let mut bundle_ids = Vec::new();

        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            let chunk_no = chunk_idx + 1;
            let is_first = chunk_idx == 0;
            log.say(format!(
                "Processing chunk {chunk_no}: buyers {}..={}",
                chunk.start + 1,
                chunk.end
            ));

            let recent_blockhash = if is_first {
                recent_blockhash
            } else {
                self.gateway
                    .latest_blockhash()
                    .await
                    .context("blockhash for chunk")?
            };

            let mut encoded = Vec::with_capacity(chunk.len() + 2);
            let mut prepared = Vec::new();
            if is_first {
                encoded.push(create_encoded.clone());
            }

            for index in chunk.clone() {
                let entry = &buyers[index];
                let user = entry.keypair.pubkey();

                let mut working = snapshot.clone();
                working.reserves = reserves;
                let trade = match assemble(
                    &TradeIntent::Buy {
                        quote_budget: entry.lamports,
                    },
                    &working,
                    &mint.pubkey(),
                    &user,
                    &params,
                ) {
                    Ok(trade) => trade,
                    Err(e) => {
                        log.say(format!("Buyer {}: pricing failed: {e}", index + 1));
                        outcomes.push(failed_outcome(index + 1, &user, e.to_string()));
                        continue;
                    }
                };
                if let (Some(r), Some(priced)) = (reserves.as_mut(), trade.priced.as_ref()) {
                    r.apply(priced);
                }

                // Simulation skipped: the mint is created by the leading
                // transaction in this same bundle.
                let pending = match self
                    .tx_builder
                    .build_with_blockhash(
                        &trade.instructions,
                        &entry.keypair,
                        &[],
                        recent_blockhash,
                        false,
                    )
                    .await
                {
                    Ok(pending) => pending,
                    Err(e) if fatal_build_error(&e) => return Err(e.into()),
                    Err(e) => {
                        log.say(format!("Buyer {}: build failed: {e}", index + 1));
                        outcomes.push(failed_outcome(index + 1, &user, e.to_string()));
                        continue;
                    }
                };

                encoded.push(encode_transaction(&pending.tx)?);
                prepared.push(PreparedWallet {
                    index: index + 1,
                    pubkey: user,
                });
                log.say(format!(
                    "Buyer {}: transaction built and signed (simulation skipped)",
                    index + 1
                ));
            }

            if !is_first && prepared.is_empty() {
                log.say(format!(
                    "Chunk {chunk_no} has no valid transactions; skipping submission"
                ));
                continue;
            }

            encoded.push(self.encoded_tip(&dev, recent_blockhash)?);
            let bundle_id = self.submit_chunk(&mut log, chunk_no, &encoded).await;
            if let Some(id) = &bundle_id {
                bundle_ids.push(id.clone());
                if is_first {
                    outcomes.push(WalletOutcome {
                        index: 0,
                        pubkey: dev.pubkey().to_string(),
                        status: WalletStatus::Bundled,
                        detail: Some("create transaction".to_string()),
                        bundle_id: Some(id.clone()),
                        signature: None,
                    });
                }
            } else if is_first {
                outcomes.push(failed_outcome(
                    0,
                    &dev.pubkey(),
                    "create bundle submission failed".to_string(),
                ));
            }
            settle_chunk(&mut outcomes, prepared, bundle_id.as_deref());

            if chunk_idx + 1 < chunks.len() {
                sleep(INTER_CHUNK_PAUSE).await;
            }
        }

        outcomes.sort_by_key(|o| o.index);
        let report = FlowReport {
            success: false,
            mint: Some(mint.pubkey().to_string()),
            bundle_ids,
            outcomes,
            log: log.into_entries(),
        };
        let success = report.bundled_count() > 0;
        Ok(FlowReport { success, ..report })
    }
}
