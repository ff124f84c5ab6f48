//! Sell flow: each wallet sells a percentage of its current token balance.

use anyhow::{bail, Context, Result};
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use spl_associated_token_account::get_associated_token_address;

use super::{
    describe_sim_failure, failed_outcome, fatal_build_error, settle_chunk, skipped_outcome,
    FlowRunner, PreparedWallet,
};
use crate::assembler::assemble;
use crate::bundle::{encode_transaction, plan_chunks};
use crate::gateway::token_account_amount;
use crate::regime::{self, TokenRegime};
use crate::tx_builder::SimulationStatus;
use crate::types::{FlowReport, SellRequest, StepLog, TradeIntent};
use crate::wallet::{parse_address, parse_private_key};

struct SellWallet {
    keypair: Keypair,
    percentage: u8,
}

impl FlowRunner {
    pub async fn sell_tokens(&self, request: &SellRequest) -> Result<FlowReport> {
        let mut log = StepLog::new();
        let mint = parse_address(&request.mint)?;
        if request.wallets.is_empty() {
            bail!("no sell wallets provided");
        }

        let mut wallets = Vec::with_capacity(request.wallets.len());
        for (i, spec) in request.wallets.iter().enumerate() {
            if !(1..=100).contains(&spec.percentage) {
                bail!(
                    "invalid percentage {} for wallet {}; must be 1..=100",
                    spec.percentage,
                    i + 1
                );
            }
            let keypair = parse_private_key(&spec.private_key, &format!("wallet {}", i + 1))?;
            wallets.push(SellWallet {
                keypair,
                percentage: spec.percentage,
            });
        }
        log.say(format!(
            "Starting sell for {mint}: {} wallet(s)",
            wallets.len()
        ));

        let snapshot = regime::detect(self.gateway.as_ref(), &mint, &self.config.fees)
            .await
            .context("regime detection")?;
        match snapshot.regime {
            TokenRegime::OnCurve => log.say("Token is on the bonding curve"),
            TokenRegime::Migrated => log.say("Token has migrated to the pooled AMM"),
        }

        let params = self.trade_params(request.slippage_pct);
        let bundle_size = self.bundle_size_for(request.bundle_size);
        let chunks = plan_chunks(wallets.len(), bundle_size, false);
        let mut reserves = snapshot.reserves;

        let mut outcomes = Vec::with_capacity(wallets.len());
        let mut bundle_ids = Vec::new();

        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            let chunk_no = chunk_idx + 1;
            log.say(format!(
                "Processing chunk {chunk_no}: wallets {}..={}",
                chunk.start + 1,
                chunk.end
            ));

            let recent_blockhash = self
                .gateway
                .latest_blockhash()
                .await
                .context("blockhash for chunk")?;

            let mut encoded = Vec::with_capacity(chunk.len() + 1);
            let mut prepared = Vec::new();
            let mut tip_payer = None;

            for index in chunk.clone() {
                let wallet = &wallets[index];
                let user = wallet.keypair.pubkey();
                let ata = get_associated_token_address(&user, &mint);

                let balance = match self.gateway.account_data(&ata).await {
                    Ok(data) => data.as_deref().and_then(token_account_amount).unwrap_or(0),
                    Err(e) => {
                        log.say(format!(
                            "Wallet {}: failed to read token balance: {e}",
                            index + 1
                        ));
                        outcomes.push(failed_outcome(
                            index,
                            &user,
                            format!("failed to read token balance: {e}"),
                        ));
                        continue;
                    }
                };
                if balance == 0 {
                    log.say(format!("Wallet {}: zero token balance; skipping", index + 1));
                    outcomes.push(skipped_outcome(index, &user, "zero token balance".into()));
                    continue;
                }

                let base_amount = (balance as u128 * wallet.percentage as u128 / 100) as u64;
                if base_amount == 0 {
                    log.say(format!(
                        "Wallet {}: {}% of {balance} rounds to zero; skipping",
                        index + 1,
                        wallet.percentage
                    ));
                    outcomes.push(skipped_outcome(
                        index,
                        &user,
                        "computed sell amount is zero".into(),
                    ));
                    continue;
                }
                log.say(format!(
                    "Wallet {}: selling {base_amount} of {balance} ({}%)",
                    index + 1,
                    wallet.percentage
                ));

                let mut working = snapshot.clone();
                working.reserves = reserves;
                let trade = match assemble(
                    &TradeIntent::Sell { base_amount },
                    &working,
                    &mint,
                    &user,
                    &params,
                ) {
                    Ok(trade) => trade,
                    Err(e) => {
                        log.say(format!("Wallet {}: pricing failed: {e}", index + 1));
                        outcomes.push(failed_outcome(index, &user, e.to_string()));
                        continue;
                    }
                };
                if let (Some(r), Some(priced)) = (reserves.as_mut(), trade.priced.as_ref()) {
                    r.apply(priced);
                }

                let pending = match self
                    .tx_builder
                    .build_with_blockhash(
                        &trade.instructions,
                        &wallet.keypair,
                        &[],
                        recent_blockhash,
                        request.simulate_first,
                    )
                    .await
                {
                    Ok(pending) => pending,
                    Err(e) if fatal_build_error(&e) => return Err(e.into()),
                    Err(e) => {
                        log.say(format!("Wallet {}: build failed: {e}", index + 1));
                        outcomes.push(failed_outcome(index, &user, e.to_string()));
                        continue;
                    }
                };
                if let SimulationStatus::Failed(failure) = &pending.status {
                    let detail = describe_sim_failure(failure);
                    log.say(format!("Wallet {}: {detail}", index + 1));
                    outcomes.push(failed_outcome(index, &user, detail));
                    continue;
                }

                encoded.push(encode_transaction(&pending.tx)?);
                prepared.push(PreparedWallet {
                    index,
                    pubkey: user,
                });
                tip_payer.get_or_insert(index);
            }

            if encoded.is_empty() {
                log.say(format!(
                    "Chunk {chunk_no} has no valid transactions; skipping submission"
                ));
                continue;
            }

            let tip_payer = &wallets[tip_payer.expect("prepared chunk has a payer")].keypair;
            encoded.push(self.encoded_tip(tip_payer, recent_blockhash)?);

            let bundle_id = self.submit_chunk(&mut log, chunk_no, &encoded).await;
            if let Some(id) = &bundle_id {
                bundle_ids.push(id.clone());
            }
            settle_chunk(&mut outcomes, prepared, bundle_id.as_deref());
        }

        outcomes.sort_by_key(|o| o.index);
        let report = FlowReport {
            success: false,
            mint: Some(mint.to_string()),
            bundle_ids,
            outcomes,
            log: log.into_entries(),
        };
        let success = report.bundled_count() > 0;
        Ok(FlowReport { success, ..report })
    }
}
