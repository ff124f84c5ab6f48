//! Buy-only bundle flow for an existing token.

use anyhow::{bail, Context, Result};
use solana_sdk::signer::Signer;

use super::{
    describe_sim_failure, failed_outcome, fatal_build_error, settle_chunk, FlowRunner,
    PreparedWallet,
};
use crate::assembler::assemble;
use crate::bundle::{encode_transaction, plan_chunks};
use crate::regime::{self, TokenRegime};
use crate::tx_builder::SimulationStatus;
use crate::types::{BuyRequest, FlowReport, StepLog, TradeIntent};
use crate::wallet::{parse_address, parse_wallet_lines};

impl FlowRunner {
    pub async fn buy_bundle(&self, request: &BuyRequest) -> Result<FlowReport> {
        let mut log = StepLog::new();
        let mint = parse_address(&request.mint)?;
        let buyers = parse_wallet_lines(&request.buyers)?;
        if buyers.is_empty() {
            bail!("no buyers provided");
        }
        log.say(format!(
            "Starting buy bundle for {mint}: {} buyer(s)",
            buyers.len()
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
        let chunks = plan_chunks(buyers.len(), bundle_size, false);

        // Local reserve copy: wallet N+1 prices as if wallet N already
        // executed. No network re-read inside the flow.
        let mut reserves = snapshot.reserves;

        let mut outcomes = Vec::with_capacity(buyers.len());
        let mut bundle_ids = Vec::new();

        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            let chunk_no = chunk_idx + 1;
            log.say(format!(
                "Processing chunk {chunk_no}: buyers {}..={}",
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
                let entry = &buyers[index];
                let user = entry.keypair.pubkey();

                let mut working = snapshot.clone();
                working.reserves = reserves;
                let trade = match assemble(
                    &TradeIntent::Buy {
                        quote_budget: entry.lamports,
                    },
                    &working,
                    &mint,
                    &user,
                    &params,
                ) {
                    Ok(trade) => trade,
                    Err(e) => {
                        log.say(format!("Buyer {}: pricing failed: {e}", index + 1));
                        outcomes.push(failed_outcome(index, &user, e.to_string()));
                        continue;
                    }
                };

                // The curve moves once the trade is priced, whether or not
                // the wallet's transaction survives build/simulation.
                if let (Some(r), Some(priced)) = (reserves.as_mut(), trade.priced.as_ref()) {
                    r.apply(priced);
                }

                let pending = match self
                    .tx_builder
                    .build_with_blockhash(
                        &trade.instructions,
                        &entry.keypair,
                        &[],
                        recent_blockhash,
                        true,
                    )
                    .await
                {
                    Ok(pending) => pending,
                    Err(e) if fatal_build_error(&e) => return Err(e.into()),
                    Err(e) => {
                        log.say(format!("Buyer {}: build failed: {e}", index + 1));
                        outcomes.push(failed_outcome(index, &user, e.to_string()));
                        continue;
                    }
                };

                if let SimulationStatus::Failed(failure) = &pending.status {
                    let detail = describe_sim_failure(failure);
                    log.say(format!("Buyer {}: {detail}", index + 1));
                    outcomes.push(failed_outcome(index, &user, detail));
                    continue;
                }

                encoded.push(encode_transaction(&pending.tx)?);
                prepared.push(PreparedWallet {
                    index,
                    pubkey: user,
                });
                tip_payer.get_or_insert(index);
                log.say(format!(
                    "Buyer {}: transaction built and simulated",
                    index + 1
                ));
            }

            if encoded.is_empty() {
                log.say(format!(
                    "Chunk {chunk_no} has no valid transactions; skipping submission"
                ));
                continue;
            }

            let tip_payer = &buyers[tip_payer.expect("prepared chunk has a payer")].keypair;
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
