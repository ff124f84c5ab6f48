//! Balance report: SOL and optional token balance per wallet. Input items
//! may be addresses or private keys; a key is reduced to its public half and
//! never echoed back.

use anyhow::Result;
use solana_sdk::signer::Signer;
use spl_associated_token_account::get_associated_token_address;

use super::FlowRunner;
use crate::gateway::token_account_amount;
use crate::types::{BalanceReport, BalanceRow, BalancesRequest, StepLog};
use crate::wallet::{parse_address, parse_private_key};

const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

impl FlowRunner {
    pub async fn balances(&self, request: &BalancesRequest) -> Result<BalanceReport> {
        let mut log = StepLog::new();
        let mint = match &request.mint {
            Some(raw) => Some(parse_address(raw)?),
            None => None,
        };
        log.say(format!("Checking {} wallet(s)", request.wallets.len()));

        let mut rows = Vec::with_capacity(request.wallets.len());
        for (index, item) in request.wallets.iter().enumerate() {
            // Private key first, address second: a base58 secret also parses
            // as garbage bytes, never as a 32-byte address.
            let address = match parse_private_key(item, &format!("wallet {}", index + 1)) {
                Ok(keypair) => keypair.pubkey(),
                Err(_) => match parse_address(item) {
                    Ok(address) => address,
                    Err(e) => {
                        log.say(format!("Wallet {}: unparseable input", index + 1));
                        rows.push(BalanceRow {
                            address: item.clone(),
                            sol_balance: None,
                            token_balance: None,
                            error: Some(e.to_string()),
                        });
                        continue;
                    }
                },
            };

            let sol_balance = match self.gateway.lamport_balance(&address).await {
                Ok(lamports) => Some(lamports as f64 / LAMPORTS_PER_SOL),
                Err(e) => {
                    log.say(format!("Wallet {}: balance fetch failed: {e}", index + 1));
                    None
                }
            };

            let token_balance = match &mint {
                Some(mint) => {
                    let ata = get_associated_token_address(&address, mint);
                    match self.gateway.account_data(&ata).await {
                        Ok(data) => {
                            Some(data.as_deref().and_then(token_account_amount).unwrap_or(0))
                        }
                        Err(e) => {
                            log.say(format!(
                                "Wallet {}: token balance fetch failed: {e}",
                                index + 1
                            ));
                            None
                        }
                    }
                }
                None => None,
            };

            rows.push(BalanceRow {
                address: address.to_string(),
                sol_balance,
                token_balance,
                error: None,
            });
        }

        let readable = rows.iter().filter(|r| r.sol_balance.is_some()).count();
        log.say(format!(
            "Checked {readable}/{} wallet(s) successfully",
            rows.len()
        ));
        Ok(BalanceReport {
            rows,
            log: log.into_entries(),
        })
    }
}
