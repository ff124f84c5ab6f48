//! Shared request/result types for the orchestration flows.

use serde::{Deserialize, Serialize};
use tracing::info;

/// One trade to perform for one wallet. Regime is orthogonal; the assembler
/// matches exhaustively over `(intent, regime)`.
#[derive(Debug, Clone)]
pub enum TradeIntent {
    Create {
        name: String,
        symbol: String,
        uri: String,
        /// Optional dev buy folded into the creation transaction, lamports.
        dev_buy_lamports: u64,
    },
    Buy {
        /// Quote budget to spend, lamports.
        quote_budget: u64,
    },
    Sell {
        /// Base amount to sell, token base units.
        base_amount: u64,
    },
}

/// Per-trade knobs the assembler needs beyond the intent itself.
#[derive(Debug, Clone, Copy)]
pub struct TradeParams {
    pub compute_unit_limit: u32,
    pub compute_unit_price_micro_lamports: u64,
    /// Whole percent, 1 unit == 1%.
    pub slippage_pct: u32,
}

/// Terminal status of one wallet within a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletStatus {
    /// Included in a bundle that was accepted by a relay.
    Bundled,
    /// Sent directly over RPC (consolidate/distribute paths).
    Submitted,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct WalletOutcome {
    pub index: usize,
    pub pubkey: String,
    pub status: WalletStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

/// What every flow hands back: overall verdict, per-wallet outcomes, and the
/// ordered human-readable log of major steps so partial successes are
/// auditable without extra tooling.
#[derive(Debug, Clone, Serialize, Default)]
pub struct FlowReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint: Option<String>,
    pub bundle_ids: Vec<String>,
    pub outcomes: Vec<WalletOutcome>,
    pub log: Vec<String>,
}

impl FlowReport {
    pub fn bundled_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.status == WalletStatus::Bundled)
            .count()
    }
}

/// Ordered step log: every entry goes to tracing and into the report.
#[derive(Debug, Default)]
pub struct StepLog {
    entries: Vec<String>,
}

impl StepLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{message}");
        self.entries.push(message);
    }

    pub fn into_entries(self) -> Vec<String> {
        self.entries
    }
}

// ---- flow requests ----

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRequest {
    pub dev_private_key: String,
    /// Dev buy folded into the creation transaction, SOL.
    #[serde(default)]
    pub dev_buy_sol: f64,
    /// One `privateKey,amountSol` per line; `#` comments allowed.
    #[serde(default)]
    pub buyers: String,
    pub token_name: String,
    pub token_symbol: String,
    /// Metadata URI; uploading/pinning metadata is outside this crate.
    pub token_uri: String,
    #[serde(default)]
    pub slippage_pct: Option<u32>,
    #[serde(default)]
    pub bundle_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BuyRequest {
    pub mint: String,
    pub buyers: String,
    #[serde(default)]
    pub slippage_pct: Option<u32>,
    #[serde(default)]
    pub bundle_size: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SellWalletSpec {
    pub private_key: String,
    /// 1..=100, share of the wallet's token balance to sell.
    pub percentage: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SellRequest {
    pub mint: String,
    pub wallets: Vec<SellWalletSpec>,
    #[serde(default)]
    pub slippage_pct: Option<u32>,
    #[serde(default)]
    pub bundle_size: Option<usize>,
    /// Dry-run each sell before bundling it.
    #[serde(default = "default_true")]
    pub simulate_first: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConsolidateRequest {
    pub mint: String,
    /// Private keys of the wallets to sweep. May be empty when
    /// `wallet_batch` names a saved batch instead.
    #[serde(default)]
    pub wallets: Vec<String>,
    /// Identifier of a saved wallet batch to sweep.
    #[serde(default)]
    pub wallet_batch: Option<String>,
    pub target_address: String,
    #[serde(default = "default_true")]
    pub consolidate_sol: bool,
    #[serde(default = "default_true")]
    pub consolidate_tokens: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DistributeRequest {
    pub master_private_key: String,
    /// Target wallet addresses.
    pub targets: Vec<String>,
    /// SOL sent to each target.
    pub sol_amount: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BalancesRequest {
    /// Addresses or private keys; either form is accepted per item.
    pub wallets: Vec<String>,
    #[serde(default)]
    pub mint: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceRow {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sol_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_balance: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceReport {
    pub rows: Vec<BalanceRow>,
    pub log: Vec<String>,
}

/// Top-level job file shape for the CLI entrypoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    Create(CreateRequest),
    Buy(BuyRequest),
    Sell(SellRequest),
    Consolidate(ConsolidateRequest),
    Distribute(DistributeRequest),
    Balances(BalancesRequest),
    /// List saved wallet batches from the configured store directory.
    Batches,
}
