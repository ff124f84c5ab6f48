//! Runtime configuration: endpoints, relay set, bundling and trade defaults.
//!
//! Loads from a TOML file when one is given, then lets environment variables
//! override the endpoint lists. Every field has a deployment-realistic
//! default so `Config::load(None)` is usable as-is.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::bundle::{DEFAULT_RELAY_ENDPOINTS, DEFAULT_TIP_ACCOUNTS};
use crate::curve_math::FeeSchedule;

fn default_rpc_endpoints() -> Vec<String> {
    vec!["https://api.mainnet-beta.solana.com".to_string()]
}

fn default_relay_endpoints() -> Vec<String> {
    DEFAULT_RELAY_ENDPOINTS.iter().map(|s| s.to_string()).collect()
}

fn default_tip_accounts() -> Vec<String> {
    DEFAULT_TIP_ACCOUNTS.iter().map(|s| s.to_string()).collect()
}

fn default_tip_lamports() -> u64 {
    100_000
}

fn default_bundle_size() -> usize {
    5
}

fn default_compute_unit_limit() -> u32 {
    600_000
}

fn default_compute_unit_price() -> u64 {
    2_000
}

fn default_slippage_pct() -> u32 {
    10
}

fn default_fees() -> FeeSchedule {
    FeeSchedule {
        lp_fee_bps: 95,
        protocol_fee_bps: 5,
        creator_fee_bps: 5,
    }
}

// The launch program's published initial virtual reserves; what a brand-new
// curve prices against before its account exists on chain.
fn default_initial_base_reserves() -> u64 {
    1_073_000_000_000_000
}

fn default_initial_quote_reserves() -> u64 {
    30_000_000_000
}

fn default_probe_timeout_ms() -> u64 {
    5_000
}

fn default_rent_reserve_lamports() -> u64 {
    1_000_000
}

fn default_dust_threshold_lamports() -> u64 {
    5_000
}

fn default_wallet_dir() -> String {
    "wallets".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_rpc_endpoints")]
    pub rpc_endpoints: Vec<String>,
    #[serde(default = "default_relay_endpoints")]
    pub relay_endpoints: Vec<String>,
    #[serde(default = "default_tip_accounts")]
    pub tip_accounts: Vec<String>,
    #[serde(default = "default_tip_lamports")]
    pub tip_lamports: u64,
    /// Max transactions per bundle, tip included. Relays cap this at 5.
    #[serde(default = "default_bundle_size")]
    pub bundle_size: usize,
    #[serde(default = "default_compute_unit_limit")]
    pub compute_unit_limit: u32,
    /// Micro-lamports per compute unit.
    #[serde(default = "default_compute_unit_price")]
    pub compute_unit_price: u64,
    /// Whole percent, 1 unit == 1%.
    #[serde(default = "default_slippage_pct")]
    pub default_slippage_pct: u32,
    #[serde(default = "default_fees")]
    pub fees: FeeSchedule,
    #[serde(default = "default_initial_base_reserves")]
    pub initial_virtual_base_reserves: u64,
    #[serde(default = "default_initial_quote_reserves")]
    pub initial_virtual_quote_reserves: u64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Left behind in each swept wallet so the account stays rent-exempt.
    #[serde(default = "default_rent_reserve_lamports")]
    pub rent_reserve_lamports: u64,
    /// Balances at or below this are not worth consolidating.
    #[serde(default = "default_dust_threshold_lamports")]
    pub dust_threshold_lamports: u64,
    #[serde(default = "default_wallet_dir")]
    pub wallet_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("defaults are total")
    }
}

fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl Config {
    /// Load from an optional TOML file, then apply env overrides
    /// (`BUNDLER_RPC_ENDPOINTS`, `BUNDLER_RELAY_ENDPOINTS`, comma-separated).
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = std::fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                toml::from_str(&raw).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Config::default(),
        };

        if let Some(endpoints) = env_list("BUNDLER_RPC_ENDPOINTS") {
            config.rpc_endpoints = endpoints;
        }
        if let Some(relays) = env_list("BUNDLER_RELAY_ENDPOINTS") {
            config.relay_endpoints = relays;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc_endpoints.is_empty() {
            return Err(anyhow!("rpc_endpoints must contain at least one endpoint"));
        }
        if self.relay_endpoints.is_empty() {
            return Err(anyhow!("relay_endpoints must contain at least one relay"));
        }
        if self.tip_accounts.is_empty() {
            return Err(anyhow!("tip_accounts must not be empty"));
        }
        if !(2..=5).contains(&self.bundle_size) {
            return Err(anyhow!(
                "bundle_size must be within 2..=5, got {}",
                self.bundle_size
            ));
        }
        if self.default_slippage_pct > 100 {
            return Err(anyhow!(
                "default_slippage_pct must be <= 100, got {}",
                self.default_slippage_pct
            ));
        }
        if self.tip_lamports == 0 {
            return Err(anyhow!("tip_lamports must be > 0"));
        }
        let total_fee_bps = self.fees.lp_fee_bps as u32
            + self.fees.protocol_fee_bps as u32
            + self.fees.creator_fee_bps as u32;
        if total_fee_bps >= 10_000 {
            return Err(anyhow!(
                "fee schedule sums to {total_fee_bps} bps; must be below 10000"
            ));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
