//! Pricing-regime detection: is a token still on the bonding curve, or has
//! it migrated to the pooled AMM?
//!
//! The transition marker is the curve's virtual token reserve counter: an
//! exact zero means migrated. A confirmed-zero curve with a failed pool
//! lookup is fatal for the trade ([`RegimeError::PricingUnavailable`]) --
//! there is no safe way to approximate a migrated token's price. Everything
//! softer degrades: a missing curve account is a fresh token (valid only for
//! `create`), and a curve *read error* probes the pool before falling back to
//! curve pricing with a warning.

use solana_sdk::pubkey::Pubkey;
use thiserror::Error;
use tracing::{debug, warn};

use crate::amm_program::{self, PoolAccount};
use crate::curve_math::{FeeSchedule, ReserveState};
use crate::gateway::{token_account_amount, ChainGateway, GatewayError};
use crate::pump_program::{self, CurveAccount};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRegime {
    OnCurve,
    Migrated,
}

/// Everything a pool lookup yields that the assembler later needs.
#[derive(Debug, Clone)]
pub struct PoolKeys {
    pub address: Pubkey,
    pub account: PoolAccount,
}

#[derive(Debug, Clone)]
pub struct RegimeSnapshot {
    pub regime: TokenRegime,
    /// `None` only for a not-yet-created token; every trade intent other
    /// than `create` requires reserves.
    pub reserves: Option<ReserveState>,
    pub creator: Option<Pubkey>,
    pub pool: Option<PoolKeys>,
}

impl RegimeSnapshot {
    pub fn fresh_curve(reserves: ReserveState) -> Self {
        Self {
            regime: TokenRegime::OnCurve,
            reserves: Some(reserves),
            creator: reserves.creator,
            pool: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegimeError {
    #[error("cannot price migrated token: {0}")]
    PricingUnavailable(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

async fn load_pool(
    gateway: &dyn ChainGateway,
    mint: &Pubkey,
    fees: &FeeSchedule,
) -> Result<(PoolKeys, ReserveState), String> {
    let address = amm_program::canonical_pool_pda(mint);
    let data = gateway
        .account_data(&address)
        .await
        .map_err(|e| format!("pool fetch failed: {e}"))?
        .ok_or_else(|| format!("pool account {address} not found"))?;
    let account = PoolAccount::decode(&data).map_err(|e| e.to_string())?;

    let base = gateway
        .account_data(&account.pool_base_token_account)
        .await
        .map_err(|e| format!("pool base vault fetch failed: {e}"))?
        .as_deref()
        .and_then(token_account_amount)
        .ok_or("pool base vault unreadable")?;
    let quote = gateway
        .account_data(&account.pool_quote_token_account)
        .await
        .map_err(|e| format!("pool quote vault fetch failed: {e}"))?
        .as_deref()
        .and_then(token_account_amount)
        .ok_or("pool quote vault unreadable")?;

    let reserves = fees.reserve_state(base, quote, account.coin_creator);
    Ok((PoolKeys { address, account }, reserves))
}

/// Detect the pricing regime for `mint` by inspecting on-chain reserve state.
pub async fn detect(
    gateway: &dyn ChainGateway,
    mint: &Pubkey,
    fees: &FeeSchedule,
) -> Result<RegimeSnapshot, RegimeError> {
    let curve_address = pump_program::curve_pda(mint);
    let fetched = match gateway.account_data(&curve_address).await {
        Ok(data) => Ok(data),
        // Endpoint exhaustion stays fatal for the whole flow.
        Err(e @ GatewayError::NoEndpointAvailable) => return Err(e.into()),
        Err(e) => Err(e.to_string()),
    };

    let curve = match fetched {
        Ok(None) => {
            debug!(%mint, "no curve account; token not created yet");
            return Ok(RegimeSnapshot {
                regime: TokenRegime::OnCurve,
                reserves: None,
                creator: None,
                pool: None,
            });
        }
        Ok(Some(data)) => match CurveAccount::decode(&data) {
            Ok(curve) => Ok(curve),
            Err(e) => Err(e.to_string()),
        },
        Err(e) => Err(e),
    };

    match curve {
        Ok(curve) if curve.virtual_token_reserves == 0 => {
            // Confirmed migration. The pool is the only valid price source.
            debug!(%mint, "curve reserve is zero; token migrated");
            match load_pool(gateway, mint, fees).await {
                Ok((pool, reserves)) => Ok(RegimeSnapshot {
                    regime: TokenRegime::Migrated,
                    reserves: Some(reserves),
                    creator: pool.account.coin_creator,
                    pool: Some(pool),
                }),
                Err(reason) => Err(RegimeError::PricingUnavailable(reason)),
            }
        }
        Ok(curve) => {
            debug!(
                %mint,
                base = curve.virtual_token_reserves,
                quote = curve.virtual_sol_reserves,
                "token on bonding curve"
            );
            Ok(RegimeSnapshot::fresh_curve(fees.reserve_state(
                curve.virtual_token_reserves,
                curve.virtual_sol_reserves,
                curve.creator,
            )))
        }
        Err(curve_error) => {
            // The curve did not read zero -- it did not read at all. Probe
            // the pool; if that also fails, curve pricing with no reserve
            // data is the degraded fallback.
            match load_pool(gateway, mint, fees).await {
                Ok((pool, reserves)) => Ok(RegimeSnapshot {
                    regime: TokenRegime::Migrated,
                    reserves: Some(reserves),
                    creator: pool.account.coin_creator,
                    pool: Some(pool),
                }),
                Err(pool_error) => {
                    warn!(
                        %mint,
                        %curve_error,
                        %pool_error,
                        "curve read failed and no pool found; falling back to curve pricing without reserves"
                    );
                    Ok(RegimeSnapshot {
                        regime: TokenRegime::OnCurve,
                        reserves: None,
                        creator: None,
                        pool: None,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amm_program::{canonical_pool_pda, WSOL_MINT};
    use async_trait::async_trait;
    use solana_sdk::{hash::Hash, signature::Signature, transaction::VersionedTransaction};
    use std::collections::HashMap;

    const FEES: FeeSchedule = FeeSchedule {
        lp_fee_bps: 95,
        protocol_fee_bps: 5,
        creator_fee_bps: 5,
    };

    #[derive(Default)]
    struct FixtureGateway {
        accounts: HashMap<Pubkey, Vec<u8>>,
    }

    #[async_trait]
    impl ChainGateway for FixtureGateway {
        async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>, GatewayError> {
            Ok(self.accounts.get(address).cloned())
        }
        async fn lamport_balance(&self, _address: &Pubkey) -> Result<u64, GatewayError> {
            Ok(0)
        }
        async fn latest_blockhash(&self) -> Result<Hash, GatewayError> {
            Ok(Hash::default())
        }
        async fn simulate(
            &self,
            _tx: &VersionedTransaction,
        ) -> Result<crate::gateway::SimulationOutcome, GatewayError> {
            unreachable!("regime detection never simulates")
        }
        async fn send_transaction(
            &self,
            _tx: &VersionedTransaction,
        ) -> Result<Signature, GatewayError> {
            unreachable!("regime detection never submits")
        }
    }

    fn token_account_bytes(amount: u64) -> Vec<u8> {
        let mut data = vec![0u8; 165];
        data[64..72].copy_from_slice(&amount.to_le_bytes());
        data
    }

    fn curve_bytes(virtual_token: u64, virtual_sol: u64, creator: Option<Pubkey>) -> Vec<u8> {
        CurveAccount {
            virtual_token_reserves: virtual_token,
            virtual_sol_reserves: virtual_sol,
            real_token_reserves: 0,
            real_sol_reserves: 0,
            token_total_supply: 1_000_000_000_000_000,
            complete: virtual_token == 0,
            creator,
        }
        .encode()
    }

    fn with_pool(gateway: &mut FixtureGateway, mint: &Pubkey, base: u64, quote: u64) {
        let base_vault = Pubkey::new_unique();
        let quote_vault = Pubkey::new_unique();
        let pool = PoolAccount {
            pool_bump: 254,
            index: 0,
            creator: Pubkey::new_unique(),
            base_mint: *mint,
            quote_mint: WSOL_MINT,
            lp_mint: Pubkey::new_unique(),
            pool_base_token_account: base_vault,
            pool_quote_token_account: quote_vault,
            lp_supply: 1,
            coin_creator: Some(Pubkey::new_unique()),
        };
        gateway
            .accounts
            .insert(canonical_pool_pda(mint), pool.encode());
        gateway
            .accounts
            .insert(base_vault, token_account_bytes(base));
        gateway
            .accounts
            .insert(quote_vault, token_account_bytes(quote));
    }

    #[tokio::test]
    async fn nonzero_curve_stays_on_curve() {
        let mint = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let mut gateway = FixtureGateway::default();
        gateway.accounts.insert(
            pump_program::curve_pda(&mint),
            curve_bytes(1_073_000_000_000_000, 30_000_000_000, Some(creator)),
        );

        let snap = detect(&gateway, &mint, &FEES).await.unwrap();
        assert_eq!(snap.regime, TokenRegime::OnCurve);
        let reserves = snap.reserves.unwrap();
        assert_eq!(reserves.base_reserve, 1_073_000_000_000_000);
        assert_eq!(reserves.creator, Some(creator));
    }

    #[tokio::test]
    async fn zero_curve_with_pool_migrates() {
        let mint = Pubkey::new_unique();
        let mut gateway = FixtureGateway::default();
        gateway.accounts.insert(
            pump_program::curve_pda(&mint),
            curve_bytes(0, 0, None),
        );
        with_pool(&mut gateway, &mint, 500_000_000_000, 80_000_000_000);

        let snap = detect(&gateway, &mint, &FEES).await.unwrap();
        assert_eq!(snap.regime, TokenRegime::Migrated);
        let reserves = snap.reserves.unwrap();
        assert_eq!(reserves.base_reserve, 500_000_000_000);
        assert_eq!(reserves.quote_reserve, 80_000_000_000);
        assert!(snap.pool.is_some());
    }

    #[tokio::test]
    async fn zero_curve_without_pool_is_fatal() {
        // Never silently fall back to curve pricing on a confirmed zero.
        let mint = Pubkey::new_unique();
        let mut gateway = FixtureGateway::default();
        gateway
            .accounts
            .insert(pump_program::curve_pda(&mint), curve_bytes(0, 0, None));

        let err = detect(&gateway, &mint, &FEES).await.unwrap_err();
        assert!(matches!(err, RegimeError::PricingUnavailable(_)));
    }

    #[tokio::test]
    async fn missing_curve_is_fresh_token() {
        let mint = Pubkey::new_unique();
        let gateway = FixtureGateway::default();
        let snap = detect(&gateway, &mint, &FEES).await.unwrap();
        assert_eq!(snap.regime, TokenRegime::OnCurve);
        assert!(snap.reserves.is_none());
    }

    #[tokio::test]
    async fn unreadable_curve_probes_pool_first() {
        let mint = Pubkey::new_unique();
        let mut gateway = FixtureGateway::default();
        gateway
            .accounts
            .insert(pump_program::curve_pda(&mint), vec![0u8; 4]); // undecodable
        with_pool(&mut gateway, &mint, 1_000, 2_000);

        let snap = detect(&gateway, &mint, &FEES).await.unwrap();
        assert_eq!(snap.regime, TokenRegime::Migrated);
    }

    #[tokio::test]
    async fn unreadable_curve_without_pool_degrades_to_curve() {
        let mint = Pubkey::new_unique();
        let mut gateway = FixtureGateway::default();
        gateway
            .accounts
            .insert(pump_program::curve_pda(&mint), vec![0u8; 4]);

        let snap = detect(&gateway, &mint, &FEES).await.unwrap();
        assert_eq!(snap.regime, TokenRegime::OnCurve);
        assert!(snap.reserves.is_none());
    }
}
