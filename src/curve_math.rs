//! Constant-product pricing for both trading regimes.
//!
//! Pure, deterministic, integer-only. All intermediates are widened to u128 so
//! no monetary path touches floating point; slippage factors use a fixed-point
//! scale of 1e9 (one slippage unit == 1% == 1e7 at scale).
//!
//! Rounding policy: ceiling division for "amount the payer must provide",
//! floor division for "amount the payer receives". The pool keeps every
//! rounding remainder; this must not change, it determines who bears the dust.

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

/// Fixed-point scale for slippage factors.
pub const SLIPPAGE_SCALE: u128 = 1_000_000_000;
/// One slippage percent at [`SLIPPAGE_SCALE`].
const PCT_AT_SCALE: u128 = 10_000_000;
const BPS_DENOMINATOR: u128 = 10_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MathError {
    #[error("pool has an empty reserve; cannot price against it")]
    EmptyPool,
    #[error("trade would deplete the pool (requested {requested}, reserve {reserve})")]
    Depletion { requested: u64, reserve: u64 },
    #[error("slippage {0}% inverts the proceeds bound; must be 0..=100")]
    SlippageOutOfRange(u32),
    #[error("priced amount exceeds u64 range")]
    AmountOverflow,
}

/// Immutable snapshot of a pool's reserves and fee schedule.
///
/// For a bonding-curve token the reserves are the virtual reserves; for a
/// migrated token they are the AMM pool's token-account balances. Either way
/// both sides must be nonzero for any pricing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveState {
    pub base_reserve: u64,
    pub quote_reserve: u64,
    pub lp_fee_bps: u16,
    pub protocol_fee_bps: u16,
    pub creator_fee_bps: u16,
    pub creator: Option<Pubkey>,
}

impl ReserveState {
    /// Sum of the fee legs that actually apply (creator fee only when a
    /// creator is set).
    pub fn total_fee_bps(&self) -> u16 {
        let creator = if self.creator.is_some() {
            self.creator_fee_bps
        } else {
            0
        };
        self.lp_fee_bps + self.protocol_fee_bps + creator
    }

    /// Fold a priced trade into the local copy so the next wallet in the same
    /// chunk prices against the curve as if this one already executed. No
    /// network read happens between wallets; this is the only state update.
    pub fn apply(&mut self, trade: &PricedTrade) {
        match trade.side {
            TradeSide::Buy => {
                self.base_reserve = self.base_reserve.saturating_sub(trade.base_delta);
                self.quote_reserve = self.quote_reserve.saturating_add(trade.quote_delta);
            }
            TradeSide::Sell => {
                self.base_reserve = self.base_reserve.saturating_add(trade.base_delta);
                self.quote_reserve = self.quote_reserve.saturating_sub(trade.quote_delta);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

/// Fee schedule applied by the program, basis points per leg. Carried in
/// configuration; turned into a [`ReserveState`] once reserves are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub lp_fee_bps: u16,
    pub protocol_fee_bps: u16,
    pub creator_fee_bps: u16,
}

impl FeeSchedule {
    pub fn reserve_state(
        &self,
        base_reserve: u64,
        quote_reserve: u64,
        creator: Option<Pubkey>,
    ) -> ReserveState {
        ReserveState {
            base_reserve,
            quote_reserve,
            lp_fee_bps: self.lp_fee_bps,
            protocol_fee_bps: self.protocol_fee_bps,
            creator_fee_bps: self.creator_fee_bps,
            creator,
        }
    }
}

/// Output of a pricing call. Derived, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedTrade {
    pub side: TradeSide,
    /// Counter-asset amount the trade is expected to move, fees included.
    pub expected_counter: u64,
    /// Slippage bound: maximum cost for buys, minimum proceeds for sells.
    pub bounded_counter: u64,
    /// Base-side reserve movement (fees excluded; what the pool sees).
    pub base_delta: u64,
    /// Quote-side reserve movement (fees excluded; what the pool sees).
    pub quote_delta: u64,
}

fn ceil_div(num: u128, den: u128) -> u128 {
    (num + den - 1) / den
}

fn fee(amount: u128, bps: u16) -> u128 {
    amount * bps as u128 / BPS_DENOMINATOR
}

/// Per-leg fees in the canonical order: LP, then protocol, then creator.
/// Each leg floors independently; the legs are NOT computed from the summed
/// bps, so every remainder stays with the payer-side total.
fn fee_legs(amount: u128, reserves: &ReserveState) -> u128 {
    let mut total = fee(amount, reserves.lp_fee_bps);
    total += fee(amount, reserves.protocol_fee_bps);
    if reserves.creator.is_some() {
        total += fee(amount, reserves.creator_fee_bps);
    }
    total
}

fn up_factor(slippage_pct: u32) -> u128 {
    SLIPPAGE_SCALE + slippage_pct as u128 * PCT_AT_SCALE
}

fn down_factor(slippage_pct: u32) -> Result<u128, MathError> {
    if slippage_pct > 100 {
        return Err(MathError::SlippageOutOfRange(slippage_pct));
    }
    Ok(SLIPPAGE_SCALE - slippage_pct as u128 * PCT_AT_SCALE)
}

fn check_reserves(reserves: &ReserveState) -> Result<(), MathError> {
    if reserves.base_reserve == 0 || reserves.quote_reserve == 0 {
        return Err(MathError::EmptyPool);
    }
    Ok(())
}

fn narrow(v: u128) -> Result<u64, MathError> {
    u64::try_from(v).map_err(|_| MathError::AmountOverflow)
}

/// Price a buy that wants exactly `base` units out of the pool.
///
/// `quote_in = ceil(quote_reserve * base / (base_reserve - base))`, fees are
/// added on top, and the slippage bound caps the total cost from above.
pub fn buy_with_base_target(
    base: u64,
    reserves: &ReserveState,
    slippage_pct: u32,
) -> Result<PricedTrade, MathError> {
    check_reserves(reserves)?;
    if base >= reserves.base_reserve {
        return Err(MathError::Depletion {
            requested: base,
            reserve: reserves.base_reserve,
        });
    }

    let quote_in = ceil_div(
        reserves.quote_reserve as u128 * base as u128,
        (reserves.base_reserve - base) as u128,
    );
    let total_quote = quote_in + fee_legs(quote_in, reserves);
    let max_quote = total_quote * up_factor(slippage_pct) / SLIPPAGE_SCALE;

    Ok(PricedTrade {
        side: TradeSide::Buy,
        expected_counter: narrow(total_quote)?,
        bounded_counter: narrow(max_quote)?,
        base_delta: base,
        quote_delta: narrow(quote_in)?,
    })
}

/// Price a buy that wants to spend exactly `quote`.
///
/// The fee-equivalent is stripped first (`quote * 10000 / (10000 + fees)`),
/// then the remainder goes through the constant product. The slippage bound
/// applies to the quote side only: it protects the spend, not the receipt.
pub fn buy_with_quote_budget(
    quote: u64,
    reserves: &ReserveState,
    slippage_pct: u32,
) -> Result<PricedTrade, MathError> {
    check_reserves(reserves)?;

    let effective =
        quote as u128 * BPS_DENOMINATOR / (BPS_DENOMINATOR + reserves.total_fee_bps() as u128);
    let denominator = reserves.quote_reserve as u128 + effective;
    if denominator == 0 {
        return Err(MathError::Depletion {
            requested: quote,
            reserve: reserves.quote_reserve,
        });
    }
    let base_out = reserves.base_reserve as u128 * effective / denominator;
    let max_quote = quote as u128 * up_factor(slippage_pct) / SLIPPAGE_SCALE;

    Ok(PricedTrade {
        side: TradeSide::Buy,
        expected_counter: narrow(base_out)?,
        bounded_counter: narrow(max_quote)?,
        base_delta: narrow(base_out)?,
        quote_delta: narrow(effective)?,
    })
}

/// Price a sell of exactly `base_in` units into the pool.
///
/// Proceeds floor toward the pool, fees come out of the proceeds, and the
/// bound is the minimum the seller will accept.
pub fn sell_with_base_input(
    base_in: u64,
    reserves: &ReserveState,
    slippage_pct: u32,
) -> Result<PricedTrade, MathError> {
    check_reserves(reserves)?;
    let down = down_factor(slippage_pct)?;

    let quote_out = reserves.quote_reserve as u128 * base_in as u128
        / (reserves.base_reserve as u128 + base_in as u128);
    let total = quote_out.saturating_sub(fee_legs(quote_out, reserves));
    let min_quote = total * down / SLIPPAGE_SCALE;

    Ok(PricedTrade {
        side: TradeSide::Sell,
        expected_counter: narrow(total)?,
        bounded_counter: narrow(min_quote)?,
        base_delta: base_in,
        quote_delta: narrow(quote_out)?,
    })
}

/// Price a sell that wants exactly `quote` net proceeds.
///
/// Mirror of [`buy_with_base_target`]: the gross extraction must cover the
/// fee legs, the base input ceils against the seller, and the bound is the
/// minimum acceptable proceeds.
pub fn sell_with_quote_target(
    quote: u64,
    reserves: &ReserveState,
    slippage_pct: u32,
) -> Result<PricedTrade, MathError> {
    check_reserves(reserves)?;
    let down = down_factor(slippage_pct)?;

    let gross = quote as u128 + fee_legs(quote as u128, reserves);
    if gross >= reserves.quote_reserve as u128 {
        return Err(MathError::Depletion {
            requested: quote,
            reserve: reserves.quote_reserve,
        });
    }
    let base_in = ceil_div(
        reserves.base_reserve as u128 * gross,
        reserves.quote_reserve as u128 - gross,
    );
    let min_quote = quote as u128 * down / SLIPPAGE_SCALE;

    Ok(PricedTrade {
        side: TradeSide::Sell,
        expected_counter: narrow(base_in)?,
        bounded_counter: narrow(min_quote)?,
        base_delta: narrow(base_in)?,
        quote_delta: narrow(gross)?,
    })
}
