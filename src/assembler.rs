//! Turns a trade intent plus detected regime into an ordered instruction
//! list.
//!
//! Owned responsibilities: compute-budget prefix, exhaustive `(intent,
//! regime)` builder selection, and converting quote budgets into the target
//! amounts the program contracts require. Byte-level encoding belongs to
//! `pump_program` / `amm_program`; pricing errors pass through untouched.

use solana_sdk::{
    compute_budget::ComputeBudgetInstruction, instruction::Instruction, pubkey::Pubkey,
};
use spl_associated_token_account::instruction::create_associated_token_account_idempotent;
use thiserror::Error;

use crate::amm_program;
use crate::curve_math::{self, MathError, PricedTrade};
use crate::pump_program;
use crate::regime::{RegimeSnapshot, TokenRegime};
use crate::types::{TradeIntent, TradeParams};

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("no reserve data for this token; only `create` may proceed without it")]
    MissingReserves,
    #[error("token is migrated but no pool data was captured")]
    MissingPool,
    #[error("`create` is only valid for a token still on the bonding curve")]
    CreateAfterMigration,
}

/// An assembled trade: instructions ready for the transaction builder, plus
/// the pricing outcome so the flow can advance its local reserve copy.
#[derive(Debug)]
pub struct AssembledTrade {
    pub instructions: Vec<Instruction>,
    pub priced: Option<PricedTrade>,
}

fn compute_budget_prefix(params: &TradeParams, instructions: &mut Vec<Instruction>) {
    if params.compute_unit_limit > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_limit(
            params.compute_unit_limit,
        ));
    }
    if params.compute_unit_price_micro_lamports > 0 {
        instructions.push(ComputeBudgetInstruction::set_compute_unit_price(
            params.compute_unit_price_micro_lamports,
        ));
    }
}

/// Assemble the instruction list for one wallet's trade.
///
/// For buys the quote budget is converted to a base-amount target here: the
/// program buy contracts take `(amount, max_cost)`, not a budget.
pub fn assemble(
    intent: &TradeIntent,
    snapshot: &RegimeSnapshot,
    mint: &Pubkey,
    user: &Pubkey,
    params: &TradeParams,
) -> Result<AssembledTrade, AssembleError> {
    let mut instructions = Vec::with_capacity(6);
    compute_budget_prefix(params, &mut instructions);

    let priced = match (intent, snapshot.regime) {
        (
            TradeIntent::Create {
                name,
                symbol,
                uri,
                dev_buy_lamports,
            },
            TokenRegime::OnCurve,
        ) => {
            instructions.push(pump_program::create_instruction(
                mint, user, name, symbol, uri,
            ));
            if *dev_buy_lamports > 0 {
                let reserves = snapshot.reserves.ok_or(AssembleError::MissingReserves)?;
                let priced = curve_math::buy_with_quote_budget(
                    *dev_buy_lamports,
                    &reserves,
                    params.slippage_pct,
                )?;
                instructions.push(create_associated_token_account_idempotent(
                    user,
                    user,
                    mint,
                    &spl_token::id(),
                ));
                // The creator of a brand-new token is the dev wallet itself.
                instructions.push(pump_program::buy_instruction(
                    mint,
                    user,
                    user,
                    priced.expected_counter,
                    priced.bounded_counter,
                ));
                Some(priced)
            } else {
                None
            }
        }
        (TradeIntent::Create { .. }, TokenRegime::Migrated) => {
            return Err(AssembleError::CreateAfterMigration)
        }

        (TradeIntent::Buy { quote_budget }, TokenRegime::OnCurve) => {
            let reserves = snapshot.reserves.ok_or(AssembleError::MissingReserves)?;
            let priced =
                curve_math::buy_with_quote_budget(*quote_budget, &reserves, params.slippage_pct)?;
            let creator = snapshot.creator.unwrap_or(*user);
            instructions.push(create_associated_token_account_idempotent(
                user,
                user,
                mint,
                &spl_token::id(),
            ));
            instructions.push(pump_program::buy_instruction(
                mint,
                user,
                &creator,
                priced.expected_counter,
                priced.bounded_counter,
            ));
            Some(priced)
        }
        (TradeIntent::Buy { quote_budget }, TokenRegime::Migrated) => {
            let reserves = snapshot.reserves.ok_or(AssembleError::MissingReserves)?;
            let pool = snapshot.pool.as_ref().ok_or(AssembleError::MissingPool)?;
            let priced =
                curve_math::buy_with_quote_budget(*quote_budget, &reserves, params.slippage_pct)?;
            instructions.push(create_associated_token_account_idempotent(
                user,
                user,
                mint,
                &spl_token::id(),
            ));
            instructions.push(create_associated_token_account_idempotent(
                user,
                user,
                &amm_program::WSOL_MINT,
                &spl_token::id(),
            ));
            instructions.push(amm_program::buy_instruction(
                &pool.account,
                &pool.address,
                user,
                priced.expected_counter,
                priced.bounded_counter,
            ));
            Some(priced)
        }

        (TradeIntent::Sell { base_amount }, TokenRegime::OnCurve) => {
            let reserves = snapshot.reserves.ok_or(AssembleError::MissingReserves)?;
            let priced =
                curve_math::sell_with_base_input(*base_amount, &reserves, params.slippage_pct)?;
            let creator = snapshot.creator.unwrap_or(*user);
            instructions.push(pump_program::sell_instruction(
                mint,
                user,
                &creator,
                *base_amount,
                priced.bounded_counter,
            ));
            Some(priced)
        }
        (TradeIntent::Sell { base_amount }, TokenRegime::Migrated) => {
            let reserves = snapshot.reserves.ok_or(AssembleError::MissingReserves)?;
            let pool = snapshot.pool.as_ref().ok_or(AssembleError::MissingPool)?;
            let priced =
                curve_math::sell_with_base_input(*base_amount, &reserves, params.slippage_pct)?;
            instructions.push(create_associated_token_account_idempotent(
                user,
                user,
                &amm_program::WSOL_MINT,
                &spl_token::id(),
            ));
            instructions.push(amm_program::sell_instruction(
                &pool.account,
                &pool.address,
                user,
                *base_amount,
                priced.bounded_counter,
            ));
            Some(priced)
        }
    };

    Ok(AssembledTrade {
        instructions,
        priced,
    })
}
