//! Pooled-AMM program collaborator for tokens that have migrated off the
//! bonding curve: canonical pool derivation, pool account decoding, and swap
//! instruction builders.
//!
//! Same contract shape as the curve side: the builders take a target amount
//! plus a slippage-bounded counter amount, never a raw budget.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program,
};
use spl_associated_token_account::get_associated_token_address;
use thiserror::Error;

use crate::pump_program::LAUNCH_PROGRAM_ID;

pub const AMM_PROGRAM_ID: Pubkey = pubkey!("pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA");
pub const AMM_GLOBAL_CONFIG: Pubkey = pubkey!("ADyA8hdefvWN2dbGGWFotbzWxrAvLW83WG6QCVXvJKqw");
pub const AMM_EVENT_AUTHORITY: Pubkey = pubkey!("GS4CU59F31iL7aR2Q8zVS8DRrcRnXX1yjQ66TqNVQnaR");
pub const AMM_PROTOCOL_FEE_RECIPIENT: Pubkey =
    pubkey!("62qc2CNXwrYqQScmEdiZFFAnJR262PxWEuNQtxfafNgV");
/// Wrapped-SOL mint; the quote side of every canonical launch pool.
pub const WSOL_MINT: Pubkey = pubkey!("So11111111111111111111111111111111111111112");

// Anchor method discriminators; the AMM exposes the same method names as the
// curve program, so the bytes coincide.
const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

const POOL_FIXED_LEN: usize = 8 + 1 + 2 + 32 * 6 + 8;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolAccountError {
    #[error("pool account too short: {0} bytes")]
    TooShort(usize),
}

/// Decoded AMM pool account. Reserves live in the two pool token accounts,
/// not in this record; the detector fetches those balances separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolAccount {
    pub pool_bump: u8,
    pub index: u16,
    pub creator: Pubkey,
    pub base_mint: Pubkey,
    pub quote_mint: Pubkey,
    pub lp_mint: Pubkey,
    pub pool_base_token_account: Pubkey,
    pub pool_quote_token_account: Pubkey,
    pub lp_supply: u64,
    pub coin_creator: Option<Pubkey>,
}

impl PoolAccount {
    pub fn decode(data: &[u8]) -> Result<Self, PoolAccountError> {
        if data.len() < POOL_FIXED_LEN {
            return Err(PoolAccountError::TooShort(data.len()));
        }
        let key_at =
            |offset: usize| Pubkey::try_from(&data[offset..offset + 32]).expect("32-byte slice");
        // pool_base/pool_quote token accounts follow the three mints.
        let coin_creator = if data.len() >= POOL_FIXED_LEN + 32 {
            let key = key_at(POOL_FIXED_LEN);
            (key != Pubkey::default()).then_some(key)
        } else {
            None
        };
        Ok(Self {
            pool_bump: data[8],
            index: u16::from_le_bytes(data[9..11].try_into().expect("2-byte slice")),
            creator: key_at(11),
            base_mint: key_at(43),
            quote_mint: key_at(75),
            lp_mint: key_at(107),
            pool_base_token_account: key_at(139),
            pool_quote_token_account: key_at(171),
            lp_supply: u64::from_le_bytes(data[203..211].try_into().expect("8-byte slice")),
            coin_creator,
        })
    }

    /// Inverse of [`decode`]; used by test fixtures and simulators.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(POOL_FIXED_LEN + 32);
        out.extend_from_slice(&[0u8; 8]);
        out.push(self.pool_bump);
        out.extend_from_slice(&self.index.to_le_bytes());
        out.extend_from_slice(self.creator.as_ref());
        out.extend_from_slice(self.base_mint.as_ref());
        out.extend_from_slice(self.quote_mint.as_ref());
        out.extend_from_slice(self.lp_mint.as_ref());
        out.extend_from_slice(self.pool_base_token_account.as_ref());
        out.extend_from_slice(self.pool_quote_token_account.as_ref());
        out.extend_from_slice(&self.lp_supply.to_le_bytes());
        out.extend_from_slice(self.coin_creator.unwrap_or_default().as_ref());
        out
    }
}

/// Authority PDA the launch program uses when it seeds the canonical pool.
pub fn pool_authority_pda(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"pool-authority", mint.as_ref()], &LAUNCH_PROGRAM_ID).0
}

/// Canonical pool for a migrated mint: index 0, seeded by the launch
/// program's pool authority, quoted in wrapped SOL.
pub fn canonical_pool_pda(mint: &Pubkey) -> Pubkey {
    let authority = pool_authority_pda(mint);
    Pubkey::find_program_address(
        &[
            b"pool",
            &0u16.to_le_bytes(),
            authority.as_ref(),
            mint.as_ref(),
            WSOL_MINT.as_ref(),
        ],
        &AMM_PROGRAM_ID,
    )
    .0
}

fn swap_accounts(pool: &PoolAccount, pool_address: &Pubkey, user: &Pubkey) -> Vec<AccountMeta> {
    vec![
        AccountMeta::new(*pool_address, false),
        AccountMeta::new(*user, true),
        AccountMeta::new_readonly(AMM_GLOBAL_CONFIG, false),
        AccountMeta::new_readonly(pool.base_mint, false),
        AccountMeta::new_readonly(pool.quote_mint, false),
        AccountMeta::new(get_associated_token_address(user, &pool.base_mint), false),
        AccountMeta::new(get_associated_token_address(user, &pool.quote_mint), false),
        AccountMeta::new(pool.pool_base_token_account, false),
        AccountMeta::new(pool.pool_quote_token_account, false),
        AccountMeta::new_readonly(AMM_PROTOCOL_FEE_RECIPIENT, false),
        AccountMeta::new(
            get_associated_token_address(&AMM_PROTOCOL_FEE_RECIPIENT, &pool.quote_mint),
            false,
        ),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(spl_token::id(), false),
        AccountMeta::new_readonly(system_program::id(), false),
        AccountMeta::new_readonly(spl_associated_token_account::id(), false),
        AccountMeta::new_readonly(AMM_EVENT_AUTHORITY, false),
        AccountMeta::new_readonly(AMM_PROGRAM_ID, false),
    ]
}

/// Swap quote for base: receive `base_amount_out`, pay at most
/// `max_quote_in`.
pub fn buy_instruction(
    pool: &PoolAccount,
    pool_address: &Pubkey,
    user: &Pubkey,
    base_amount_out: u64,
    max_quote_in: u64,
) -> Instruction {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&BUY_DISCRIMINATOR);
    data.extend_from_slice(&base_amount_out.to_le_bytes());
    data.extend_from_slice(&max_quote_in.to_le_bytes());
    Instruction {
        program_id: AMM_PROGRAM_ID,
        accounts: swap_accounts(pool, pool_address, user),
        data,
    }
}

/// Swap base for quote: pay `base_amount_in`, receive at least
/// `min_quote_out`.
pub fn sell_instruction(
    pool: &PoolAccount,
    pool_address: &Pubkey,
    user: &Pubkey,
    base_amount_in: u64,
    min_quote_out: u64,
) -> Instruction {
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&SELL_DISCRIMINATOR);
    data.extend_from_slice(&base_amount_in.to_le_bytes());
    data.extend_from_slice(&min_quote_out.to_le_bytes());
    Instruction {
        program_id: AMM_PROGRAM_ID,
        accounts: swap_accounts(pool, pool_address, user),
        data,
    }
}
