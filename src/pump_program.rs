//! Bonding-curve program collaborator: PDAs, account decoding, and
//! ready-to-sign instruction builders for `create` / `buy` / `sell`.
//!
//! The wire format is owned by the on-chain program; this module only encodes
//! the documented call contract. Buy takes `(amount, max_quote_cost)`, sell
//! takes `(amount, min_quote_output)` -- converting a quote budget into a
//! target amount is the assembler's job, not this module's.

use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program,
};
use spl_associated_token_account::get_associated_token_address;
use thiserror::Error;

pub const LAUNCH_PROGRAM_ID: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const GLOBAL_STATE: Pubkey = pubkey!("4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf");
pub const EVENT_AUTHORITY: Pubkey = pubkey!("Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1");
pub const FEE_RECIPIENT: Pubkey = pubkey!("CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM");
pub const METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");
const RENT_SYSVAR: Pubkey = pubkey!("SysvarRent111111111111111111111111111111111");

// Anchor method discriminators for the deployed program.
const CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];
const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

const CURVE_FIXED_LEN: usize = 8 + 5 * 8 + 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CurveAccountError {
    #[error("curve account too short: {0} bytes")]
    TooShort(usize),
}

/// Decoded bonding-curve state. `virtual_*` reserves are the pricing inputs;
/// `virtual_token_reserves == 0` is the migration marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveAccount {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
    pub creator: Option<Pubkey>,
}

impl CurveAccount {
    pub fn decode(data: &[u8]) -> Result<Self, CurveAccountError> {
        if data.len() < CURVE_FIXED_LEN {
            return Err(CurveAccountError::TooShort(data.len()));
        }
        let u64_at = |offset: usize| {
            u64::from_le_bytes(data[offset..offset + 8].try_into().expect("8-byte slice"))
        };
        // Older curve accounts predate the creator field.
        let creator = if data.len() >= CURVE_FIXED_LEN + 32 {
            let key = Pubkey::try_from(&data[CURVE_FIXED_LEN..CURVE_FIXED_LEN + 32])
                .expect("32-byte slice");
            (key != Pubkey::default()).then_some(key)
        } else {
            None
        };
        Ok(Self {
            virtual_token_reserves: u64_at(8),
            virtual_sol_reserves: u64_at(16),
            real_token_reserves: u64_at(24),
            real_sol_reserves: u64_at(32),
            token_total_supply: u64_at(40),
            complete: data[48] != 0,
            creator,
        })
    }

    /// Inverse of [`decode`]; used by test fixtures and simulators.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(CURVE_FIXED_LEN + 32);
        out.extend_from_slice(&[0u8; 8]);
        out.extend_from_slice(&self.virtual_token_reserves.to_le_bytes());
        out.extend_from_slice(&self.virtual_sol_reserves.to_le_bytes());
        out.extend_from_slice(&self.real_token_reserves.to_le_bytes());
        out.extend_from_slice(&self.real_sol_reserves.to_le_bytes());
        out.extend_from_slice(&self.token_total_supply.to_le_bytes());
        out.push(self.complete as u8);
        out.extend_from_slice(self.creator.unwrap_or_default().as_ref());
        out
    }
}

pub fn curve_pda(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], &LAUNCH_PROGRAM_ID).0
}

pub fn mint_authority_pda() -> Pubkey {
    Pubkey::find_program_address(&[b"mint-authority"], &LAUNCH_PROGRAM_ID).0
}

pub fn creator_vault_pda(creator: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"creator-vault", creator.as_ref()], &LAUNCH_PROGRAM_ID).0
}

pub fn metadata_pda(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    )
    .0
}

fn borsh_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Token-creation instruction. `mint` and `user` both sign.
pub fn create_instruction(
    mint: &Pubkey,
    user: &Pubkey,
    name: &str,
    symbol: &str,
    uri: &str,
) -> Instruction {
    let bonding_curve = curve_pda(mint);
    let mut data = Vec::with_capacity(8 + 12 + name.len() + symbol.len() + uri.len() + 32);
    data.extend_from_slice(&CREATE_DISCRIMINATOR);
    borsh_string(&mut data, name);
    borsh_string(&mut data, symbol);
    borsh_string(&mut data, uri);
    data.extend_from_slice(user.as_ref());

    Instruction {
        program_id: LAUNCH_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*mint, true),
            AccountMeta::new_readonly(mint_authority_pda(), false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(get_associated_token_address(&bonding_curve, mint), false),
            AccountMeta::new_readonly(GLOBAL_STATE, false),
            AccountMeta::new_readonly(METADATA_PROGRAM_ID, false),
            AccountMeta::new(metadata_pda(mint), false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(RENT_SYSVAR, false),
            AccountMeta::new_readonly(EVENT_AUTHORITY, false),
            AccountMeta::new_readonly(LAUNCH_PROGRAM_ID, false),
        ],
        data,
    }
}

/// Buy `amount` base units, paying at most `max_quote_cost` lamports.
pub fn buy_instruction(
    mint: &Pubkey,
    user: &Pubkey,
    creator: &Pubkey,
    amount: u64,
    max_quote_cost: u64,
) -> Instruction {
    let bonding_curve = curve_pda(mint);
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&BUY_DISCRIMINATOR);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&max_quote_cost.to_le_bytes());

    Instruction {
        program_id: LAUNCH_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new_readonly(GLOBAL_STATE, false),
            AccountMeta::new(FEE_RECIPIENT, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(get_associated_token_address(&bonding_curve, mint), false),
            AccountMeta::new(get_associated_token_address(user, mint), false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new(creator_vault_pda(creator), false),
            AccountMeta::new_readonly(EVENT_AUTHORITY, false),
            AccountMeta::new_readonly(LAUNCH_PROGRAM_ID, false),
        ],
        data,
    }
}

/// Sell `amount` base units for at least `min_quote_output` lamports.
pub fn sell_instruction(
    mint: &Pubkey,
    user: &Pubkey,
    creator: &Pubkey,
    amount: u64,
    min_quote_output: u64,
) -> Instruction {
    let bonding_curve = curve_pda(mint);
    let mut data = Vec::with_capacity(24);
    data.extend_from_slice(&SELL_DISCRIMINATOR);
    data.extend_from_slice(&amount.to_le_bytes());
    data.extend_from_slice(&min_quote_output.to_le_bytes());

    Instruction {
        program_id: LAUNCH_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new_readonly(GLOBAL_STATE, false),
            AccountMeta::new(FEE_RECIPIENT, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(get_associated_token_address(&bonding_curve, mint), false),
            AccountMeta::new(get_associated_token_address(user, mint), false),
            AccountMeta::new(*user, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new(creator_vault_pda(creator), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(EVENT_AUTHORITY, false),
            AccountMeta::new_readonly(LAUNCH_PROGRAM_ID, false),
        ],
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curve_account_roundtrip() {
        let creator = Pubkey::new_unique();
        let account = CurveAccount {
            virtual_token_reserves: 1_073_000_000_000_000,
            virtual_sol_reserves: 30_000_000_000,
            real_token_reserves: 793_100_000_000_000,
            real_sol_reserves: 0,
            token_total_supply: 1_000_000_000_000_000,
            complete: false,
            creator: Some(creator),
        };
        let decoded = CurveAccount::decode(&account.encode()).unwrap();
        assert_eq!(decoded, account);
    }

    #[test]
    fn decode_tolerates_missing_creator() {
        let account = CurveAccount {
            virtual_token_reserves: 5,
            virtual_sol_reserves: 6,
            real_token_reserves: 0,
            real_sol_reserves: 0,
            token_total_supply: 7,
            complete: true,
            creator: None,
        };
        let mut bytes = account.encode();
        bytes.truncate(CURVE_FIXED_LEN);
        let decoded = CurveAccount::decode(&bytes).unwrap();
        assert_eq!(decoded.creator, None);
        assert!(decoded.complete);
    }

    #[test]
    fn decode_rejects_short_buffers() {
        assert_eq!(
            CurveAccount::decode(&[0u8; 10]),
            Err(CurveAccountError::TooShort(10))
        );
    }

    #[test]
    fn buy_data_layout() {
        let mint = Pubkey::new_unique();
        let user = Pubkey::new_unique();
        let ix = buy_instruction(&mint, &user, &user, 1_000, 2_000);
        assert_eq!(&ix.data[0..8], &BUY_DISCRIMINATOR);
        assert_eq!(u64::from_le_bytes(ix.data[8..16].try_into().unwrap()), 1_000);
        assert_eq!(u64::from_le_bytes(ix.data[16..24].try_into().unwrap()), 2_000);
        assert_eq!(ix.accounts.len(), 12);
        assert!(ix.accounts[6].is_signer);
    }

    #[test]
    fn create_serializes_length_prefixed_strings() {
        let mint = Pubkey::new_unique();
        let user = Pubkey::new_unique();
        let ix = create_instruction(&mint, &user, "Name", "SYM", "ipfs://x");
        assert_eq!(&ix.data[0..8], &CREATE_DISCRIMINATOR);
        assert_eq!(u32::from_le_bytes(ix.data[8..12].try_into().unwrap()), 4);
        assert_eq!(&ix.data[12..16], b"Name");
        assert_eq!(ix.accounts.len(), 14);
        // mint and user both sign create
        assert!(ix.accounts[0].is_signer && ix.accounts[7].is_signer);
    }

    #[test]
    fn pdas_are_stable_per_mint() {
        let mint = Pubkey::new_unique();
        assert_eq!(curve_pda(&mint), curve_pda(&mint));
        assert_ne!(curve_pda(&mint), curve_pda(&Pubkey::new_unique()));
    }
}
