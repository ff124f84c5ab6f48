//! Private-key and batch-input parsing.
//!
//! Keys arrive in one of two shapes: a JSON number array (64-byte secret or
//! 32-byte seed) as exported by most wallets, or a base58 string decoding to
//! 32 or 64 bytes. Anything else is an [`KeyError::InvalidKeyFormat`] that
//! names the accepted forms. Batch input (`privateKey,amount` per line) fails
//! with the 1-based line number so a bad line in a 40-wallet paste is
//! locatable.
//!
//! Parsed keypairs live for the duration of one flow and are dropped with it.

use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::keypair::keypair_from_seed,
};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error(
        "invalid {context} private key: {reason}. Supported forms: base58 string \
         (32 or 64 bytes decoded) or JSON array of 32 or 64 numbers"
    )]
    InvalidKeyFormat { context: String, reason: String },
    #[error("invalid address {input:?}: expected a base58-encoded 32-byte public key")]
    InvalidAddressFormat { input: String },
    #[error("line {line}: {reason}")]
    BadBatchLine { line: usize, reason: String },
}

/// A wallet line from batch input: the signing key plus its lamport amount.
#[derive(Debug)]
pub struct WalletEntry {
    pub keypair: Keypair,
    pub lamports: u64,
}

fn invalid(context: &str, reason: impl Into<String>) -> KeyError {
    KeyError::InvalidKeyFormat {
        context: context.to_string(),
        reason: reason.into(),
    }
}

fn keypair_from_bytes(bytes: &[u8], context: &str) -> Result<Keypair, KeyError> {
    match bytes.len() {
        64 => Keypair::from_bytes(bytes)
            .map_err(|e| invalid(context, format!("rejected 64-byte secret: {e}"))),
        32 => keypair_from_seed(bytes)
            .map_err(|e| invalid(context, format!("rejected 32-byte seed: {e}"))),
        n => Err(invalid(
            context,
            format!("decoded length {n} is invalid, expected 32 or 64 bytes"),
        )),
    }
}

/// Parse a private key in either accepted form into a signing keypair.
/// `context` names the wallet in error messages ("dev wallet", "buyer 3", ..).
pub fn parse_private_key(input: &str, context: &str) -> Result<Keypair, KeyError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid(context, "private key cannot be empty"));
    }

    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        let array: Vec<u8> = serde_json::from_str(trimmed)
            .map_err(|e| invalid(context, format!("invalid JSON array: {e}")))?;
        return keypair_from_bytes(&array, context);
    }

    let decoded = bs58::decode(trimmed)
        .into_vec()
        .map_err(|e| invalid(context, format!("invalid base58: {e}")))?;
    keypair_from_bytes(&decoded, context)
}

/// Parse a base58 public key.
pub fn parse_address(input: &str) -> Result<Pubkey, KeyError> {
    Pubkey::from_str(input.trim()).map_err(|_| KeyError::InvalidAddressFormat {
        input: input.trim().to_string(),
    })
}

/// Parse batch wallet input: one `privateKey,amountSol` per line.
/// Blank lines and `#` comments are skipped; errors carry the line number.
/// Amounts convert to lamports here so no monetary math downstream sees a
/// float.
pub fn parse_wallet_lines(input: &str) -> Result<Vec<WalletEntry>, KeyError> {
    let mut entries = Vec::new();
    for (idx, raw) in input.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut parts = line.split(',').map(str::trim);
        let (key_str, amount_str) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(a), None) => (k, a),
            _ => {
                return Err(KeyError::BadBatchLine {
                    line: line_no,
                    reason: format!("expected `privateKey,amount`, got {line:?}"),
                })
            }
        };
        if key_str.is_empty() {
            return Err(KeyError::BadBatchLine {
                line: line_no,
                reason: "empty private key".to_string(),
            });
        }

        let sol: f64 = amount_str.parse().map_err(|_| KeyError::BadBatchLine {
            line: line_no,
            reason: format!("invalid amount {amount_str:?}"),
        })?;
        if !sol.is_finite() || sol <= 0.0 {
            return Err(KeyError::BadBatchLine {
                line: line_no,
                reason: format!("amount must be a positive number, got {amount_str:?}"),
            });
        }

        let keypair = parse_private_key(key_str, &format!("wallet on line {line_no}"))
            .map_err(|e| KeyError::BadBatchLine {
                line: line_no,
                reason: e.to_string(),
            })?;
        entries.push(WalletEntry {
            keypair,
            lamports: (sol * 1_000_000_000.0).floor() as u64,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signer::Signer;

    #[test]
    fn parses_base58_secret() {
        let kp = Keypair::new();
        let encoded = bs58::encode(kp.to_bytes()).into_string();
        let parsed = parse_private_key(&encoded, "test").unwrap();
        assert_eq!(parsed.pubkey(), kp.pubkey());
    }

    #[test]
    fn parses_json_array_secret() {
        let kp = Keypair::new();
        let json = serde_json::to_string(&kp.to_bytes().to_vec()).unwrap();
        let parsed = parse_private_key(&json, "test").unwrap();
        assert_eq!(parsed.pubkey(), kp.pubkey());
    }

    #[test]
    fn parses_32_byte_seed() {
        let seed = [7u8; 32];
        let expected = keypair_from_seed(&seed).unwrap();
        let encoded = bs58::encode(seed).into_string();
        let parsed = parse_private_key(&encoded, "test").unwrap();
        assert_eq!(parsed.pubkey(), expected.pubkey());
    }

    #[test]
    fn rejects_wrong_length() {
        let err = parse_private_key(&bs58::encode([1u8; 16]).into_string(), "test").unwrap_err();
        assert!(err.to_string().contains("expected 32 or 64"));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_private_key("not-base58-0OIl", "test").is_err());
        assert!(parse_private_key("", "test").is_err());
        assert!(parse_private_key("[1,2,\"x\"]", "test").is_err());
    }

    #[test]
    fn batch_lines_skip_comments_and_blanks() {
        let kp = Keypair::new();
        let encoded = bs58::encode(kp.to_bytes()).into_string();
        let input = format!("# buyers\n\n{encoded},0.5\n");
        let entries = parse_wallet_lines(&input).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].lamports, 500_000_000);
    }

    #[test]
    fn batch_errors_carry_line_numbers() {
        let kp = Keypair::new();
        let encoded = bs58::encode(kp.to_bytes()).into_string();
        let input = format!("{encoded},0.5\nbadkey,1.0\n");
        let err = parse_wallet_lines(&input).unwrap_err();
        assert!(err.to_string().starts_with("line 2"), "{err}");

        let input = format!("{encoded},zero\n");
        let err = parse_wallet_lines(&input).unwrap_err();
        assert!(err.to_string().contains("line 1"), "{err}");

        let input = format!("{encoded},-1\n");
        assert!(parse_wallet_lines(&input).is_err());
    }

    #[test]
    fn address_parsing() {
        let pk = Pubkey::new_unique();
        assert_eq!(parse_address(&pk.to_string()).unwrap(), pk);
        assert!(matches!(
            parse_address("tooshort"),
            Err(KeyError::InvalidAddressFormat { .. })
        ));
    }
}
