//! Input validation performed before any network call

use crate::error::{BridgeError, BridgeResult};

use ethers::types::{Address, H256, U256};
use sha3::{Digest, Keccak256};

/// Parse a `0x`-prefixed hex address.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lower and
/// all-upper input is accepted as is.
pub fn parse_address(input: &str) -> BridgeResult<Address> {
    let hex_part = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| BridgeError::InvalidAddress(format!("{} is missing 0x prefix", input)))?;

    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BridgeError::InvalidAddress(format!(
            "{} is not a 20-byte hex address",
            input
        )));
    }

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper && checksum(hex_part) != hex_part {
        return Err(BridgeError::InvalidAddress(format!(
            "{} has an invalid checksum",
            input
        )));
    }

    let bytes = hex::decode(hex_part.to_lowercase())
        .map_err(|e| BridgeError::InvalidAddress(format!("{}: {}", input, e)))?;
    Ok(Address::from_slice(&bytes))
}

/// Parse a `0x`-prefixed 32-byte bridge transaction id
pub fn parse_transaction_id(input: &str) -> BridgeResult<H256> {
    let hex_part = input
        .strip_prefix("0x")
        .ok_or_else(|| BridgeError::InvalidTransactionId(format!("{} is missing 0x prefix", input)))?;

    let bytes = hex::decode(hex_part)
        .map_err(|e| BridgeError::InvalidTransactionId(format!("{}: {}", input, e)))?;
    if bytes.len() != 32 {
        return Err(BridgeError::InvalidTransactionId(format!(
            "{} is not 32 bytes",
            input
        )));
    }
    Ok(H256::from_slice(&bytes))
}

/// EIP-55 mixed-case rendering of a 40-char hex address body
fn checksum(hex_part: &str) -> String {
    let lower = hex_part.to_lowercase();
    let hash = Keccak256::digest(lower.as_bytes());

    lower
        .chars()
        .enumerate()
        .map(|(i, c)| {
            let nibble = (hash[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
            if c.is_ascii_alphabetic() && nibble >= 8 {
                c.to_ascii_uppercase()
            } else {
                c
            }
        })
        .collect()
}

/// Syntactic check of a human-readable decimal amount, e.g. `"10"` or `"0.5"`.
pub fn check_amount_syntax(input: &str) -> BridgeResult<()> {
    let trimmed = input.trim();
    let (whole, frac) = match trimmed.split_once('.') {
        Some((w, f)) => (w, f),
        None => (trimmed, ""),
    };

    let digits_ok = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !digits_ok(whole) || !digits_ok(frac) {
        return Err(BridgeError::InvalidAmount(format!(
            "{} is not a decimal amount",
            input
        )));
    }

    if whole.chars().chain(frac.chars()).all(|c| c == '0') {
        return Err(BridgeError::InvalidAmount("amount must be greater than zero".into()));
    }

    Ok(())
}

/// Convert a decimal amount into the token's smallest unit
pub fn to_base_units(input: &str, decimals: u8) -> BridgeResult<U256> {
    check_amount_syntax(input)?;

    let trimmed = input.trim();
    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let frac = frac.trim_end_matches('0');

    if frac.len() > decimals as usize {
        return Err(BridgeError::InvalidAmount(format!(
            "{} has more than {} decimal places",
            input, decimals
        )));
    }

    let padded = format!("{}{:0<width$}", whole, frac, width = decimals as usize);
    let digits = padded.trim_start_matches('0');
    if digits.is_empty() {
        return Err(BridgeError::InvalidAmount("amount must be greater than zero".into()));
    }

    U256::from_dec_str(digits).map_err(|e| BridgeError::InvalidAmount(format!("{}: {}", input, e)))
}
