use alloy::primitives::{Address, U256};
use rust_decimal::{Decimal, RoundingStrategy};
use std::str::FromStr;

use crate::error::{AppError, AppResult, ChainError};

/// Decimal token amount to smallest-unit integer.
///
/// Digits beyond `decimals` are truncated (rounded toward zero), never rounded up,
/// so the result never exceeds what the caller asked for.
pub fn to_base_units(amount: Decimal, decimals: u32) -> AppResult<U256> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AppError::InvalidInput(format!(
            "Amount must not be negative: {}",
            amount
        )));
    }

    let truncated = amount.round_dp_with_strategy(decimals, RoundingStrategy::ToZero);
    let mantissa = u128::try_from(truncated.mantissa())
        .map_err(|_| AppError::InvalidInput(format!("Amount out of range: {}", amount)))?;
    let exponent = decimals.saturating_sub(truncated.scale());

    Ok(U256::from(mantissa) * U256::from(10u64).pow(U256::from(exponent)))
}

/// Smallest-unit integer back to a decimal token amount
pub fn from_base_units(value: U256, decimals: u32) -> AppResult<Decimal> {
    let raw = i128::try_from(value).map_err(|_| {
        AppError::Chain(ChainError::UpstreamRpc(format!(
            "Balance {} does not fit a decimal",
            value
        )))
    })?;

    Decimal::try_from_i128_with_scale(raw, decimals).map_err(|_| {
        AppError::Chain(ChainError::UpstreamRpc(format!(
            "Balance {} does not fit a decimal",
            value
        )))
    })
}

/// Validate a user-supplied destination address.
///
/// Requires `0x` plus 40 hex digits. All-lowercase and all-uppercase forms are
/// accepted as-is; mixed case must carry a valid EIP-55 checksum.
pub fn parse_address(input: &str) -> Result<Address, ChainError> {
    let trimmed = input.trim();
    let invalid = || ChainError::InvalidAddress(trimmed.to_string());

    let hex_part = trimmed.strip_prefix("0x").ok_or_else(invalid)?;
    if hex_part.len() != 40 || !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());

    if has_lower && has_upper {
        Address::parse_checksummed(trimmed, None).map_err(|_| invalid())
    } else {
        Address::from_str(trimmed).map_err(|_| invalid())
    }
}
