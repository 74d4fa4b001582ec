//! Amount conversion and formatting
//!
//! Conversions between human-readable decimal amounts and integer base units are
//! exact: a fractional remainder below the smallest unit is rejected, never
//! rounded away.

use crate::error::BridgeError;

/// USDC and USDCx both use 6 decimals
pub const USDC_DECIMALS: u8 = 6;

/// Parse a decimal string (e.g. `"10.5"`) into base units
pub fn parse_units(amount: &str, decimals: u8) -> Result<u128, BridgeError> {
    let amount = amount.trim();

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(BridgeError::invalid_request(format!(
            "Invalid amount: {:?}",
            amount
        )));
    }

    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(BridgeError::invalid_request(format!(
            "Invalid amount: {:?}",
            amount
        )));
    }

    let decimals = decimals as usize;
    let (significant, remainder) = if fraction.len() > decimals {
        fraction.split_at(decimals)
    } else {
        (fraction, "")
    };

    if remainder.chars().any(|c| c != '0') {
        return Err(BridgeError::invalid_request(format!(
            "Amount {} has more than {} decimal places",
            amount, decimals
        )));
    }

    let overflow = || BridgeError::invalid_request(format!("Amount {} is too large", amount));

    let mut raw: u128 = 0;
    let padded = format!("{:0<width$}", significant, width = decimals);
    for digit in whole.chars().chain(padded.chars()) {
        let value = digit.to_digit(10).unwrap_or(0) as u128;
        raw = raw
            .checked_mul(10)
            .and_then(|r| r.checked_add(value))
            .ok_or_else(overflow)?;
    }

    Ok(raw)
}

/// Convert a human-readable `f64` amount into base units
///
/// Uses the shortest decimal representation of the float, so `10.1` converts to
/// exactly `10_100_000` at 6 decimals.
pub fn to_base_units(amount: f64, decimals: u8) -> Result<u128, BridgeError> {
    if !amount.is_finite() {
        return Err(BridgeError::invalid_request(
            "Amount must be a finite number",
        ));
    }
    if amount < 0.0 {
        return Err(BridgeError::invalid_request("Amount must not be negative"));
    }

    parse_units(&format!("{}", amount), decimals)
}

/// Format base units as a full-precision decimal string (e.g. `"10.000000"`)
pub fn format_units(raw: u128, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let divisor = 10u128.pow(decimals as u32);
    format!(
        "{}.{:0width$}",
        raw / divisor,
        raw % divisor,
        width = decimals as usize
    )
}

/// Format USDCx base units for display, rounded to cents (e.g. `"100.50 USDCx"`)
pub fn format_amount(raw: u128) -> String {
    let scale = 10u128.pow(USDC_DECIMALS as u32 - 2);
    let cents = raw / scale + u128::from(raw % scale >= scale / 2);
    format!("{}.{:02} USDCx", cents / 100, cents % 100)
}
