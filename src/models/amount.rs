use alloy::primitives::U256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("amount is not a decimal number: {0:?}")]
    Malformed(String),

    #[error("amount {amount:?} has more than {decimals} fractional digits")]
    TooPrecise { amount: String, decimals: u8 },

    #[error("amount {0:?} does not fit in 256 bits")]
    Overflow(String),
}

/// Parse a human-entered decimal amount into token base units.
///
/// Returns `Ok(None)` for an empty (or whitespace-only) input. Inputs with
/// more fractional digits than `decimals` are rejected rather than rounded.
pub fn parse_units(input: &str, decimals: u8) -> Result<Option<U256>, AmountError> {
    let amount = input.trim();
    if amount.is_empty() {
        return Ok(None);
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((w, f)) => (w, f),
        None => (amount, ""),
    };

    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !digits_only(whole) || !digits_only(fraction) {
        return Err(AmountError::Malformed(amount.to_string()));
    }

    // Trailing zeros past the token precision carry no value.
    let fraction = fraction.trim_end_matches('0');
    if fraction.len() > decimals as usize {
        return Err(AmountError::TooPrecise {
            amount: amount.to_string(),
            decimals,
        });
    }

    let mut base_units = String::with_capacity(whole.len() + decimals as usize);
    base_units.push_str(whole);
    base_units.push_str(fraction);
    for _ in fraction.len()..decimals as usize {
        base_units.push('0');
    }

    let trimmed = base_units.trim_start_matches('0');
    if trimmed.is_empty() {
        return Ok(Some(U256::ZERO));
    }

    U256::from_str_radix(trimmed, 10)
        .map(Some)
        .map_err(|_| AmountError::Overflow(amount.to_string()))
}

/// Render base units as a decimal string without trailing zeros,
/// e.g. `95 * 10^18` with 18 decimals becomes `"95"`.
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}
