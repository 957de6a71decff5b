/// Economics module: coin units, formatting and parsing of amounts
use crate::error::LedgerError;
use num_bigint::BigUint;

pub const COIN_DECIMALS: u32 = 18;
pub const COIN_SYMBOL: &str = "MONO";

/// Genesis grant per seeded account, in whole coins (plus the account index in base units).
pub const GENESIS_GRANT_COINS: u64 = 10_000;

/// One whole coin expressed in base units.
pub fn one_coin() -> BigUint {
    BigUint::from(10u32).pow(COIN_DECIMALS)
}

pub fn coins(amount: u64) -> BigUint {
    one_coin() * BigUint::from(amount)
}

/// Formats base units as `<whole>[.<fraction>] MONO`, trimming trailing zeros.
pub fn format_amount(value: &BigUint) -> String {
    let unit = one_coin();
    let whole = value / &unit;
    let fraction = value % &unit;

    if fraction == BigUint::default() {
        return format!("{} {}", whole, COIN_SYMBOL);
    }

    let digits = format!("{:0>width$}", fraction.to_string(), width = COIN_DECIMALS as usize);
    format!("{}.{} {}", whole, digits.trim_end_matches('0'), COIN_SYMBOL)
}

/// Parses a decimal coin amount (e.g. `12.5`) into base units.
pub fn parse_amount(input: &str) -> Result<BigUint, LedgerError> {
    let input = input.trim();
    let invalid = || LedgerError::InvalidArgument(format!("Invalid amount: {:?}", input));

    let (whole, fraction) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if fraction.len() > COIN_DECIMALS as usize {
        return Err(LedgerError::InvalidArgument(format!(
            "Amount has more than {} decimals",
            COIN_DECIMALS
        )));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole_units = if whole.is_empty() {
        BigUint::default()
    } else {
        whole.parse::<BigUint>().map_err(|_| invalid())?
    };
    let padded = format!("{:0<width$}", fraction, width = COIN_DECIMALS as usize);
    let fraction_units = padded.parse::<BigUint>().map_err(|_| invalid())?;

    Ok(whole_units * one_coin() + fraction_units)
}

/// Genesis grant for the seeded account at `index`.
pub fn genesis_grant(index: u32) -> BigUint {
    coins(GENESIS_GRANT_COINS) + BigUint::from(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_whole_and_fractional() {
        assert_eq!(format_amount(&coins(40)), "40 MONO");
        assert_eq!(format_amount(&BigUint::default()), "0 MONO");
        assert_eq!(
            format_amount(&genesis_grant(4)),
            "10000.000000000000000004 MONO"
        );
        assert_eq!(format_amount(&(one_coin() / 2u32)), "0.5 MONO");
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("12").unwrap(), coins(12));
        assert_eq!(parse_amount("0.5").unwrap(), one_coin() / 2u32);
        assert_eq!(parse_amount("1.000000000000000001").unwrap(), one_coin() + 1u32);
        assert!(parse_amount("").is_err());
        assert!(parse_amount("1.2.3").is_err());
        assert!(parse_amount("-4").is_err());
        assert!(parse_amount("0.0000000000000000001").is_err());
    }
}
