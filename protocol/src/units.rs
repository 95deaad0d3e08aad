//! # Native Asset Units
//!
//! All amounts are held in wei, the smallest indivisible unit of the
//! native asset. `u128` comfortably fits any realistic supply (it tops out
//! around 3.4 * 10^20 ether) while keeping arithmetic native and checked.
//!
//! Humans prefer ether. [`parse_amount`] turns `"0.05 ether"` into wei and
//! [`format_ether`] goes the other way. Neither ever rounds: an amount with
//! more fractional digits than the unit supports is an error, not a guess.

use thiserror::Error;

/// An amount of the native asset, in wei.
pub type Wei = u128;

/// Wei in one gwei.
pub const WEI_PER_GWEI: Wei = 1_000_000_000;

/// Wei in one ether.
pub const WEI_PER_ETHER: Wei = 1_000_000_000_000_000_000;

/// Decimal places of one ether.
pub const ETHER_DECIMALS: u32 = 18;

/// Errors from parsing a human-readable amount.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    /// Nothing to parse.
    #[error("empty amount")]
    Empty,

    /// The unit suffix is not one of `wei`, `gwei`, `ether`.
    #[error("unknown unit '{0}' (expected wei, gwei or ether)")]
    UnknownUnit(String),

    /// The numeric part is malformed.
    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    /// More fractional digits than the unit can represent in wei.
    #[error("too many decimal places for {unit}: at most {max}")]
    TooPrecise {
        /// The unit that was used.
        unit: &'static str,
        /// Maximum fractional digits for that unit.
        max: u32,
    },

    /// The value does not fit in a `u128` of wei.
    #[error("amount overflows u128 wei")]
    Overflow,
}

/// Parse an amount such as `"1000"`, `"250 gwei"`, `"0.05ether"` into wei.
///
/// A bare number is taken as wei. Unit names are case-insensitive and may be
/// separated from the number by whitespace.
pub fn parse_amount(input: &str) -> Result<Wei, UnitsError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(UnitsError::Empty);
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let unit = unit.trim().to_ascii_lowercase();

    let (unit_name, decimals) = match unit.as_str() {
        "" | "wei" => ("wei", 0),
        "gwei" => ("gwei", 9),
        "ether" | "eth" => ("ether", ETHER_DECIMALS),
        _ => return Err(UnitsError::UnknownUnit(unit)),
    };

    let (whole, fraction) = match number.split_once('.') {
        Some((w, f)) => (w, f),
        None => (number, ""),
    };

    let all_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !all_digits(whole) || !all_digits(fraction) {
        return Err(UnitsError::InvalidNumber(number.to_string()));
    }

    if fraction.len() as u32 > decimals {
        return Err(UnitsError::TooPrecise {
            unit: unit_name,
            max: decimals,
        });
    }

    let scale = 10u128.pow(decimals);
    let whole_wei = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u128>()
            .map_err(|_| UnitsError::Overflow)?
            .checked_mul(scale)
            .ok_or(UnitsError::Overflow)?
    };

    let fraction_wei = if fraction.is_empty() {
        0
    } else {
        // "05" in ether is 5 * 10^16.
        let padding = 10u128.pow(decimals - fraction.len() as u32);
        fraction
            .parse::<u128>()
            .map_err(|_| UnitsError::InvalidNumber(number.to_string()))?
            * padding
    };

    whole_wei
        .checked_add(fraction_wei)
        .ok_or(UnitsError::Overflow)
}

/// Render wei as a decimal ether string without trailing zeros.
///
/// `format_ether(50_000_000_000_000_000)` is `"0.05"`; whole amounts have no
/// decimal point.
pub fn format_ether(amount: Wei) -> String {
    let whole = amount / WEI_PER_ETHER;
    let fraction = amount % WEI_PER_ETHER;
    if fraction == 0 {
        return whole.to_string();
    }
    let digits = format!("{:018}", fraction);
    format!("{}.{}", whole, digits.trim_end_matches('0'))
}

/// Serde adapter that writes wei as a decimal string.
///
/// JSON numbers lose precision past 2^53 in most clients and `serde_json`
/// refuses `u128` values above `u64::MAX` in a `Value`, so amounts cross the
/// wire as strings. Deserialization also accepts plain JSON integers and any
/// string [`parse_amount`] understands, e.g. `"0.05 ether"`.
pub mod wei_string {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    use super::{parse_amount, Wei};

    pub fn serialize<S: Serializer>(amount: &Wei, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Wei, D::Error> {
        struct WeiVisitor;

        impl<'de> Visitor<'de> for WeiVisitor {
            type Value = Wei;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an amount in wei as integer or string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Wei, E> {
                Ok(v as Wei)
            }

            fn visit_u128<E: de::Error>(self, v: u128) -> Result<Wei, E> {
                Ok(v)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Wei, E> {
                u128::try_from(v).map_err(|_| E::custom("amount must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Wei, E> {
                parse_amount(v).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(WeiVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_numbers_are_wei() {
        assert_eq!(parse_amount("1000").unwrap(), 1000);
        assert_eq!(parse_amount(" 7 wei ").unwrap(), 7);
    }

    #[test]
    fn ether_fractions() {
        assert_eq!(parse_amount("1 ether").unwrap(), WEI_PER_ETHER);
        assert_eq!(parse_amount("0.05ether").unwrap(), WEI_PER_ETHER / 20);
        assert_eq!(parse_amount(".5 ETH").unwrap(), WEI_PER_ETHER / 2);
        assert_eq!(parse_amount("2.000000000000000001 ether").unwrap(), 2 * WEI_PER_ETHER + 1);
    }

    #[test]
    fn gwei_amounts() {
        assert_eq!(parse_amount("3 gwei").unwrap(), 3 * WEI_PER_GWEI);
        assert_eq!(parse_amount("1.5 gwei").unwrap(), 1_500_000_000);
    }

    #[test]
    fn rejects_excess_precision() {
        assert_eq!(
            parse_amount("1.5 wei").unwrap_err(),
            UnitsError::TooPrecise { unit: "wei", max: 0 }
        );
        assert!(matches!(
            parse_amount("0.0000000000000000001 ether"),
            Err(UnitsError::TooPrecise { max: 18, .. })
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_amount("").unwrap_err(), UnitsError::Empty);
        assert!(matches!(parse_amount("12 dollars"), Err(UnitsError::UnknownUnit(_))));
        assert!(matches!(parse_amount("1.2.3"), Err(UnitsError::InvalidNumber(_))));
        assert!(matches!(parse_amount(". ether"), Err(UnitsError::InvalidNumber(_))));
    }

    #[test]
    fn rejects_overflow() {
        let too_big = format!("{} ether", u128::MAX);
        assert_eq!(parse_amount(&too_big).unwrap_err(), UnitsError::Overflow);
    }

    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct Carrier {
        #[serde(with = "wei_string")]
        amount: Wei,
    }

    #[test]
    fn wei_string_round_trips_large_values() {
        let big = Carrier { amount: u128::MAX };
        let json = serde_json::to_string(&big).unwrap();
        assert_eq!(json, format!("{{\"amount\":\"{}\"}}", u128::MAX));
        assert_eq!(serde_json::from_str::<Carrier>(&json).unwrap(), big);
    }

    #[test]
    fn wei_string_accepts_numbers_and_units() {
        let c: Carrier = serde_json::from_str(r#"{"amount": 12}"#).unwrap();
        assert_eq!(c.amount, 12);
        let c: Carrier = serde_json::from_str(r#"{"amount": "0.05 ether"}"#).unwrap();
        assert_eq!(c.amount, WEI_PER_ETHER / 20);
        assert!(serde_json::from_str::<Carrier>(r#"{"amount": -1}"#).is_err());
    }

    #[test]
    fn formats_ether() {
        assert_eq!(format_ether(0), "0");
        assert_eq!(format_ether(WEI_PER_ETHER), "1");
        assert_eq!(format_ether(WEI_PER_ETHER / 20), "0.05");
        assert_eq!(format_ether(WEI_PER_ETHER + 1), "1.000000000000000001");
    }
}
