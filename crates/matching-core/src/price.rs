//! Monetary value with total ordering and exact integer arithmetic.
//!
//! Prices are held internally as a nonnegative integer number of cents.
//! They are never constructed directly from a float; the boundary between
//! wire decimals and this type goes through [`Price::from_decimal_str`],
//! which documents its rounding mode.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MatchingError, Result};

/// An exact price in minor units (cents). Total-ordered, always nonnegative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(u64);

impl Price {
    /// Construct a price directly from a cents value.
    pub fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    pub fn cents(&self) -> u64 {
        self.0
    }

    /// Parse a decimal string with at most two fractional digits
    /// (e.g. `"150.00"`, `"150"`, `"150.5"`) into exact cents.
    ///
    /// Rounding mode: the string must carry no more than two fractional
    /// digits; a third or later digit is a validation error rather than
    /// silently rounded, since silent rounding at the money boundary is
    /// exactly the class of bug this type exists to prevent.
    pub fn from_decimal_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(MatchingError::invalid_input("empty price"));
        }

        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if frac.len() > 2 {
            return Err(MatchingError::invalid_input(format!(
                "price '{s}' has more than two fractional digits"
            )));
        }
        if !frac.chars().all(|c| c.is_ascii_digit())
            || !whole.chars().all(|c| c.is_ascii_digit())
            || whole.is_empty()
        {
            return Err(MatchingError::invalid_input(format!(
                "price '{s}' is not a valid nonnegative decimal"
            )));
        }

        let whole: u64 = whole
            .parse()
            .map_err(|_| MatchingError::invalid_input(format!("price '{s}' out of range")))?;
        let frac_cents: u64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<u64>().unwrap_or(0) * 10,
            _ => frac.parse().unwrap_or(0),
        };

        Ok(Self(whole * 100 + frac_cents))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional_forms() {
        assert_eq!(Price::from_decimal_str("150").unwrap().cents(), 15000);
        assert_eq!(Price::from_decimal_str("150.00").unwrap().cents(), 15000);
        assert_eq!(Price::from_decimal_str("150.5").unwrap().cents(), 15050);
        assert_eq!(Price::from_decimal_str("0.01").unwrap().cents(), 1);
    }

    #[test]
    fn rejects_excess_precision_and_garbage() {
        assert!(Price::from_decimal_str("150.001").is_err());
        assert!(Price::from_decimal_str("abc").is_err());
        assert!(Price::from_decimal_str("").is_err());
        assert!(Price::from_decimal_str("-1.00").is_err());
    }

    #[test]
    fn total_ordering_matches_cents() {
        let a = Price::from_cents(100);
        let b = Price::from_cents(200);
        assert!(a < b);
        assert_eq!(a, Price::from_cents(100));
    }

    #[test]
    fn display_renders_two_fractional_digits() {
        assert_eq!(Price::from_cents(15000).to_string(), "150.00");
        assert_eq!(Price::from_cents(1).to_string(), "0.01");
    }
}
