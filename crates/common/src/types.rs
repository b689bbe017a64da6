//! Common types used across the exchange crates.
//!
//! This module provides the validated identifiers and the buy/sell tag
//! shared by every crate that sits at or above the matching core.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;

fn instrument_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9.]{1,5}$").expect("static pattern"))
}

fn user_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_]{3,20}$").expect("static pattern"))
}

/// A validated instrument identifier: `[a-zA-Z0-9.]{1,5}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Validate and wrap a raw instrument string.
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        if !instrument_pattern().is_match(&raw) {
            return Err(Error::invalid_input(format!(
                "instrument id '{raw}' does not match [a-zA-Z0-9.]{{1,5}}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated trader identifier: `[a-zA-Z0-9_]{3,20}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a raw user string.
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        if !user_pattern().is_match(&raw) {
            return Err(Error::invalid_input(format!(
                "user id '{raw}' does not match [a-zA-Z0-9_]{{3,20}}"
            )));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which side of the book a tradable rests on.
///
/// For `BUY`, "best price" means highest; for `SELL`, lowest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    pub fn is_sell(&self) -> bool {
        matches!(self, Side::Sell)
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instrument_id_accepts_valid_forms() {
        assert!(InstrumentId::new("AAPL").is_ok());
        assert!(InstrumentId::new("A").is_ok());
        assert!(InstrumentId::new("BRK.A").is_ok());
    }

    #[test]
    fn instrument_id_rejects_invalid_forms() {
        assert!(InstrumentId::new("").is_err());
        assert!(InstrumentId::new("TOOLONG1").is_err());
        assert!(InstrumentId::new("AA PL").is_err());
    }

    #[test]
    fn user_id_enforces_length_and_charset() {
        assert!(UserId::new("bob").is_ok());
        assert!(UserId::new("ab").is_err());
        assert!(UserId::new("a".repeat(21)).is_err());
        assert!(UserId::new("bad-id").is_err());
    }

    #[test]
    fn side_opposite_round_trips() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
        assert!(Side::Buy.is_buy());
        assert!(Side::Sell.is_sell());
    }
}
