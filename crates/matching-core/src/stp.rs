//! Self-trade prevention: deciding what happens when an incoming tradable
//! would otherwise cross against a resting tradable from the same trader.
//!
//! A small `enum` over a closed set of wire-visible modes, combined with a
//! trait seam so the notion of "same trader" can be swapped without
//! touching `ProductBook`.

use common::UserId;
use serde::{Deserialize, Serialize};

/// What to do when the incoming tradable and the resting tradable at the
/// front of a crossing price level belong to the same trader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelfTradePreventionMode {
    /// Trade anyway; self-trades are permitted.
    Allow,
    /// Cancel the incoming tradable's remaining volume, leave the resting
    /// tradable untouched, and stop trying to match the incoming tradable
    /// further.
    CancelIncoming,
    /// Cancel the resting tradable and continue matching the incoming
    /// tradable against the next level/order. This is the default: it
    /// favors the tradable that was already resting being removed over
    /// silently blocking new liquidity.
    #[default]
    CancelResting,
    /// Cancel both the incoming and the resting tradable.
    CancelBoth,
}

/// Outcome of applying a self-trade prevention mode to one crossing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StpDecision {
    /// No self-trade; proceed with the trade normally.
    NoConflict,
    /// Cancel the incoming tradable and stop matching it further.
    CancelIncoming,
    /// Cancel the resting tradable, then keep trying to match the
    /// incoming tradable against what is now the front of the book.
    CancelResting,
    /// Cancel both sides.
    CancelBoth,
}

/// The `stp.mode` config string didn't parse to a known mode.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown self-trade prevention mode: {0}")]
pub struct ParseStpModeError(String);

impl std::str::FromStr for SelfTradePreventionMode {
    type Err = ParseStpModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ALLOW" => Ok(Self::Allow),
            "CANCEL_INCOMING" => Ok(Self::CancelIncoming),
            "CANCEL_RESTING" => Ok(Self::CancelResting),
            "CANCEL_BOTH" => Ok(Self::CancelBoth),
            other => Err(ParseStpModeError(other.to_string())),
        }
    }
}

impl SelfTradePreventionMode {
    /// Decide what to do given whether the incoming and resting tradables
    /// share a trader.
    pub fn decide(&self, same_trader: bool) -> StpDecision {
        if !same_trader {
            return StpDecision::NoConflict;
        }
        match self {
            SelfTradePreventionMode::Allow => StpDecision::NoConflict,
            SelfTradePreventionMode::CancelIncoming => StpDecision::CancelIncoming,
            SelfTradePreventionMode::CancelResting => StpDecision::CancelResting,
            SelfTradePreventionMode::CancelBoth => StpDecision::CancelBoth,
        }
    }
}

/// Resolves the trader identity behind a tradable. Defaults to comparing
/// `UserId`s directly; kept as a trait so venues that need to treat linked
/// accounts (e.g. a desk and its sub-accounts) as one trader for STP
/// purposes can supply their own mapping without changing `ProductBook`.
pub trait TraderIdExtractor: Send + Sync {
    fn trader_of(&self, user: &UserId) -> UserId;

    fn same_trader(&self, a: &UserId, b: &UserId) -> bool {
        self.trader_of(a) == self.trader_of(b)
    }
}

/// The default extractor: a trader is exactly one `UserId`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityTraderIdExtractor;

impl TraderIdExtractor for IdentityTraderIdExtractor {
    fn trader_of(&self, user: &UserId) -> UserId {
        user.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_never_conflicts() {
        assert_eq!(
            SelfTradePreventionMode::Allow.decide(true),
            StpDecision::NoConflict
        );
    }

    #[test]
    fn default_mode_is_cancel_resting() {
        assert_eq!(
            SelfTradePreventionMode::default(),
            SelfTradePreventionMode::CancelResting
        );
    }

    #[test]
    fn non_conflicting_traders_never_trigger_stp() {
        for mode in [
            SelfTradePreventionMode::Allow,
            SelfTradePreventionMode::CancelIncoming,
            SelfTradePreventionMode::CancelResting,
            SelfTradePreventionMode::CancelBoth,
        ] {
            assert_eq!(mode.decide(false), StpDecision::NoConflict);
        }
    }

    #[test]
    fn identity_extractor_compares_user_ids() {
        let extractor = IdentityTraderIdExtractor;
        let alice = UserId::new("alice").unwrap();
        let alice2 = UserId::new("alice").unwrap();
        let bob = UserId::new("bob").unwrap();
        assert!(extractor.same_trader(&alice, &alice2));
        assert!(!extractor.same_trader(&alice, &bob));
    }

    #[test]
    fn parses_config_strings() {
        use std::str::FromStr;
        assert_eq!(SelfTradePreventionMode::from_str("ALLOW").unwrap(), SelfTradePreventionMode::Allow);
        assert_eq!(
            SelfTradePreventionMode::from_str("CANCEL_INCOMING").unwrap(),
            SelfTradePreventionMode::CancelIncoming
        );
        assert_eq!(
            SelfTradePreventionMode::from_str("CANCEL_RESTING").unwrap(),
            SelfTradePreventionMode::CancelResting
        );
        assert_eq!(
            SelfTradePreventionMode::from_str("CANCEL_BOTH").unwrap(),
            SelfTradePreventionMode::CancelBoth
        );
        assert!(SelfTradePreventionMode::from_str("BOGUS").is_err());
    }
}
