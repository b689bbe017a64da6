//! Outcome types returned by `ProductBook` and the admission coordinator.
//!
//! Named constructors over a small struct rather than a bare tuple, so call
//! sites read `AdmissionOutcome::rejected_fok(..)` instead of guessing what
//! a positional field means.

use crate::audit::AuditEvent;
use crate::domain::Tradable;
use crate::price::Price;

/// One trade produced while admitting a tradable, reported back to the
/// caller alongside the final state of what was admitted.
#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub buy_id: String,
    pub sell_id: String,
    pub price: Price,
    pub quantity: u32,
}

/// Result of `ProductBook::add`. `tradable` is the final snapshot of the
/// admitted order: still resting, partially or fully filled, cancelled by
/// STP/OCO, or rejected, depending on how admission played out.
#[derive(Debug, Clone)]
pub struct AdmissionOutcome {
    pub tradable: Tradable,
    pub trades: Vec<TradeRecord>,
    pub audit_events: Vec<AuditEvent>,
}

impl AdmissionOutcome {
    pub fn new(tradable: Tradable, trades: Vec<TradeRecord>, audit_events: Vec<AuditEvent>) -> Self {
        Self {
            tradable,
            trades,
            audit_events,
        }
    }

    /// No trades occurred and the tradable still rests on the book
    /// untouched (the common case: an order that didn't immediately cross).
    pub fn resting(tradable: Tradable, audit_events: Vec<AuditEvent>) -> Self {
        Self::new(tradable, Vec::new(), audit_events)
    }

    /// The FOK gate rejected the tradable before it ever touched the book.
    pub fn rejected_fok(tradable: Tradable, audit_events: Vec<AuditEvent>) -> Self {
        Self::new(tradable, Vec::new(), audit_events)
    }

    pub fn has_trades(&self) -> bool {
        !self.trades.is_empty()
    }
}

/// Result of `ProductBook::add_quote`: the two sides admitted together.
#[derive(Debug, Clone)]
pub struct QuoteAdmissionOutcome {
    pub buy: Tradable,
    pub sell: Tradable,
    pub trades: Vec<TradeRecord>,
    pub audit_events: Vec<AuditEvent>,
}

/// Result of `ProductBook::cancel`.
#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub tradable: Tradable,
    pub audit_events: Vec<AuditEvent>,
}

impl CancelOutcome {
    pub fn new(tradable: Tradable, audit_events: Vec<AuditEvent>) -> Self {
        Self {
            tradable,
            audit_events,
        }
    }
}
