//! Domain types for the matching core.
//!
//! `Tradable` models the polymorphism over `{Order, QuoteSide}` as a
//! tagged variant rather than an inheritance hierarchy: the fields every
//! resting thing on the book needs (`remaining`/`filled`/`cancelled` volume,
//! status, side, price) live on a shared [`Core`] record, and each variant
//! adds only what it needs on top.

use common::{InstrumentId, Side, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{MatchingError, Result};
use crate::price::Price;

/// Lifecycle of a tradable. See the permanent invariant on [`Core`]:
/// `remaining + filled + cancelled == original` holds in every state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradableStatus {
    Pending,
    Accepted,
    PartiallyFilled,
    FullyFilled,
    Cancelled,
    CancelledOco,
    CancelledStp,
    RejectedFok,
    Rejected,
}

impl TradableStatus {
    /// No further state transition is possible.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            TradableStatus::FullyFilled
                | TradableStatus::Cancelled
                | TradableStatus::CancelledOco
                | TradableStatus::CancelledStp
                | TradableStatus::RejectedFok
                | TradableStatus::Rejected
        )
    }

    /// Can still participate in `try_trade`.
    pub fn is_executable(&self) -> bool {
        matches!(
            self,
            TradableStatus::Accepted | TradableStatus::PartiallyFilled
        )
    }
}

/// `LIMIT` orders rest until filled or cancelled; `FOK` orders are gated
/// before admission and must fully fill or be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Fok,
}

/// How an order is linked to another order. Only `Oco` has cascade behavior
/// implemented in `ProductBook`; `Oso`/`Oto` are accepted identifiers without
/// defined cascade semantics beyond OCO, so they are carried as standalone
/// orders with the link recorded but not acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkType {
    #[default]
    Standalone,
    Oco,
    Oso,
    Oto,
}

/// Fields shared by every resting tradable, whatever its concrete kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Core {
    pub id: String,
    pub user: UserId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub original_volume: u32,
    pub remaining_volume: u32,
    pub filled_volume: u32,
    pub cancelled_volume: u32,
    pub status: TradableStatus,
    /// Monotonic admission sequence, not wall-clock time: only relative
    /// order between tradables is observable by the matching algorithm.
    pub created_seq: u64,
}

impl Core {
    fn new(
        id: String,
        user: UserId,
        instrument: InstrumentId,
        side: Side,
        price: Price,
        volume: u32,
        created_seq: u64,
    ) -> Result<Self> {
        if !(1..=9999).contains(&volume) {
            return Err(MatchingError::invalid_input(format!(
                "volume {volume} is out of range [1, 9999]"
            )));
        }
        Ok(Self {
            id,
            user,
            instrument,
            side,
            price,
            original_volume: volume,
            remaining_volume: volume,
            filled_volume: 0,
            cancelled_volume: 0,
            status: TradableStatus::Pending,
            created_seq,
        })
    }

    /// Permanent invariant check: volumes must always reconcile.
    pub fn volumes_are_consistent(&self) -> bool {
        self.remaining_volume as u64 + self.filled_volume as u64 + self.cancelled_volume as u64
            == self.original_volume as u64
    }

    fn fill(&mut self, qty: u32) {
        debug_assert!(qty <= self.remaining_volume);
        self.remaining_volume -= qty;
        self.filled_volume += qty;
        self.status = if self.remaining_volume == 0 {
            TradableStatus::FullyFilled
        } else {
            TradableStatus::PartiallyFilled
        };
    }

    fn cancel_remaining(&mut self, status: TradableStatus) {
        self.cancelled_volume += self.remaining_volume;
        self.remaining_volume = 0;
        self.status = status;
    }
}

/// A standalone limit/FOK order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub core: Core,
    pub order_type: OrderType,
    pub link_type: LinkType,
    pub linked_order_id: Option<String>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        user: UserId,
        instrument: InstrumentId,
        side: Side,
        price: Price,
        volume: u32,
        created_seq: u64,
        order_type: OrderType,
        link_type: LinkType,
        linked_order_id: Option<String>,
    ) -> Result<Self> {
        if link_type == LinkType::Oco && linked_order_id.is_none() {
            return Err(MatchingError::invalid_input(
                "OCO orders must carry a linked_order_id",
            ));
        }
        Ok(Self {
            core: Core::new(id, user, instrument, side, price, volume, created_seq)?,
            order_type,
            link_type,
            linked_order_id,
        })
    }

    pub fn is_oco(&self) -> bool {
        self.link_type == LinkType::Oco
    }
}

/// One side (buy or sell) of a two-sided quote, submitted atomically with
/// its counterpart under one user for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteSide {
    pub core: Core,
}

impl QuoteSide {
    pub fn new(
        id: String,
        user: UserId,
        instrument: InstrumentId,
        side: Side,
        price: Price,
        volume: u32,
        created_seq: u64,
    ) -> Result<Self> {
        Ok(Self {
            core: Core::new(id, user, instrument, side, price, volume, created_seq)?,
        })
    }
}

/// Anything that can rest on a book side and participate in crossing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Tradable {
    Order(Order),
    Quote(QuoteSide),
}

impl Tradable {
    pub fn core(&self) -> &Core {
        match self {
            Tradable::Order(o) => &o.core,
            Tradable::Quote(q) => &q.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut Core {
        match self {
            Tradable::Order(o) => &mut o.core,
            Tradable::Quote(q) => &mut q.core,
        }
    }

    pub fn id(&self) -> &str {
        &self.core().id
    }

    pub fn user(&self) -> &UserId {
        &self.core().user
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.core().instrument
    }

    pub fn side(&self) -> Side {
        self.core().side
    }

    pub fn price(&self) -> Price {
        self.core().price
    }

    pub fn remaining_volume(&self) -> u32 {
        self.core().remaining_volume
    }

    pub fn status(&self) -> TradableStatus {
        self.core().status
    }

    pub fn created_seq(&self) -> u64 {
        self.core().created_seq
    }

    /// `Some(link_type)` if this tradable carries an order-level link
    /// (quotes are never linked).
    pub fn link_type(&self) -> Option<LinkType> {
        match self {
            Tradable::Order(o) => Some(o.link_type),
            Tradable::Quote(_) => None,
        }
    }

    pub fn linked_order_id(&self) -> Option<&str> {
        match self {
            Tradable::Order(o) => o.linked_order_id.as_deref(),
            Tradable::Quote(_) => None,
        }
    }

    pub fn order_type(&self) -> Option<OrderType> {
        match self {
            Tradable::Order(o) => Some(o.order_type),
            Tradable::Quote(_) => None,
        }
    }

    pub fn is_oco(&self) -> bool {
        matches!(self, Tradable::Order(o) if o.is_oco())
    }

    pub fn mark_accepted(&mut self) {
        self.core_mut().status = TradableStatus::Accepted;
    }

    pub(crate) fn fill(&mut self, qty: u32) {
        self.core_mut().fill(qty);
    }

    pub(crate) fn cancel_remaining(&mut self, status: TradableStatus) {
        self.core_mut().cancel_remaining(status);
    }

    /// Terminal status assigned before the tradable ever rested on a book
    /// side (FOK gate rejection, malformed-but-parseable admission). Unlike
    /// [`Self::cancel_remaining`], no volume bookkeeping happens: nothing was
    /// ever at risk.
    pub(crate) fn reject(&mut self, status: TradableStatus) {
        self.core_mut().status = status;
    }
}
