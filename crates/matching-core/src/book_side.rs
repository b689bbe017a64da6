//! One side (bids or asks) of a single instrument's order book.
//!
//! Bids and asks each live in a `BTreeMap<Price, VecDeque<Tradable>>`, with
//! the best price read off either end of the map depending on side. Since
//! [`Price`](crate::price::Price) is already `Ord` over exact cents, no
//! float-ordering wrapper is needed: which end of the map is "best" is just
//! a function of [`Side`].

use std::collections::{BTreeMap, VecDeque};

use common::{Side, UserId};

use crate::domain::{Tradable, TradableStatus};
use crate::price::Price;

/// Whether a `trade_out` consumption emptied the head tradable or only
/// reduced it. Mirrors the `fill_type` carried on `ORDER_FILLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillType {
    Partial,
    Full,
}

/// One tradable's state immediately after absorbing part of a trade, as
/// produced by [`BookSide::trade_out`].
#[derive(Debug, Clone)]
pub struct FillOutcome {
    pub tradable: Tradable,
    pub fill_type: FillType,
}

/// Resting liquidity for one side of one instrument's book. Price levels
/// are FIFO queues; within a level, arrival order is price-time priority.
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    levels: BTreeMap<Price, VecDeque<Tradable>>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Best price on this side: highest for bids, lowest for asks.
    pub fn best_price(&self) -> Option<Price> {
        match self.side {
            Side::Buy => self.levels.keys().next_back().copied(),
            Side::Sell => self.levels.keys().next().copied(),
        }
    }

    /// Total remaining volume resting at the best price.
    pub fn top_of_book_volume(&self) -> u32 {
        self.best_price()
            .and_then(|p| self.levels.get(&p))
            .map(|q| q.iter().map(|t| t.remaining_volume()).sum())
            .unwrap_or(0)
    }

    /// Insert a tradable at the back of its price level's queue, returning a
    /// snapshot DTO of what was inserted.
    pub fn add(&mut self, tradable: Tradable) -> Tradable {
        let snapshot = tradable.clone();
        self.levels
            .entry(tradable.price())
            .or_default()
            .push_back(tradable);
        snapshot
    }

    /// Find a tradable by id without removing it, wherever it rests.
    pub fn find(&self, id: &str) -> Option<&Tradable> {
        self.levels.values().flat_map(|q| q.iter()).find(|t| t.id() == id)
    }

    /// The tradable at the front of the best price level, if any.
    pub fn front_mut(&mut self) -> Option<&mut Tradable> {
        let best = self.best_price()?;
        self.levels.get_mut(&best)?.front_mut()
    }

    /// Remove and return the tradable at the front of the best price level,
    /// cleaning up the level if it becomes empty.
    pub fn pop_front(&mut self) -> Option<Tradable> {
        let best = self.best_price()?;
        let level = self.levels.get_mut(&best)?;
        let front = level.pop_front();
        if level.is_empty() {
            self.levels.remove(&best);
        }
        front
    }

    /// Drop the front tradable of the best level without returning it, used
    /// when a resting order is cancelled (STP, OCO) rather than traded.
    pub fn drop_front(&mut self) {
        let _ = self.pop_front();
    }

    /// Find and remove a tradable by id, wherever it rests.
    pub fn cancel(&mut self, id: &str) -> Option<Tradable> {
        let mut found_price = None;
        'outer: for (price, queue) in self.levels.iter() {
            for t in queue {
                if t.id() == id {
                    found_price = Some(*price);
                    break 'outer;
                }
            }
        }
        let price = found_price?;
        let level = self.levels.get_mut(&price)?;
        let idx = level.iter().position(|t| t.id() == id)?;
        let removed = level.remove(idx);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        removed
    }

    /// Remove `volume` units of resting liquidity at exactly `price`,
    /// consuming tradables at the front of the level in time-priority order.
    /// The caller guarantees the level holds at least `volume`; the crossing
    /// loop only ever calls this after computing `trade_volume` as a minimum
    /// of both heads' remaining size.
    pub fn trade_out(&mut self, price: Price, mut volume: u32) -> Vec<FillOutcome> {
        let mut outcomes = Vec::new();
        {
            let level = self
                .levels
                .get_mut(&price)
                .expect("caller guarantees the level holds at least `volume`");
            while volume > 0 {
                let front = level
                    .front_mut()
                    .expect("caller guarantees the level holds at least `volume`");
                let take = front.remaining_volume().min(volume);
                front.fill(take);
                volume -= take;
                let fully_filled = front.status() == TradableStatus::FullyFilled;
                let snapshot = front.clone();
                if fully_filled {
                    level.pop_front();
                    outcomes.push(FillOutcome {
                        tradable: snapshot,
                        fill_type: FillType::Full,
                    });
                } else {
                    outcomes.push(FillOutcome {
                        tradable: snapshot,
                        fill_type: FillType::Partial,
                    });
                }
            }
        }
        if self.levels.get(&price).is_some_and(|q| q.is_empty()) {
            self.levels.remove(&price);
        }
        outcomes
    }

    /// Remove every resting quote side belonging to `user`. A new two-sided
    /// quote replaces a user's prior resting quote in full, so this clears
    /// the old one before the new one is added.
    pub fn remove_quotes_for_user(&mut self, user: &UserId) -> Vec<Tradable> {
        let mut removed = Vec::new();
        let mut empty_prices = Vec::new();
        for (price, queue) in self.levels.iter_mut() {
            let mut i = 0;
            while i < queue.len() {
                if matches!(&queue[i], Tradable::Quote(q) if &q.core.user == user) {
                    removed.push(queue.remove(i).expect("index in bounds"));
                } else {
                    i += 1;
                }
            }
            if queue.is_empty() {
                empty_prices.push(*price);
            }
        }
        for price in empty_prices {
            self.levels.remove(&price);
        }
        removed
    }

    /// Remaining volume resting at prices that would cross against an
    /// incoming order limited at `limit`: at or below `limit` for an ask
    /// side being bought into, at or above `limit` for a bid side being
    /// sold into. Used by FOK admission checks.
    pub fn liquidity_crossing(&self, limit: Price) -> u32 {
        self.crossing_levels(limit)
            .flat_map(|(_, q)| q.iter())
            .map(|t| t.remaining_volume())
            .sum()
    }

    /// As [`Self::liquidity_crossing`], but excluding volume that would be
    /// skipped anyway under self-trade prevention against `user`. The FOK
    /// liquidity check must not count volume it cannot actually trade
    /// against.
    pub fn liquidity_crossing_excluding_user(&self, limit: Price, user: &UserId) -> u32 {
        self.crossing_levels(limit)
            .flat_map(|(_, q)| q.iter())
            .filter(|t| t.user() != user)
            .map(|t| t.remaining_volume())
            .sum()
    }

    fn crossing_levels(
        &self,
        limit: Price,
    ) -> Box<dyn Iterator<Item = (&Price, &VecDeque<Tradable>)> + '_> {
        match self.side {
            Side::Sell => Box::new(self.levels.range(..=limit)),
            Side::Buy => Box::new(self.levels.range(limit..)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LinkType, OrderType};
    use common::InstrumentId;

    fn quote(id: &str, user: &str, side: Side, price: &str, vol: u32, seq: u64) -> Tradable {
        Tradable::Quote(
            crate::domain::QuoteSide::new(
                id.to_string(),
                UserId::new(user).unwrap(),
                InstrumentId::new("AAPL").unwrap(),
                side,
                Price::from_decimal_str(price).unwrap(),
                vol,
                seq,
            )
            .unwrap(),
        )
    }

    fn order(id: &str, user: &str, side: Side, price: &str, vol: u32, seq: u64) -> Tradable {
        Tradable::Order(
            crate::domain::Order::new(
                id.to_string(),
                UserId::new(user).unwrap(),
                InstrumentId::new("AAPL").unwrap(),
                side,
                Price::from_decimal_str(price).unwrap(),
                vol,
                seq,
                OrderType::Limit,
                LinkType::Standalone,
                None,
            )
            .unwrap(),
        )
    }

    #[test]
    fn best_price_picks_highest_bid_lowest_ask() {
        let mut bids = BookSide::new(Side::Buy);
        bids.add(order("b1", "alice", Side::Buy, "10.00", 5, 1));
        bids.add(order("b2", "bob", Side::Buy, "10.50", 5, 2));
        assert_eq!(bids.best_price(), Some(Price::from_decimal_str("10.50").unwrap()));

        let mut asks = BookSide::new(Side::Sell);
        asks.add(order("a1", "carl", Side::Sell, "11.00", 5, 3));
        asks.add(order("a2", "dana", Side::Sell, "10.75", 5, 4));
        assert_eq!(asks.best_price(), Some(Price::from_decimal_str("10.75").unwrap()));
    }

    #[test]
    fn fifo_within_a_price_level() {
        let mut bids = BookSide::new(Side::Buy);
        bids.add(order("first", "alice", Side::Buy, "10.00", 5, 1));
        bids.add(order("second", "bob", Side::Buy, "10.00", 5, 2));
        let front = bids.front_mut().unwrap();
        assert_eq!(front.id(), "first");
    }

    #[test]
    fn pop_front_cleans_up_empty_levels() {
        let mut bids = BookSide::new(Side::Buy);
        bids.add(order("only", "alice", Side::Buy, "10.00", 5, 1));
        assert!(bids.pop_front().is_some());
        assert!(bids.is_empty());
        assert!(bids.best_price().is_none());
    }

    #[test]
    fn liquidity_crossing_sums_only_eligible_levels() {
        let mut asks = BookSide::new(Side::Sell);
        asks.add(order("a1", "carl", Side::Sell, "10.00", 5, 1));
        asks.add(order("a2", "dana", Side::Sell, "10.50", 7, 2));
        asks.add(order("a3", "erin", Side::Sell, "11.00", 3, 3));
        let limit = Price::from_decimal_str("10.50").unwrap();
        assert_eq!(asks.liquidity_crossing(limit), 12);
    }

    #[test]
    fn liquidity_crossing_excludes_users_own_volume() {
        let mut asks = BookSide::new(Side::Sell);
        asks.add(order("a1", "alice", Side::Sell, "10.00", 5, 1));
        asks.add(order("a2", "dana", Side::Sell, "10.00", 7, 2));
        let limit = Price::from_decimal_str("10.00").unwrap();
        let alice = UserId::new("alice").unwrap();
        assert_eq!(asks.liquidity_crossing_excluding_user(limit, &alice), 7);
    }

    #[test]
    fn remove_quotes_for_user_clears_only_that_users_quote() {
        let mut bids = BookSide::new(Side::Buy);
        bids.add(quote("q1", "alice", Side::Buy, "10.00", 5, 1));
        bids.add(order("o1", "bob", Side::Buy, "10.00", 5, 2));
        let alice = UserId::new("alice").unwrap();
        let removed = bids.remove_quotes_for_user(&alice);
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id(), "q1");
        assert_eq!(bids.front_mut().unwrap().id(), "o1");
    }

    #[test]
    fn trade_out_partially_fills_then_fully_fills_head() {
        let mut asks = BookSide::new(Side::Sell);
        asks.add(order("a1", "carl", Side::Sell, "10.00", 5, 1));
        asks.add(order("a2", "dana", Side::Sell, "10.00", 7, 2));
        let price = Price::from_decimal_str("10.00").unwrap();

        let outcomes = asks.trade_out(price, 3);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].fill_type, FillType::Partial);
        assert_eq!(outcomes[0].tradable.id(), "a1");
        assert_eq!(outcomes[0].tradable.remaining_volume(), 2);

        let outcomes = asks.trade_out(price, 2);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].fill_type, FillType::Full);
        assert_eq!(outcomes[0].tradable.id(), "a1");
        assert_eq!(asks.front_mut().unwrap().id(), "a2");
    }

    #[test]
    fn trade_out_spans_multiple_tradables_and_removes_empty_level() {
        let mut asks = BookSide::new(Side::Sell);
        asks.add(order("a1", "carl", Side::Sell, "10.00", 3, 1));
        asks.add(order("a2", "dana", Side::Sell, "10.00", 7, 2));
        let price = Price::from_decimal_str("10.00").unwrap();

        let outcomes = asks.trade_out(price, 10);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].tradable.id(), "a1");
        assert_eq!(outcomes[0].fill_type, FillType::Full);
        assert_eq!(outcomes[1].tradable.id(), "a2");
        assert_eq!(outcomes[1].fill_type, FillType::Full);
        assert!(asks.is_empty());
    }

    #[test]
    fn find_locates_a_resting_tradable_by_id() {
        let mut bids = BookSide::new(Side::Buy);
        bids.add(order("b1", "alice", Side::Buy, "10.00", 5, 1));
        assert!(bids.find("b1").is_some());
        assert!(bids.find("missing").is_none());
    }
}
