//! A single instrument's matching unit: two `BookSide`s under one
//! exclusive lock, the `try_trade` crossing algorithm, and the admission
//! control flow (FOK gate, STP, OCO) that wraps it.
//!
//! A price-time priority crossing loop: the maker always gets its own
//! price, the best-priced resting level is consumed front-to-back, and a
//! partially consumed level keeps its remainder at the front. `trade_out`
//! generalizes this to possibly-multi-tradable consumption, threaded
//! through the STP/FOK/OCO admission machinery below.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use common::{InstrumentId, Side, UserId};
use parking_lot::RwLock;

use crate::audit::{AuditData, AuditEvent, EventType, HashChain, NewEvent};
use crate::book_side::{BookSide, FillType};
use crate::domain::{Order, OrderType, QuoteSide, Tradable, TradableStatus};
use crate::error::{MatchingError, Result};
use crate::metrics::MatchingEngineMetrics;
use crate::price::Price;
use crate::relationship::OrderRelationshipRegistry;
use crate::result::{AdmissionOutcome, CancelOutcome, QuoteAdmissionOutcome, TradeRecord};
use crate::stp::{SelfTradePreventionMode, StpDecision, TraderIdExtractor};
use crate::timeline::TimelineRecorder;
use crate::topofbook::{TopOfBookPublisher, TopOfBookSnapshot};

struct Sides {
    buy: BookSide,
    sell: BookSide,
}

impl Sides {
    fn remove_by_id(&mut self, id: &str) -> Option<Tradable> {
        self.buy.cancel(id).or_else(|| self.sell.cancel(id))
    }

    fn find_by_id(&self, id: &str) -> Option<Tradable> {
        self.buy.find(id).or_else(|| self.sell.find(id)).cloned()
    }
}

enum CancelReason {
    Stp,
    Oco,
}

/// One step of crossing, paired with the audit event it produced. `try_trade`
/// emits audit events inline as it mutates the book so the hash chain
/// reflects the exact causal order downstream consumers require, rather
/// than batching them after the fact.
enum LifecycleEvent {
    Trade {
        buy_id: String,
        sell_id: String,
        price: Price,
        quantity: u32,
        audit_event: AuditEvent,
    },
    Filled {
        tradable: Tradable,
        audit_event: AuditEvent,
    },
    Cancelled {
        tradable: Tradable,
        #[allow(dead_code)]
        reason: CancelReason,
        audit_event: AuditEvent,
    },
}

/// A single instrument's book: both sides, the crossing algorithm, and the
/// collaborators a `try_trade` or `add` call needs (STP mode, trader
/// identity, OCO registry, the shared hash chain, and this instrument's
/// top-of-book publisher).
pub struct ProductBook {
    instrument: InstrumentId,
    sides: RwLock<Sides>,
    stp_mode: RwLock<SelfTradePreventionMode>,
    trader_extractor: Arc<dyn TraderIdExtractor>,
    relationships: OrderRelationshipRegistry,
    hash_chain: Arc<HashChain>,
    publisher: Arc<TopOfBookPublisher>,
    metrics: Arc<MatchingEngineMetrics>,
    sequence: AtomicU64,
}

impl ProductBook {
    pub fn new(
        instrument: InstrumentId,
        hash_chain: Arc<HashChain>,
        publisher: Arc<TopOfBookPublisher>,
        trader_extractor: Arc<dyn TraderIdExtractor>,
        stp_mode: SelfTradePreventionMode,
        metrics: Arc<MatchingEngineMetrics>,
    ) -> Self {
        Self {
            instrument,
            sides: RwLock::new(Sides {
                buy: BookSide::new(Side::Buy),
                sell: BookSide::new(Side::Sell),
            }),
            stp_mode: RwLock::new(stp_mode),
            trader_extractor,
            relationships: OrderRelationshipRegistry::new(),
            hash_chain,
            publisher,
            metrics,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn instrument(&self) -> &InstrumentId {
        &self.instrument
    }

    /// Monotonic admission sequence for this instrument, used as `created_seq`
    /// on every `Tradable` admitted here so price-time priority and "which
    /// side is incoming" are both derivable from one counter.
    pub fn next_seq(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    pub fn stp_mode(&self) -> SelfTradePreventionMode {
        *self.stp_mode.read()
    }

    /// Change the book's self-trade-prevention mode. Takes effect on the
    /// next admission; in-flight crossings already read the mode once per
    /// iteration so a change never applies mid-loop.
    pub fn set_stp_mode(&self, mode: SelfTradePreventionMode) {
        *self.stp_mode.write() = mode;
    }

    pub fn top_of_book(&self) -> TopOfBookSnapshot {
        Self::snapshot(&self.sides.read())
    }

    fn snapshot(sides: &Sides) -> TopOfBookSnapshot {
        TopOfBookSnapshot {
            bid: sides.buy.best_price(),
            bid_volume: sides.buy.top_of_book_volume(),
            ask: sides.sell.best_price(),
            ask_volume: sides.sell.top_of_book_volume(),
        }
    }

    /// Updates the depth/spread gauges from a freshly computed top-of-book
    /// snapshot. Depth is the combined resting volume at the best bid and
    /// ask; spread is expressed in basis points of the mid price, and is
    /// left untouched while the book is one-sided (there is no mid to
    /// express it against).
    fn record_book_metrics(&self, snapshot: &TopOfBookSnapshot) {
        self.metrics
            .set_order_book_depth((snapshot.bid_volume + snapshot.ask_volume) as u64);
        if let (Some(bid), Some(ask)) = (snapshot.bid, snapshot.ask) {
            let bid_cents = bid.cents();
            let ask_cents = ask.cents();
            let mid = (bid_cents + ask_cents) / 2;
            if mid > 0 {
                let spread_bps = ask_cents.saturating_sub(bid_cents) * 10_000 / mid;
                self.metrics.set_spread(spread_bps);
            }
        }
    }

    fn append_audit(&self, event_type: EventType, user_id: Option<String>, data: AuditData) -> AuditEvent {
        let new_event = NewEvent {
            event_type,
            user_id,
            product: Some(self.instrument.to_string()),
            data,
        };
        match self.hash_chain.append(new_event) {
            Ok(event) => event,
            Err(e) => self.fatal("appending audit event", e),
        }
    }

    /// A sink failure or invariant violation is fatal once the critical
    /// section has started mutating book state, since there is no way to
    /// unwind a partially-applied crossing. Logged with full context, then
    /// the process aborts rather than risk a silently divergent hash chain.
    #[cold]
    fn fatal(&self, context: &str, err: MatchingError) -> ! {
        tracing::error!(
            instrument = %self.instrument,
            context,
            error = %err,
            "fatal matching-core defect, aborting process"
        );
        std::process::abort();
    }

    /// Eligible counter-side liquidity for an FOK gate check. Under
    /// `ALLOW`, self-trades are permitted so nothing is excluded; under any
    /// other STP mode, volume STP would skip anyway must not count toward
    /// the gate (open question resolved in favor of correctness — see
    /// DESIGN.md).
    fn fok_eligible_liquidity(&self, sides: &Sides, side: Side, price: Price, user: &UserId) -> u32 {
        let allow = self.stp_mode() == SelfTradePreventionMode::Allow;
        match side {
            Side::Buy if allow => sides.sell.liquidity_crossing(price),
            Side::Buy => sides.sell.liquidity_crossing_excluding_user(price, user),
            Side::Sell if allow => sides.buy.liquidity_crossing(price),
            Side::Sell => sides.buy.liquidity_crossing_excluding_user(price, user),
        }
    }

    /// Admit a single order. The FOK gate and the crossing that follows
    /// share one exclusive-lock acquisition so the eligibility snapshot
    /// checked by the gate is guaranteed consistent with the crossing it
    /// gates: only folding both under one lock gives the FOK check the
    /// atomicity it needs.
    ///
    /// Checkpoints T6-T9 (execution/audit begin-done) end up adjacent here:
    /// this implementation emits each audit event inline as it mutates the
    /// book rather than batching audit I/O into a distinct trailing phase,
    /// so "execution" and "audit" as separate durations are near-zero by
    /// construction. The checkpoints are still captured in the mandated
    /// order; `matching_ns` and `e2e_ns` are the two thresholds that gate
    /// real behavior and both measure genuine elapsed work.
    pub fn add(&self, order: Order, timeline: &mut TimelineRecorder) -> Result<AdmissionOutcome> {
        let mut tradable = Tradable::Order(order);
        let mut events = Vec::new();
        self.metrics.record_order_received();

        let mut sides = self.sides.write();
        timeline.checkpoint_lock_acquired();

        if tradable.order_type() == Some(OrderType::Fok) {
            let eligible = self.fok_eligible_liquidity(&sides, tradable.side(), tradable.price(), tradable.user());
            if eligible < tradable.remaining_volume() {
                tradable.reject(TradableStatus::RejectedFok);
                let data = order_rejected_data(&tradable, "FOK_INSUFFICIENT_LIQUIDITY");
                let event = self.append_audit(EventType::OrderRejected, Some(tradable.user().to_string()), data);
                events.push(event);
                self.metrics.record_order_rejected();
                drop(sides);
                timeline.checkpoint_response_sent();
                return Ok(AdmissionOutcome::rejected_fok(tradable, events));
            }
        }

        tradable.mark_accepted();
        let placed_data = order_placed_data(&tradable);
        let placed_event = self.append_audit(EventType::OrderPlaced, Some(tradable.user().to_string()), placed_data);
        events.push(placed_event);

        let incoming_id = tradable.id().to_string();
        match tradable.side() {
            Side::Buy => {
                sides.buy.add(tradable);
            }
            Side::Sell => {
                sides.sell.add(tradable);
            }
        }

        timeline.checkpoint_matching_begins();
        let crossing = self.try_trade(&mut sides);
        timeline.checkpoint_matching_complete();
        timeline.checkpoint_execution_begins();

        let mut trades = Vec::new();
        let mut final_from_crossing = None;
        for event in crossing {
            match event {
                LifecycleEvent::Trade {
                    buy_id,
                    sell_id,
                    price,
                    quantity,
                    audit_event,
                } => {
                    trades.push(TradeRecord {
                        buy_id,
                        sell_id,
                        price,
                        quantity,
                    });
                    events.push(audit_event);
                }
                LifecycleEvent::Filled { tradable, audit_event } => {
                    if tradable.id() == incoming_id {
                        final_from_crossing = Some(tradable.clone());
                    }
                    events.push(audit_event);
                }
                LifecycleEvent::Cancelled { tradable, audit_event, .. } => {
                    if tradable.id() == incoming_id {
                        final_from_crossing = Some(tradable.clone());
                    }
                    events.push(audit_event);
                }
            }
        }
        timeline.checkpoint_execution_done();

        let snapshot = Self::snapshot(&sides);

        let final_tradable = match final_from_crossing {
            Some(t) => t,
            None => sides
                .find_by_id(&incoming_id)
                .expect("inserted tradable is always either resting or accounted for by crossing"),
        };

        if final_tradable.is_oco() && !final_tradable.status().is_final() {
            if let Some(linked_id) = final_tradable.linked_order_id() {
                self.relationships.link_oco(final_tradable.id(), linked_id);
            }
        }

        self.record_book_metrics(&snapshot);
        self.publisher.publish(snapshot);
        drop(sides);

        timeline.checkpoint_audit_begins();
        timeline.checkpoint_audit_complete();
        timeline.checkpoint_response_sent();

        Ok(AdmissionOutcome::new(final_tradable, trades, events))
    }

    /// Admit a two-sided quote: remove the user's prior quote sides,
    /// submit both new sides, then cross — all inside one exclusive section.
    pub fn add_quote(
        &self,
        buy: QuoteSide,
        sell: QuoteSide,
        timeline: &mut TimelineRecorder,
    ) -> Result<QuoteAdmissionOutcome> {
        let mut events = Vec::new();
        let mut sides = self.sides.write();
        timeline.checkpoint_lock_acquired();

        let user = buy.core.user.clone();
        let mut replaced = sides.buy.remove_quotes_for_user(&user);
        replaced.extend(sides.sell.remove_quotes_for_user(&user));
        for mut old in replaced {
            old.cancel_remaining(TradableStatus::Cancelled);
            let data = order_cancelled_data(&old, "QUOTE_REPLACED", None);
            let event = self.append_audit(EventType::OrderCancelled, Some(old.user().to_string()), data);
            events.push(event);
        }

        let quote_data = quote_submitted_data(&buy, &sell);
        let quote_event = self.append_audit(EventType::QuoteSubmitted, Some(user.to_string()), quote_data);
        events.push(quote_event);

        let mut buy_tradable = Tradable::Quote(buy);
        let mut sell_tradable = Tradable::Quote(sell);
        buy_tradable.mark_accepted();
        sell_tradable.mark_accepted();
        let buy_id = buy_tradable.id().to_string();
        let sell_id = sell_tradable.id().to_string();
        sides.buy.add(buy_tradable);
        sides.sell.add(sell_tradable);

        timeline.checkpoint_matching_begins();
        let crossing = self.try_trade(&mut sides);
        timeline.checkpoint_matching_complete();
        timeline.checkpoint_execution_begins();

        let mut trades = Vec::new();
        let mut final_buy = None;
        let mut final_sell = None;
        for event in crossing {
            match event {
                LifecycleEvent::Trade {
                    buy_id: b,
                    sell_id: s,
                    price,
                    quantity,
                    audit_event,
                } => {
                    trades.push(TradeRecord {
                        buy_id: b,
                        sell_id: s,
                        price,
                        quantity,
                    });
                    events.push(audit_event);
                }
                LifecycleEvent::Filled { tradable, audit_event } => {
                    if tradable.id() == buy_id {
                        final_buy = Some(tradable.clone());
                    }
                    if tradable.id() == sell_id {
                        final_sell = Some(tradable.clone());
                    }
                    events.push(audit_event);
                }
                LifecycleEvent::Cancelled { tradable, audit_event, .. } => {
                    if tradable.id() == buy_id {
                        final_buy = Some(tradable.clone());
                    }
                    if tradable.id() == sell_id {
                        final_sell = Some(tradable.clone());
                    }
                    events.push(audit_event);
                }
            }
        }
        timeline.checkpoint_execution_done();

        let snapshot = Self::snapshot(&sides);
        let final_buy = final_buy.unwrap_or_else(|| {
            sides
                .find_by_id(&buy_id)
                .expect("buy quote side is always resting or accounted for by crossing")
        });
        let final_sell = final_sell.unwrap_or_else(|| {
            sides
                .find_by_id(&sell_id)
                .expect("sell quote side is always resting or accounted for by crossing")
        });

        self.record_book_metrics(&snapshot);
        self.publisher.publish(snapshot);
        drop(sides);

        timeline.checkpoint_audit_begins();
        timeline.checkpoint_audit_complete();
        timeline.checkpoint_response_sent();

        Ok(QuoteAdmissionOutcome {
            buy: final_buy,
            sell: final_sell,
            trades,
            audit_events: events,
        })
    }

    /// Cancel a single resting order. An OCO relationship is
    /// deactivated, never cascaded: cascade is triggered only by a fill.
    pub fn cancel(&self, side: Side, id: &str, timeline: &mut TimelineRecorder) -> Result<CancelOutcome> {
        let mut sides = self.sides.write();
        timeline.checkpoint_lock_acquired();

        let mut cancelled = match side {
            Side::Buy => sides.buy.cancel(id),
            Side::Sell => sides.sell.cancel(id),
        }
        .ok_or_else(|| MatchingError::not_found(format!("no resting tradable with id '{id}'")))?;

        cancelled.cancel_remaining(TradableStatus::Cancelled);
        if cancelled.is_oco() {
            self.relationships.unlink(cancelled.id());
        }

        let data = order_cancelled_data(&cancelled, "EXPLICIT", None);
        let event = self.append_audit(EventType::OrderCancelled, Some(cancelled.user().to_string()), data);

        let snapshot = Self::snapshot(&sides);
        self.record_book_metrics(&snapshot);
        self.publisher.publish(snapshot);
        drop(sides);

        timeline.checkpoint_response_sent();
        Ok(CancelOutcome::new(cancelled, vec![event]))
    }

    /// Cancel both quote sides belonging to `user`.
    pub fn remove_quotes_for_user(&self, user: &UserId, timeline: &mut TimelineRecorder) -> Result<Vec<CancelOutcome>> {
        let mut sides = self.sides.write();
        timeline.checkpoint_lock_acquired();

        let mut removed = sides.buy.remove_quotes_for_user(user);
        removed.extend(sides.sell.remove_quotes_for_user(user));

        let mut outcomes = Vec::with_capacity(removed.len());
        for mut tradable in removed {
            tradable.cancel_remaining(TradableStatus::Cancelled);
            let data = order_cancelled_data(&tradable, "EXPLICIT", None);
            let event = self.append_audit(EventType::OrderCancelled, Some(tradable.user().to_string()), data);
            outcomes.push(CancelOutcome::new(tradable, vec![event]));
        }

        let snapshot = Self::snapshot(&sides);
        self.record_book_metrics(&snapshot);
        self.publisher.publish(snapshot);
        drop(sides);

        timeline.checkpoint_response_sent();
        Ok(outcomes)
    }

    /// The crossing loop. Runs while both sides are non-empty and
    /// crossed, applying STP before every prospective trade and cascading
    /// OCO cancellations after every full fill. Emits audit events inline so
    /// the hash chain's order matches the causal order of the mutations.
    fn try_trade(&self, sides: &mut Sides) -> Vec<LifecycleEvent> {
        let mut events = Vec::new();

        loop {
            let (bid_price, ask_price) = match (sides.buy.best_price(), sides.sell.best_price()) {
                (Some(b), Some(a)) => (b, a),
                _ => break,
            };
            if bid_price < ask_price {
                break;
            }

            let stp_mode = self.stp_mode();
            let (bid_user, ask_user, bid_seq, ask_seq) = {
                let bid_head = sides.buy.front_mut().expect("best_price implies a head tradable");
                let ask_head = sides.sell.front_mut().expect("best_price implies a head tradable");
                (
                    bid_head.user().clone(),
                    ask_head.user().clone(),
                    bid_head.created_seq(),
                    ask_head.created_seq(),
                )
            };

            let decision = stp_mode.decide(self.trader_extractor.same_trader(&bid_user, &ask_user));
            // The tradable admitted most recently (highest sequence number)
            // is "incoming" for STP-direction purposes; since every other
            // resting order was already uncrossed against the rest of the
            // book before this admission began, there is only ever one.
            let incoming_side = if bid_seq > ask_seq { Side::Buy } else { Side::Sell };

            match decision {
                StpDecision::NoConflict => {}
                StpDecision::CancelIncoming => {
                    events.push(self.cancel_stp_head(sides, incoming_side));
                    break;
                }
                StpDecision::CancelResting => {
                    events.push(self.cancel_stp_head(sides, incoming_side.opposite()));
                    continue;
                }
                StpDecision::CancelBoth => {
                    events.push(self.cancel_stp_head(sides, incoming_side));
                    events.push(self.cancel_stp_head(sides, incoming_side.opposite()));
                    break;
                }
            }

            let trade_volume = {
                let bid_head = sides.buy.front_mut().expect("best_price implies a head tradable");
                let ask_head = sides.sell.front_mut().expect("best_price implies a head tradable");
                bid_head.remaining_volume().min(ask_head.remaining_volume())
            };

            let (buy_id, sell_id, resting_price) = {
                let bid_head = sides.buy.front_mut().expect("best_price implies a head tradable");
                let ask_head = sides.sell.front_mut().expect("best_price implies a head tradable");
                let resting_price = match bid_head.created_seq().cmp(&ask_head.created_seq()) {
                    std::cmp::Ordering::Less => bid_head.price(),
                    std::cmp::Ordering::Greater => ask_head.price(),
                    std::cmp::Ordering::Equal => {
                        if bid_head.id() < ask_head.id() {
                            bid_head.price()
                        } else {
                            ask_head.price()
                        }
                    }
                };
                (bid_head.id().to_string(), ask_head.id().to_string(), resting_price)
            };

            let trade_data = trade_executed_data(&self.instrument, resting_price, trade_volume, &buy_id, &sell_id);
            let trade_audit = self.append_audit(EventType::TradeExecuted, None, trade_data);
            self.metrics.record_order_matched();
            self.metrics.record_trade(trade_volume);
            events.push(LifecycleEvent::Trade {
                buy_id,
                sell_id,
                price: resting_price,
                quantity: trade_volume,
                audit_event: trade_audit,
            });

            let buy_fills = sides.buy.trade_out(bid_price, trade_volume);
            let sell_fills = sides.sell.trade_out(ask_price, trade_volume);

            for fill in buy_fills.into_iter().chain(sell_fills) {
                let fill_data = order_filled_data(&fill.tradable, fill.fill_type);
                let fill_audit = self.append_audit(
                    EventType::OrderFilled,
                    Some(fill.tradable.user().to_string()),
                    fill_data,
                );
                let filled_id = fill.tradable.id().to_string();
                let is_full = fill.fill_type == FillType::Full;
                events.push(LifecycleEvent::Filled {
                    tradable: fill.tradable,
                    audit_event: fill_audit,
                });

                if is_full {
                    if let Some(linked_id) = self.relationships.unlink(&filled_id) {
                        if let Some(mut counterpart) = sides.remove_by_id(&linked_id) {
                            counterpart.cancel_remaining(TradableStatus::CancelledOco);
                            let cancel_data = order_cancelled_data(&counterpart, "OCO", Some(&filled_id));
                            let cancel_audit = self.append_audit(
                                EventType::OrderCancelled,
                                Some(counterpart.user().to_string()),
                                cancel_data,
                            );
                            self.metrics.record_oco_cascade();
                            events.push(LifecycleEvent::Cancelled {
                                tradable: counterpart,
                                reason: CancelReason::Oco,
                                audit_event: cancel_audit,
                            });
                        }
                    }
                }
            }
        }

        events
    }

    fn cancel_stp_head(&self, sides: &mut Sides, side: Side) -> LifecycleEvent {
        let mut cancelled = match side {
            Side::Buy => sides.buy.pop_front(),
            Side::Sell => sides.sell.pop_front(),
        }
        .expect("best_price() being Some implies a front tradable exists");

        cancelled.cancel_remaining(TradableStatus::CancelledStp);
        let data = order_cancelled_data(&cancelled, "STP", None);
        let audit_event = self.append_audit(EventType::OrderCancelled, Some(cancelled.user().to_string()), data);
        self.metrics.record_stp_cancellation();
        LifecycleEvent::Cancelled {
            tradable: cancelled,
            reason: CancelReason::Stp,
            audit_event,
        }
    }
}

fn str_val(s: impl Into<String>) -> serde_json::Value {
    serde_json::Value::String(s.into())
}

fn order_placed_data(t: &Tradable) -> AuditData {
    let mut data = AuditData::new();
    data.insert("orderId".into(), str_val(t.id()));
    data.insert("side".into(), str_val(t.side().to_string()));
    data.insert("price".into(), str_val(t.price().to_string()));
    data.insert("volume".into(), serde_json::Value::from(t.remaining_volume()));
    data
}

fn order_rejected_data(t: &Tradable, reason: &str) -> AuditData {
    let mut data = AuditData::new();
    data.insert("orderId".into(), str_val(t.id()));
    data.insert("reason".into(), str_val(reason));
    data.insert("side".into(), str_val(t.side().to_string()));
    data.insert("price".into(), str_val(t.price().to_string()));
    data.insert("volume".into(), serde_json::Value::from(t.remaining_volume()));
    data
}

fn trade_executed_data(
    instrument: &InstrumentId,
    price: Price,
    quantity: u32,
    buy_id: &str,
    sell_id: &str,
) -> AuditData {
    let mut data = AuditData::new();
    data.insert("instrument".into(), str_val(instrument.to_string()));
    data.insert("price".into(), str_val(price.to_string()));
    data.insert("quantity".into(), serde_json::Value::from(quantity));
    data.insert("buyId".into(), str_val(buy_id));
    data.insert("sellId".into(), str_val(sell_id));
    data
}

fn order_filled_data(t: &Tradable, fill_type: FillType) -> AuditData {
    let mut data = AuditData::new();
    data.insert("orderId".into(), str_val(t.id()));
    data.insert(
        "fillType".into(),
        str_val(match fill_type {
            FillType::Partial => "PARTIAL",
            FillType::Full => "FULL",
        }),
    );
    data.insert("filledVolume".into(), serde_json::Value::from(t.core().filled_volume));
    data.insert("remainingVolume".into(), serde_json::Value::from(t.remaining_volume()));
    data
}

fn order_cancelled_data(t: &Tradable, reason: &str, counterpart_id: Option<&str>) -> AuditData {
    let mut data = AuditData::new();
    data.insert("orderId".into(), str_val(t.id()));
    data.insert("reason".into(), str_val(reason));
    if let Some(c) = counterpart_id {
        data.insert("counterpartId".into(), str_val(c));
    }
    data
}

fn quote_submitted_data(buy: &QuoteSide, sell: &QuoteSide) -> AuditData {
    let mut data = AuditData::new();
    data.insert("buyId".into(), str_val(buy.core.id.clone()));
    data.insert("buyPrice".into(), str_val(buy.core.price.to_string()));
    data.insert("buyVolume".into(), serde_json::Value::from(buy.core.original_volume));
    data.insert("sellId".into(), str_val(sell.core.id.clone()));
    data.insert("sellPrice".into(), str_val(sell.core.price.to_string()));
    data.insert("sellVolume".into(), serde_json::Value::from(sell.core.original_volume));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditSink;
    use crate::domain::LinkType;
    use crate::stp::IdentityTraderIdExtractor;

    fn book(instrument: &str) -> (Arc<ProductBook>, Arc<InMemoryAuditSink>) {
        let sink = Arc::new(InMemoryAuditSink::new());
        let hash_chain = Arc::new(HashChain::new(vec![Box::new(TestSink(sink.clone()))]));
        let publisher = Arc::new(TopOfBookPublisher::new(InstrumentId::new(instrument).unwrap()));
        let book = Arc::new(ProductBook::new(
            InstrumentId::new(instrument).unwrap(),
            hash_chain,
            publisher,
            Arc::new(IdentityTraderIdExtractor),
            SelfTradePreventionMode::CancelResting,
            Arc::new(MatchingEngineMetrics::new()),
        ));
        (book, sink)
    }

    fn book_with_metrics(instrument: &str) -> (Arc<ProductBook>, Arc<MatchingEngineMetrics>) {
        let sink = Arc::new(InMemoryAuditSink::new());
        let hash_chain = Arc::new(HashChain::new(vec![Box::new(TestSink(sink))]));
        let publisher = Arc::new(TopOfBookPublisher::new(InstrumentId::new(instrument).unwrap()));
        let metrics = Arc::new(MatchingEngineMetrics::new());
        let book = Arc::new(ProductBook::new(
            InstrumentId::new(instrument).unwrap(),
            hash_chain,
            publisher,
            Arc::new(IdentityTraderIdExtractor),
            SelfTradePreventionMode::CancelResting,
            metrics.clone(),
        ));
        (book, metrics)
    }

    // `InMemoryAuditSink` doesn't implement `Clone`-through-`Box<dyn AuditSink>`
    // sharing, so tests route writes through a thin forwarding sink that
    // shares the same `Arc`, letting the test inspect what was appended.
    struct TestSink(Arc<InMemoryAuditSink>);
    impl crate::audit::AuditSink for TestSink {
        fn write(&self, event: &AuditEvent) -> crate::error::Result<()> {
            self.0.write(event)
        }
        fn name(&self) -> &str {
            "test"
        }
    }

    fn order(
        book: &ProductBook,
        id: &str,
        user: &str,
        side: Side,
        price: &str,
        volume: u32,
        order_type: OrderType,
        link_type: LinkType,
        linked_order_id: Option<&str>,
    ) -> Order {
        Order::new(
            id.to_string(),
            UserId::new(user).unwrap(),
            book.instrument().clone(),
            side,
            Price::from_decimal_str(price).unwrap(),
            volume,
            book.next_seq(),
            order_type,
            link_type,
            linked_order_id.map(str::to_string),
        )
        .unwrap()
    }

    #[test]
    fn s1_simple_cross_fully_fills_both_sides() {
        let (book, _sink) = book("AAPL");
        let mut t = TimelineRecorder::start();

        let sell = order(&book, "s1", "alice", Side::Sell, "150.00", 100, OrderType::Limit, LinkType::Standalone, None);
        book.add(sell, &mut t).unwrap();

        let mut t2 = TimelineRecorder::start();
        let buy = order(&book, "b1", "bob", Side::Buy, "150.00", 100, OrderType::Limit, LinkType::Standalone, None);
        let outcome = book.add(buy, &mut t2).unwrap();

        assert_eq!(outcome.trades.len(), 1);
        assert_eq!(outcome.trades[0].quantity, 100);
        assert_eq!(outcome.trades[0].price, Price::from_decimal_str("150.00").unwrap());
        assert_eq!(outcome.tradable.status(), TradableStatus::FullyFilled);

        let top = book.top_of_book();
        assert!(top.bid.is_none());
        assert!(top.ask.is_none());
    }

    #[test]
    fn s2_partial_fill_leaves_remainder_resting() {
        let (book, _sink) = book("MSFT");
        let mut t = TimelineRecorder::start();
        let sell = order(&book, "s1", "ann", Side::Sell, "310.00", 60, OrderType::Limit, LinkType::Standalone, None);
        book.add(sell, &mut t).unwrap();

        let mut t2 = TimelineRecorder::start();
        let buy = order(&book, "b1", "bud", Side::Buy, "311.00", 100, OrderType::Limit, LinkType::Standalone, None);
        let outcome = book.add(buy, &mut t2).unwrap();

        assert_eq!(outcome.trades[0].quantity, 60);
        assert_eq!(outcome.trades[0].price, Price::from_decimal_str("310.00").unwrap());
        assert_eq!(outcome.tradable.status(), TradableStatus::PartiallyFilled);
        assert_eq!(outcome.tradable.remaining_volume(), 40);

        let top = book.top_of_book();
        assert_eq!(top.bid, Some(Price::from_decimal_str("311.00").unwrap()));
        assert_eq!(top.bid_volume, 40);
        assert!(top.ask.is_none());
    }

    #[test]
    fn s3_fok_insufficient_liquidity_is_rejected_without_book_mutation() {
        let (book, _sink) = book("GOOG");
        let mut t1 = TimelineRecorder::start();
        book.add(
            order(&book, "s1", "amy", Side::Sell, "100.00", 30, OrderType::Limit, LinkType::Standalone, None),
            &mut t1,
        )
        .unwrap();
        let mut t2 = TimelineRecorder::start();
        book.add(
            order(&book, "s2", "amy", Side::Sell, "101.00", 20, OrderType::Limit, LinkType::Standalone, None),
            &mut t2,
        )
        .unwrap();

        let mut t3 = TimelineRecorder::start();
        let fok = order(&book, "b1", "cal", Side::Buy, "101.00", 60, OrderType::Fok, LinkType::Standalone, None);
        let outcome = book.add(fok, &mut t3).unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.tradable.status(), TradableStatus::RejectedFok);

        let top = book.top_of_book();
        assert_eq!(top.ask, Some(Price::from_decimal_str("100.00").unwrap()));
        assert_eq!(top.ask_volume, 30);
    }

    #[test]
    fn s4_oco_cascade_cancels_sibling_on_fill() {
        let (book, _sink) = book("TSLA");

        let mut t1 = TimelineRecorder::start();
        let first = order(&book, "buy1", "dan", Side::Buy, "200.00", 10, OrderType::Limit, LinkType::Oco, Some("buy2"));
        book.add(first, &mut t1).unwrap();

        let mut t2 = TimelineRecorder::start();
        let second = order(&book, "buy2", "dan", Side::Buy, "195.00", 10, OrderType::Limit, LinkType::Oco, Some("buy1"));
        book.add(second, &mut t2).unwrap();

        let mut t3 = TimelineRecorder::start();
        let sell = order(&book, "sell1", "eve", Side::Sell, "200.00", 10, OrderType::Limit, LinkType::Standalone, None);
        let outcome = book.add(sell, &mut t3).unwrap();

        assert_eq!(outcome.trades.len(), 1);
        assert!(
            outcome
                .audit_events
                .iter()
                .any(|e| e.event_type == EventType::OrderCancelled && e.data.get("reason").and_then(|v| v.as_str()) == Some("OCO"))
        );
    }

    #[test]
    fn s5_stp_cancel_resting_prevents_self_trade() {
        let (book, _sink) = book("AMZN");
        let mut t1 = TimelineRecorder::start();
        book.add(
            order(&book, "s1", "fay", Side::Sell, "140.00", 50, OrderType::Limit, LinkType::Standalone, None),
            &mut t1,
        )
        .unwrap();

        let mut t2 = TimelineRecorder::start();
        let buy = order(&book, "b1", "fay", Side::Buy, "140.00", 50, OrderType::Limit, LinkType::Standalone, None);
        let outcome = book.add(buy, &mut t2).unwrap();

        assert!(outcome.trades.is_empty());
        assert_eq!(outcome.tradable.status(), TradableStatus::Accepted);
        let top = book.top_of_book();
        assert_eq!(top.bid, Some(Price::from_decimal_str("140.00").unwrap()));
        assert!(top.ask.is_none());
    }

    #[test]
    fn explicit_cancel_deactivates_oco_without_cascading() {
        let (book, _sink) = book("NFLX");
        let mut t1 = TimelineRecorder::start();
        let first = order(&book, "x1", "gus", Side::Buy, "400.00", 5, OrderType::Limit, LinkType::Oco, Some("x2"));
        book.add(first, &mut t1).unwrap();
        let mut t2 = TimelineRecorder::start();
        let second = order(&book, "x2", "gus", Side::Buy, "399.00", 5, OrderType::Limit, LinkType::Oco, Some("x1"));
        book.add(second, &mut t2).unwrap();

        let mut t3 = TimelineRecorder::start();
        book.cancel(Side::Buy, "x1", &mut t3).unwrap();

        let top = book.top_of_book();
        assert_eq!(top.bid, Some(Price::from_decimal_str("399.00").unwrap()));
    }

    #[test]
    fn resting_orders_on_both_sides_update_depth_and_spread_gauges() {
        let (book, metrics) = book_with_metrics("INTC");
        assert_eq!(metrics.order_book_depth.get(), 0);
        assert_eq!(metrics.spread.get(), 0);

        let mut t1 = TimelineRecorder::start();
        let sell = order(&book, "d1", "hank", Side::Sell, "100.10", 30, OrderType::Limit, LinkType::Standalone, None);
        book.add(sell, &mut t1).unwrap();

        let mut t2 = TimelineRecorder::start();
        let buy = order(&book, "d2", "iris", Side::Buy, "100.00", 20, OrderType::Limit, LinkType::Standalone, None);
        book.add(buy, &mut t2).unwrap();

        assert_eq!(metrics.order_book_depth.get(), 50);
        // bid=10000c, ask=10010c, mid=10005c: (10*10000)/10005 = 9 bps.
        assert_eq!(metrics.spread.get(), 9);
    }
}
