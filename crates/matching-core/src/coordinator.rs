//! The admission coordinator: the single entry point that owns
//! each instrument's critical section, captures the T0-T2 timeline
//! checkpoints before delegating into a `ProductBook`, and records the
//! finished timeline once the book releases its lock.
//!
//! One struct owns the instrument -> engine map and the lock discipline
//! around it. Collaborators (`OrderRelationshipRegistry`, the audit sinks,
//! `LatencyMonitor`, `ProductManager`) are built once by
//! [`AdmissionCoordinator::from_config`] and owned rather than reached
//! through process globals, so tests can construct fresh, isolated
//! coordinators.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use common::{InstrumentId, Side, UserId};

use crate::audit::{AuditSink, FileAuditSink, HashChain, InMemoryAuditSink, NullAdvisorySink};
use crate::domain::{LinkType, Order, OrderType, QuoteSide};
use crate::error::{MatchingError, Result};
use crate::metrics::{MatchingEngineMetrics, MetricsSnapshot};
use crate::price::Price;
use crate::product_book::ProductBook;
use crate::result::{AdmissionOutcome, CancelOutcome, QuoteAdmissionOutcome};
use crate::stp::{IdentityTraderIdExtractor, SelfTradePreventionMode, TraderIdExtractor};
use crate::timeline::{LatencyMonitor, LatencyStats, LatencyThresholds, TimelineRecorder};
use crate::topofbook::TopOfBookSnapshot;

/// Owns the instrument -> `ProductBook` mapping. Built once at startup from
/// the configured instrument list; instruments are never removed at runtime
/// (shared resources are never removed at runtime).
pub struct ProductManager {
    books: HashMap<InstrumentId, Arc<ProductBook>>,
}

impl ProductManager {
    pub fn new(books: HashMap<InstrumentId, Arc<ProductBook>>) -> Self {
        Self { books }
    }

    pub fn get(&self, instrument: &InstrumentId) -> Result<&Arc<ProductBook>> {
        self.books
            .get(instrument)
            .ok_or_else(|| MatchingError::unknown_instrument(instrument.to_string()))
    }

    pub fn instruments(&self) -> impl Iterator<Item = &InstrumentId> {
        self.books.keys()
    }
}

/// Inputs to `submit_order`. The order id itself is not part of the
/// request: the coordinator assigns one and returns it alongside the
/// admission outcome.
pub struct SubmitOrder {
    pub user: UserId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub volume: u32,
    pub order_type: OrderType,
    pub link_type: LinkType,
    pub linked_order_id: Option<String>,
}

/// Inputs to `submit_quote`.
pub struct SubmitQuote {
    pub user: UserId,
    pub instrument: InstrumentId,
    pub buy_price: Price,
    pub buy_volume: u32,
    pub sell_price: Price,
    pub sell_volume: u32,
}

/// The single entry point every boundary adapter (CLI, RPC, message bus)
/// calls into. Owns the `ProductManager`, the shared `HashChain`, and the
/// `LatencyMonitor` that every admission's finished timeline is recorded to.
pub struct AdmissionCoordinator {
    products: ProductManager,
    hash_chain: Arc<HashChain>,
    latency: LatencyMonitor,
    metrics: Arc<MatchingEngineMetrics>,
}

impl AdmissionCoordinator {
    pub fn new(products: ProductManager, hash_chain: Arc<HashChain>, latency: LatencyMonitor, metrics: Arc<MatchingEngineMetrics>) -> Self {
        Self {
            products,
            hash_chain,
            latency,
            metrics,
        }
    }

    /// Build the full collaborator graph from a loaded configuration: the
    /// audit sinks named in
    /// `audit.sinks`, one `ProductBook` per configured instrument sharing a
    /// single `HashChain`, the default STP mode, and the `LatencyMonitor`
    /// sized and thresholded from `latency.*`.
    pub fn from_config(config: &config::MasterConfig) -> Result<Self> {
        let mut sinks: Vec<Box<dyn AuditSink>> = Vec::new();
        for name in &config.audit.sinks {
            match name.as_str() {
                "file" => sinks.push(Box::new(FileAuditSink::open(&config.audit.file_path)?)),
                "database" => {
                    tracing::warn!("audit sink 'database' is accepted for forward-compatibility but not implemented in-core");
                    sinks.push(Box::new(NullAdvisorySink));
                }
                other => {
                    return Err(MatchingError::invalid_input(format!("unknown audit sink '{other}'")));
                }
            }
        }
        if sinks.is_empty() {
            sinks.push(Box::new(InMemoryAuditSink::new()));
        }
        let hash_chain = Arc::new(HashChain::new(sinks));

        let stp_mode = SelfTradePreventionMode::from_str(&config.stp.mode)
            .map_err(|e| MatchingError::invalid_input(e.to_string()))?;

        let metrics = Arc::new(MatchingEngineMetrics::new());
        let trader_extractor: Arc<dyn TraderIdExtractor> = Arc::new(IdentityTraderIdExtractor);

        let mut books = HashMap::new();
        for raw in &config.products.instruments {
            let instrument = InstrumentId::new(raw.clone()).map_err(|e| MatchingError::invalid_input(e.to_string()))?;
            let publisher = Arc::new(crate::topofbook::TopOfBookPublisher::new(instrument.clone()));
            let book = Arc::new(ProductBook::new(
                instrument.clone(),
                hash_chain.clone(),
                publisher,
                trader_extractor.clone(),
                stp_mode,
                metrics.clone(),
            ));
            books.insert(instrument, book);
        }

        let thresholds = LatencyThresholds {
            e2e_ns: config.latency.threshold_e2e_ns,
            matching_ns: config.latency.threshold_matching_ns,
            audit_ns: config.latency.threshold_audit_ns,
        };
        let latency = LatencyMonitor::new(config.latency.reservoir_size, thresholds);

        Ok(Self::new(ProductManager::new(books), hash_chain, latency, metrics))
    }

    pub fn hash_chain(&self) -> &Arc<HashChain> {
        &self.hash_chain
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn latency_stats(&self) -> Option<LatencyStats> {
        self.latency.e2e_stats()
    }

    /// Hands a finished timeline to both the reservoir-based `LatencyMonitor`
    /// and the ambient `order_processing_latency` histogram, so the two
    /// observability surfaces (percentiles over recent admissions, and a
    /// running avg/min/max) never drift apart on what counts as "latency".
    fn record_timeline(&self, timeline: TimelineRecorder) {
        let finished = timeline.finish();
        if let Some(e2e_ns) = finished.e2e_ns() {
            self.metrics.record_latency(std::time::Duration::from_nanos(e2e_ns));
        }
        self.latency.record(finished);
    }

    /// Admit a single order (`submit_order`). Returns the assigned
    /// `order_id` alongside the full admission outcome.
    pub fn submit_order(&self, request: SubmitOrder) -> Result<(String, AdmissionOutcome)> {
        let book = self.products.get(&request.instrument)?;
        let mut timeline = TimelineRecorder::start();
        timeline.checkpoint_request_received();
        timeline.checkpoint_deserialized();

        let order_id = uuid::Uuid::new_v4().to_string();
        let order = Order::new(
            order_id.clone(),
            request.user,
            request.instrument,
            request.side,
            request.price,
            request.volume,
            book.next_seq(),
            request.order_type,
            request.link_type,
            request.linked_order_id,
        )?;
        timeline.checkpoint_validated();

        let outcome = book.add(order, &mut timeline)?;
        self.record_timeline(timeline);
        Ok((order_id, outcome))
    }

    /// Admit a two-sided quote (`submit_quote`). Returns `(buy_id, sell_id)`
    /// alongside the full admission outcome.
    pub fn submit_quote(&self, request: SubmitQuote) -> Result<(String, String, QuoteAdmissionOutcome)> {
        let book = self.products.get(&request.instrument)?;
        let mut timeline = TimelineRecorder::start();
        timeline.checkpoint_request_received();
        timeline.checkpoint_deserialized();

        let buy_id = uuid::Uuid::new_v4().to_string();
        let sell_id = uuid::Uuid::new_v4().to_string();
        let buy = QuoteSide::new(
            buy_id.clone(),
            request.user.clone(),
            request.instrument.clone(),
            Side::Buy,
            request.buy_price,
            request.buy_volume,
            book.next_seq(),
        )?;
        let sell = QuoteSide::new(
            sell_id.clone(),
            request.user,
            request.instrument,
            Side::Sell,
            request.sell_price,
            request.sell_volume,
            book.next_seq(),
        )?;
        timeline.checkpoint_validated();

        let outcome = book.add_quote(buy, sell, &mut timeline)?;
        self.record_timeline(timeline);
        Ok((buy_id, sell_id, outcome))
    }

    /// Cancel a resting order (`cancel_order`).
    pub fn cancel_order(&self, instrument: &InstrumentId, side: Side, order_id: &str) -> Result<CancelOutcome> {
        let book = self.products.get(instrument)?;
        let mut timeline = TimelineRecorder::start();
        timeline.checkpoint_request_received();
        timeline.checkpoint_deserialized();
        timeline.checkpoint_validated();

        let outcome = book.cancel(side, order_id, &mut timeline)?;
        self.record_timeline(timeline);
        Ok(outcome)
    }

    /// Cancel both quote sides resting for `user` on `instrument`.
    pub fn remove_quotes_for_user(&self, instrument: &InstrumentId, user: &UserId) -> Result<Vec<CancelOutcome>> {
        let book = self.products.get(instrument)?;
        let mut timeline = TimelineRecorder::start();
        timeline.checkpoint_request_received();
        timeline.checkpoint_deserialized();
        timeline.checkpoint_validated();

        let outcomes = book.remove_quotes_for_user(user, &mut timeline)?;
        self.record_timeline(timeline);
        Ok(outcomes)
    }

    /// Query top-of-book (`query_top_of_book`).
    pub fn top_of_book(&self, instrument: &InstrumentId) -> Result<TopOfBookSnapshot> {
        Ok(self.products.get(instrument)?.top_of_book())
    }
}
