//! Continuous double-auction matching engine.
//!
//! This crate implements the core order book and matching logic described by
//! the exchange's internal spec: price-time priority crossing, fill-or-kill
//! admission, one-cancels-other linkage, self-trade prevention, and a
//! tamper-evident audit trail.
//!
//! # Architecture
//!
//! A [`product_book::ProductBook`] owns one instrument's two-sided order book
//! and is the unit of locking: every admission, cancellation, and crossing
//! pass for that instrument happens under its lock. [`coordinator`] wires a
//! map of `ProductBook`s together behind a single admission entry point,
//! capturing the per-request latency timeline described in [`timeline`].
//!
//! ## Core components
//!
//! - [`price`] - fixed-point price representation
//! - [`domain`] - orders, quotes, and their lifecycle
//! - [`book_side`] - one side of one instrument's book
//! - [`product_book`] - the crossing algorithm and admission flow
//! - [`stp`] - self-trade prevention modes
//! - [`relationship`] - OCO linkage registry
//! - [`audit`] - hash-chained audit log
//! - [`topofbook`] - top-of-book publication
//! - [`timeline`] - per-admission latency instrumentation
//! - [`coordinator`] - the single entry point over all instruments
//! - [`metrics`] - ambient counters and histograms

pub mod audit;
pub mod book_side;
pub mod coordinator;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod price;
pub mod product_book;
pub mod relationship;
pub mod result;
pub mod stp;
pub mod timeline;
pub mod topofbook;

pub use audit::{AuditEvent, AuditSink, ChainVerificationReport, EventType, HashChain};
pub use coordinator::{AdmissionCoordinator, ProductManager, SubmitOrder, SubmitQuote};
pub use domain::{Core, Order, OrderType, QuoteSide, Tradable, TradableStatus};
pub use error::MatchingError;
pub use metrics::{MatchingEngineMetrics, MetricsSnapshot};
pub use price::Price;
pub use product_book::ProductBook;
pub use result::{AdmissionOutcome, CancelOutcome, QuoteAdmissionOutcome, TradeRecord};
pub use stp::SelfTradePreventionMode;
pub use timeline::{LatencyMonitor, LatencyStats, LatencyThresholds, OrderProcessingTimeline, TimelineRecorder};
pub use topofbook::{TopOfBookPublisher, TopOfBookSnapshot};
