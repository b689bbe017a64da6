//! Tamper-evident, hash-chained audit trail.
//!
//! The envelope is a tagged enum of event kinds carrying a free-form data
//! map, serialized with `serde`. Each event's canonical JSON is hashed with
//! `sha2` together with the previous event's digest, so any edit to a past
//! event is detectable without needing to compare against a second copy of
//! the log.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{MatchingError, Result};

/// Fixed set of audit event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderPlaced,
    OrderCancelled,
    OrderFilled,
    OrderPartiallyFilled,
    OrderRejected,
    QuoteSubmitted,
    TradeExecuted,
    MarketUpdate,
    SystemStart,
    SystemShutdown,
}

/// Free-form payload attached to an event. Values are strings, integers,
/// or decimals rendered as strings. A `BTreeMap` keeps keys sorted,
/// which is also what makes the canonical serialization below
/// deterministic.
pub type AuditData = BTreeMap<String, serde_json::Value>;

/// An immutable, hashed audit record. Once constructed by [`HashChain::append`]
/// it is never mutated again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(rename = "eventId")]
    pub event_id: String,
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    pub timestamp: String,
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    pub product: Option<String>,
    pub data: AuditData,
    pub hash: String,
    #[serde(rename = "previousHash")]
    pub previous_hash: String,
}

/// The subset of [`AuditEvent`] that participates in the hash, in the
/// exact field set the verifier must reconstruct. Changing this shape is a
/// breaking change to every historical log.
#[derive(Serialize)]
struct HashedFields<'a> {
    #[serde(rename = "eventId")]
    event_id: &'a str,
    #[serde(rename = "eventType")]
    event_type: EventType,
    timestamp: &'a str,
    #[serde(rename = "userId")]
    user_id: &'a Option<String>,
    product: &'a Option<String>,
    data: &'a AuditData,
}

fn canonical_json(event: &AuditEvent) -> Result<String> {
    let hashed = HashedFields {
        event_id: &event.event_id,
        event_type: event.event_type,
        timestamp: &event.timestamp,
        user_id: &event.user_id,
        product: &event.product,
        data: &event.data,
    };
    // serde_json's default `Map` is BTreeMap-backed (no `preserve_order`
    // feature enabled anywhere in this workspace), so keys at every level
    // serialize in lexicographic order without extra sorting here.
    serde_json::to_string(&hashed)
        .map_err(|e| MatchingError::invariant_violation(format!("audit event not serializable: {e}")))
}

fn digest(previous_hash: &str, canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(canonical.as_bytes());
    hex::encode(hasher.finalize())
}

/// A sink that receives every frozen [`AuditEvent`] as it is appended.
/// Implementations are invoked synchronously inside `HashChain::append` so
/// causal order is preserved.
pub trait AuditSink: Send + Sync {
    fn write(&self, event: &AuditEvent) -> Result<()>;

    /// Primary sinks must succeed; failure there is fatal to preserve
    /// chain integrity. Advisory sinks log and continue.
    fn is_primary(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "sink"
    }
}

/// An in-process ring buffer, used for tests and local subscribers.
/// Advisory: never primary.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit sink mutex poisoned").clone()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn write(&self, event: &AuditEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| MatchingError::internal("in-memory audit sink mutex poisoned"))?
            .push(event.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}

/// Appends newline-delimited JSON audit events to a file. Primary: per
/// The file sink is the source of truth; its failure is fatal.
pub struct FileAuditSink {
    path: std::path::PathBuf,
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    pub fn open(path: impl Into<std::path::PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| MatchingError::other(format!("opening audit file {path:?}: {e}")))?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for FileAuditSink {
    fn write(&self, event: &AuditEvent) -> Result<()> {
        use std::io::Write;
        let mut line = serde_json::to_string(event)
            .map_err(|e| MatchingError::internal(format!("serializing audit event: {e}")))?;
        line.push('\n');
        let mut file = self
            .file
            .lock()
            .map_err(|_| MatchingError::internal("file audit sink mutex poisoned"))?;
        file.write_all(line.as_bytes())
            .map_err(|e| MatchingError::sink_failure(format!("writing {:?}: {e}", self.path)))
    }

    fn is_primary(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// Placeholder for the `database` entry in `audit.sinks` config. Real
/// relational persistence of the audit trail is an external collaborator
/// (this crate is not a database client); this sink just logs
/// what would have been persisted, so a configured `database` sink doesn't
/// silently vanish while no such client exists.
#[derive(Debug, Default)]
pub struct NullAdvisorySink;

impl AuditSink for NullAdvisorySink {
    fn write(&self, event: &AuditEvent) -> Result<()> {
        tracing::debug!(event_id = %event.event_id, event_type = ?event.event_type, "database audit sink not configured, dropping");
        Ok(())
    }

    fn name(&self) -> &str {
        "database"
    }
}

/// Unhashed ingredients for the next event. The chain assigns `previous_hash`
/// and `hash`; callers never construct those.
pub struct NewEvent {
    pub event_type: EventType,
    pub user_id: Option<String>,
    pub product: Option<String>,
    pub data: AuditData,
}

/// A single, globally totally-ordered hash chain shared by every
/// `ProductBook` (independent of, and never nested inside, a
/// ProductBook lock in the forbidden direction).
pub struct HashChain {
    previous_hash: Mutex<String>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl HashChain {
    pub fn new(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            previous_hash: Mutex::new("0".to_string()),
            sinks,
        }
    }

    pub fn append(&self, new_event: NewEvent) -> Result<AuditEvent> {
        let mut previous_hash = self
            .previous_hash
            .lock()
            .map_err(|_| MatchingError::internal("hash chain mutex poisoned"))?;

        let mut event = AuditEvent {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type: new_event.event_type,
            timestamp: Utc::now().to_rfc3339(),
            user_id: new_event.user_id,
            product: new_event.product,
            data: new_event.data,
            hash: String::new(),
            previous_hash: previous_hash.clone(),
        };

        let canonical = canonical_json(&event)?;
        event.hash = digest(&event.previous_hash, &canonical);
        *previous_hash = event.hash.clone();

        // Sink dispatch stays under the same guard as the pointer update:
        // releasing it first would let two instruments' `append` calls
        // interleave their writes, so the file sink's physical order could
        // diverge from the logical `previous_hash` chain it is supposed to
        // mirror.
        for sink in &self.sinks {
            if let Err(e) = sink.write(&event) {
                if sink.is_primary() {
                    return Err(MatchingError::sink_failure(format!(
                        "primary sink '{}' failed: {e}",
                        sink.name()
                    )));
                }
                tracing::warn!(sink = sink.name(), error = %e, "advisory audit sink failed");
            }
        }
        drop(previous_hash);

        Ok(event)
    }
}

/// One discrepancy found while replaying a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainError {
    pub offset: usize,
    pub expected: String,
    pub observed: String,
    pub reason: &'static str,
}

/// Accumulates every discrepancy rather than stopping at the first one, to
/// aid forensics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainVerificationReport {
    pub errors: Vec<ChainError>,
}

impl ChainVerificationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Replays `events` in append order, recomputing each hash and checking
/// linkage to the prior event.
pub fn verify_chain(events: &[AuditEvent]) -> Result<ChainVerificationReport> {
    let mut report = ChainVerificationReport::default();
    let mut expected_previous = "0".to_string();

    for (offset, event) in events.iter().enumerate() {
        if event.previous_hash != expected_previous {
            report.errors.push(ChainError {
                offset,
                expected: expected_previous.clone(),
                observed: event.previous_hash.clone(),
                reason: "previous_hash does not match prior event's hash",
            });
        }

        let canonical = canonical_json(event)?;
        let recomputed = digest(&event.previous_hash, &canonical);
        if recomputed != event.hash {
            report.errors.push(ChainError {
                offset,
                expected: recomputed.clone(),
                observed: event.hash.clone(),
                reason: "stored hash does not match recomputed hash",
            });
        }

        expected_previous = event.hash.clone();
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(pairs: &[(&str, &str)]) -> AuditData {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn first_event_chains_from_zero() {
        let chain = HashChain::new(vec![Box::new(InMemoryAuditSink::new())]);
        let event = chain
            .append(NewEvent {
                event_type: EventType::SystemStart,
                user_id: None,
                product: None,
                data: data(&[]),
            })
            .unwrap();
        assert_eq!(event.previous_hash, "0");
        assert_eq!(event.hash.len(), 64);
    }

    #[test]
    fn chain_of_events_links_correctly_and_verifies() {
        let chain = HashChain::new(vec![Box::new(InMemoryAuditSink::new())]);
        let mut events = Vec::new();
        for i in 0..3 {
            events.push(
                chain
                    .append(NewEvent {
                        event_type: EventType::OrderPlaced,
                        user_id: Some("alice".into()),
                        product: Some("AAPL".into()),
                        data: data(&[("seq", &i.to_string())]),
                    })
                    .unwrap(),
            );
        }
        assert_eq!(events[1].previous_hash, events[0].hash);
        assert_eq!(events[2].previous_hash, events[1].hash);
        let report = verify_chain(&events).unwrap();
        assert!(report.is_valid());
    }

    #[test]
    fn tampering_with_a_middle_event_is_detected_without_short_circuiting() {
        let chain = HashChain::new(vec![Box::new(InMemoryAuditSink::new())]);
        let mut events = Vec::new();
        for i in 0..3 {
            events.push(
                chain
                    .append(NewEvent {
                        event_type: EventType::OrderPlaced,
                        user_id: Some("alice".into()),
                        product: Some("AAPL".into()),
                        data: data(&[("seq", &i.to_string())]),
                    })
                    .unwrap(),
            );
        }

        events[1]
            .data
            .insert("seq".to_string(), serde_json::Value::String("tampered".into()));

        let report = verify_chain(&events).unwrap();
        assert!(!report.is_valid());
        let offsets: Vec<usize> = report.errors.iter().map(|e| e.offset).collect();
        assert!(offsets.contains(&1));
        assert!(offsets.contains(&2));
    }

    #[test]
    fn primary_sink_failure_propagates_as_sink_failure() {
        struct AlwaysFails;
        impl AuditSink for AlwaysFails {
            fn write(&self, _event: &AuditEvent) -> Result<()> {
                Err(MatchingError::sink_failure("disk full"))
            }
            fn is_primary(&self) -> bool {
                true
            }
        }
        let chain = HashChain::new(vec![Box::new(AlwaysFails)]);
        let result = chain.append(NewEvent {
            event_type: EventType::SystemStart,
            user_id: None,
            product: None,
            data: data(&[]),
        });
        assert!(result.is_err());
    }

    #[test]
    fn advisory_sink_failure_does_not_block_append() {
        struct AlwaysFails;
        impl AuditSink for AlwaysFails {
            fn write(&self, _event: &AuditEvent) -> Result<()> {
                Err(MatchingError::sink_failure("unreachable"))
            }
        }
        let chain = HashChain::new(vec![Box::new(AlwaysFails), Box::new(InMemoryAuditSink::new())]);
        let result = chain.append(NewEvent {
            event_type: EventType::SystemStart,
            user_id: None,
            product: None,
            data: data(&[]),
        });
        assert!(result.is_ok());
    }
}
