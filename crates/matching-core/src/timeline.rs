//! Per-admission latency instrumentation.
//!
//! Checkpoints are captured at each stage of admission (T0 through T10) and
//! fed into a bounded reservoir rather than a fixed-bucket histogram like
//! `metrics.rs`'s `Histogram`, so percentiles are computed exactly over the
//! retained samples instead of being bucket-approximated.

use std::collections::VecDeque;
use std::time::Instant;

use parking_lot::RwLock;

/// The eleven named checkpoints an admission passes through, captured as
/// nanoseconds elapsed since the timeline started.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderProcessingTimeline {
    pub t0_request_received: Option<u64>,
    pub t1_deserialized: Option<u64>,
    pub t2_validated: Option<u64>,
    pub t3_lock_acquired: Option<u64>,
    pub t4_matching_begins: Option<u64>,
    pub t5_matching_complete: Option<u64>,
    pub t6_execution_begins: Option<u64>,
    pub t7_execution_done: Option<u64>,
    pub t8_audit_begins: Option<u64>,
    pub t9_audit_complete: Option<u64>,
    pub t10_response_sent: Option<u64>,
}

impl OrderProcessingTimeline {
    /// T0 -> T10. The primary latency figure gated against
    /// `latency.threshold_e2e_ns`.
    pub fn e2e_ns(&self) -> Option<u64> {
        Some(self.t10_response_sent?.saturating_sub(self.t0_request_received?))
    }

    /// T4 -> T5, gated against `latency.threshold_matching_ns`.
    pub fn matching_ns(&self) -> Option<u64> {
        Some(self.t5_matching_complete?.saturating_sub(self.t4_matching_begins?))
    }

    /// T6 -> T7.
    pub fn execution_ns(&self) -> Option<u64> {
        Some(self.t7_execution_done?.saturating_sub(self.t6_execution_begins?))
    }

    /// T8 -> T9, gated against `latency.threshold_audit_ns`.
    pub fn audit_ns(&self) -> Option<u64> {
        Some(self.t9_audit_complete?.saturating_sub(self.t8_audit_begins?))
    }

    /// T2 -> T3.
    pub fn lock_wait_ns(&self) -> Option<u64> {
        Some(self.t3_lock_acquired?.saturating_sub(self.t2_validated?))
    }

    /// Testable property 7: `T0 <= T1 <= ... <= T10`.
    pub fn is_monotonic(&self) -> bool {
        let checkpoints = [
            self.t0_request_received,
            self.t1_deserialized,
            self.t2_validated,
            self.t3_lock_acquired,
            self.t4_matching_begins,
            self.t5_matching_complete,
            self.t6_execution_begins,
            self.t7_execution_done,
            self.t8_audit_begins,
            self.t9_audit_complete,
            self.t10_response_sent,
        ];
        checkpoints
            .windows(2)
            .all(|pair| match (pair[0], pair[1]) {
                (Some(a), Some(b)) => a <= b,
                _ => true,
            })
    }
}

/// Records checkpoints for one in-flight admission against a monotonic
/// clock, then hands the finished timeline to a `LatencyMonitor`.
pub struct TimelineRecorder {
    start: Instant,
    timeline: OrderProcessingTimeline,
}

impl TimelineRecorder {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
            timeline: OrderProcessingTimeline::default(),
        }
    }

    fn mark(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }

    pub fn checkpoint_request_received(&mut self) {
        self.timeline.t0_request_received = Some(self.mark());
    }

    pub fn checkpoint_deserialized(&mut self) {
        self.timeline.t1_deserialized = Some(self.mark());
    }

    pub fn checkpoint_validated(&mut self) {
        self.timeline.t2_validated = Some(self.mark());
    }

    pub fn checkpoint_lock_acquired(&mut self) {
        self.timeline.t3_lock_acquired = Some(self.mark());
    }

    pub fn checkpoint_matching_begins(&mut self) {
        self.timeline.t4_matching_begins = Some(self.mark());
    }

    pub fn checkpoint_matching_complete(&mut self) {
        self.timeline.t5_matching_complete = Some(self.mark());
    }

    pub fn checkpoint_execution_begins(&mut self) {
        self.timeline.t6_execution_begins = Some(self.mark());
    }

    pub fn checkpoint_execution_done(&mut self) {
        self.timeline.t7_execution_done = Some(self.mark());
    }

    pub fn checkpoint_audit_begins(&mut self) {
        self.timeline.t8_audit_begins = Some(self.mark());
    }

    pub fn checkpoint_audit_complete(&mut self) {
        self.timeline.t9_audit_complete = Some(self.mark());
    }

    pub fn checkpoint_response_sent(&mut self) {
        self.timeline.t10_response_sent = Some(self.mark());
    }

    pub fn finish(self) -> OrderProcessingTimeline {
        self.timeline
    }
}

/// Thresholds a timeline is checked against to flag a violation.
#[derive(Debug, Clone, Copy)]
pub struct LatencyThresholds {
    pub e2e_ns: u64,
    pub matching_ns: u64,
    pub audit_ns: u64,
}

/// Min/mean/max plus the four documented percentiles over a reservoir of
/// recent timelines' end-to-end latency.
#[derive(Debug, Clone, Copy)]
pub struct LatencyStats {
    pub count: usize,
    pub min_ns: u64,
    pub mean_ns: u64,
    pub max_ns: u64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
    pub p999_ns: u64,
}

fn percentile(sorted: &[u64], p: f64) -> u64 {
    let idx = ((p / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn stats_from(mut values: Vec<u64>) -> LatencyStats {
    values.sort_unstable();
    let count = values.len();
    let sum: u64 = values.iter().sum();
    LatencyStats {
        count,
        min_ns: values[0],
        mean_ns: sum / count as u64,
        max_ns: values[count - 1],
        p50_ns: percentile(&values, 50.0),
        p95_ns: percentile(&values, 95.0),
        p99_ns: percentile(&values, 99.0),
        p999_ns: percentile(&values, 99.9),
    }
}

/// Bounded reservoir of recently completed timelines plus a bounded log of
/// those that breached a configured threshold.
pub struct LatencyMonitor {
    capacity: usize,
    thresholds: LatencyThresholds,
    reservoir: RwLock<VecDeque<OrderProcessingTimeline>>,
    violations: RwLock<VecDeque<OrderProcessingTimeline>>,
}

impl LatencyMonitor {
    pub fn new(capacity: usize, thresholds: LatencyThresholds) -> Self {
        Self {
            capacity: capacity.max(1),
            thresholds,
            reservoir: RwLock::new(VecDeque::new()),
            violations: RwLock::new(VecDeque::new()),
        }
    }

    fn breaches(&self, timeline: &OrderProcessingTimeline) -> bool {
        timeline.e2e_ns().is_some_and(|v| v > self.thresholds.e2e_ns)
            || timeline.matching_ns().is_some_and(|v| v > self.thresholds.matching_ns)
            || timeline.audit_ns().is_some_and(|v| v > self.thresholds.audit_ns)
    }

    pub fn record(&self, timeline: OrderProcessingTimeline) {
        let breaches = self.breaches(&timeline);

        let mut reservoir = self.reservoir.write();
        reservoir.push_back(timeline);
        if reservoir.len() > self.capacity {
            reservoir.pop_front();
        }
        drop(reservoir);

        if breaches {
            let mut violations = self.violations.write();
            violations.push_back(timeline);
            if violations.len() > self.capacity {
                violations.pop_front();
            }
            tracing::warn!(
                e2e_ns = ?timeline.e2e_ns(),
                matching_ns = ?timeline.matching_ns(),
                audit_ns = ?timeline.audit_ns(),
                "admission breached a latency threshold"
            );
        }
    }

    /// End-to-end latency percentiles over the current reservoir, or `None`
    /// if nothing has been recorded yet.
    pub fn e2e_stats(&self) -> Option<LatencyStats> {
        let values: Vec<u64> = self
            .reservoir
            .read()
            .iter()
            .filter_map(|t| t.e2e_ns())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(stats_from(values))
    }

    pub fn violations(&self) -> Vec<OrderProcessingTimeline> {
        self.violations.read().iter().copied().collect()
    }

    pub fn reservoir_len(&self) -> usize {
        self.reservoir.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thresholds() -> LatencyThresholds {
        LatencyThresholds {
            e2e_ns: 1_000_000,
            matching_ns: 100_000,
            audit_ns: 500_000,
        }
    }

    fn timeline_with_e2e(ns: u64) -> OrderProcessingTimeline {
        OrderProcessingTimeline {
            t0_request_received: Some(0),
            t1_deserialized: Some(1),
            t2_validated: Some(2),
            t3_lock_acquired: Some(3),
            t4_matching_begins: Some(4),
            t5_matching_complete: Some(5),
            t6_execution_begins: Some(6),
            t7_execution_done: Some(7),
            t8_audit_begins: Some(8),
            t9_audit_complete: Some(9),
            t10_response_sent: Some(ns),
        }
    }

    #[test]
    fn recorder_produces_a_monotonic_timeline() {
        let mut recorder = TimelineRecorder::start();
        recorder.checkpoint_request_received();
        recorder.checkpoint_deserialized();
        recorder.checkpoint_validated();
        recorder.checkpoint_lock_acquired();
        recorder.checkpoint_matching_begins();
        recorder.checkpoint_matching_complete();
        recorder.checkpoint_execution_begins();
        recorder.checkpoint_execution_done();
        recorder.checkpoint_audit_begins();
        recorder.checkpoint_audit_complete();
        recorder.checkpoint_response_sent();
        let timeline = recorder.finish();
        assert!(timeline.is_monotonic());
        assert!(timeline.e2e_ns().is_some());
    }

    #[test]
    fn monitor_computes_percentiles_over_the_reservoir() {
        let monitor = LatencyMonitor::new(10, thresholds());
        for ns in [100, 200, 300, 400, 500] {
            monitor.record(timeline_with_e2e(ns));
        }
        let stats = monitor.e2e_stats().unwrap();
        assert_eq!(stats.count, 5);
        assert_eq!(stats.min_ns, 100);
        assert_eq!(stats.max_ns, 500);
        assert_eq!(stats.mean_ns, 300);
    }

    #[test]
    fn reservoir_is_bounded_to_capacity() {
        let monitor = LatencyMonitor::new(3, thresholds());
        for ns in 0..10u64 {
            monitor.record(timeline_with_e2e(ns));
        }
        assert_eq!(monitor.reservoir_len(), 3);
    }

    #[test]
    fn breaching_timelines_are_flagged_as_violations() {
        let monitor = LatencyMonitor::new(10, thresholds());
        monitor.record(timeline_with_e2e(2_000_000));
        assert_eq!(monitor.violations().len(), 1);
    }

    #[test]
    fn non_breaching_timelines_are_not_flagged() {
        let monitor = LatencyMonitor::new(10, thresholds());
        monitor.record(timeline_with_e2e(500));
        assert!(monitor.violations().is_empty());
    }
}
