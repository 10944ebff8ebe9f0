//! Request event collectors.
//!
//! # Responsibilities
//! - Define the event emitted once per finished request
//! - Forward events to the `metrics` facade (Prometheus in the binary)
//! - Keep in-process counters for tests and the `system.metrics` intent
//!
//! # Design Decisions
//! - Collectors are injected into the aggregator; there is no global instance
//! - Events are recorded on the central stage, off the request path
//! - In-memory state uses `DashMap` so recording never takes a global lock

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;

use crate::model::{Scheme, TraceId};

/// Outcome label for successful requests.
pub const SUCCESS: &str = "success";

/// One finished request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    pub trace_id: TraceId,
    pub scheme: Scheme,
    /// `None` when the request failed before an intent was resolved.
    pub intent: Option<String>,
    /// `success` or the failure's `ErrorKind`.
    pub outcome: &'static str,
    pub status: u16,
    pub duration: Duration,
}

impl RequestEvent {
    pub fn is_success(&self) -> bool {
        self.outcome == SUCCESS
    }

    pub fn intent_label(&self) -> &str {
        self.intent.as_deref().unwrap_or("unresolved")
    }
}

/// Sink for request events.
pub trait Collector: Send + Sync + 'static {
    fn record(&self, event: &RequestEvent);
}

impl<C: Collector + ?Sized> Collector for Arc<C> {
    fn record(&self, event: &RequestEvent) {
        (**self).record(event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCollector;

impl Collector for NoopCollector {
    fn record(&self, _event: &RequestEvent) {}
}

/// Forwards events to the `metrics` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl Collector for MetricsCollector {
    fn record(&self, event: &RequestEvent) {
        crate::observability::metrics::record_request(event);
    }
}

/// Sends each event to every inner collector.
#[derive(Clone, Default)]
pub struct FanoutCollector {
    collectors: Vec<Arc<dyn Collector>>,
}

impl FanoutCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collectors.push(collector);
        self
    }
}

impl Collector for FanoutCollector {
    fn record(&self, event: &RequestEvent) {
        for collector in &self.collectors {
            collector.record(event);
        }
    }
}

#[derive(Debug, Default)]
struct IntentCounters {
    count: u64,
    errors: u64,
    total: Duration,
    min: Option<Duration>,
    max: Duration,
}

/// Timing statistics for one intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntentStats {
    pub count: u64,
    pub errors: u64,
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

/// Point-in-time copy of an [`InMemoryCollector`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectorSnapshot {
    pub total_requests: u64,
    pub by_outcome: BTreeMap<String, u64>,
    pub by_scheme: BTreeMap<String, u64>,
    pub by_intent: BTreeMap<String, IntentStats>,
}

/// Keeps counters and timing stats in process.
#[derive(Debug, Default)]
pub struct InMemoryCollector {
    total: AtomicU64,
    outcomes: DashMap<&'static str, u64>,
    schemes: DashMap<String, u64>,
    intents: DashMap<String, IntentCounters>,
}

impl InMemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.outcomes.get(outcome).map(|c| *c).unwrap_or(0)
    }

    pub fn intent_count(&self, intent: &str) -> u64 {
        self.intents.get(intent).map(|c| c.count).unwrap_or(0)
    }

    pub fn snapshot(&self) -> CollectorSnapshot {
        let by_intent = self
            .intents
            .iter()
            .map(|entry| {
                let c = entry.value();
                let mean = if c.count == 0 {
                    0.0
                } else {
                    millis(c.total) / c.count as f64
                };
                let stats = IntentStats {
                    count: c.count,
                    errors: c.errors,
                    mean_ms: mean,
                    min_ms: c.min.map(millis).unwrap_or(0.0),
                    max_ms: millis(c.max),
                };
                (entry.key().clone(), stats)
            })
            .collect();

        CollectorSnapshot {
            total_requests: self.total(),
            by_outcome: self
                .outcomes
                .iter()
                .map(|e| (e.key().to_string(), *e.value()))
                .collect(),
            by_scheme: self
                .schemes
                .iter()
                .map(|e| (e.key().clone(), *e.value()))
                .collect(),
            by_intent,
        }
    }
}

fn millis(d: Duration) -> f64 {
    d.as_micros() as f64 / 1000.0
}

impl Collector for InMemoryCollector {
    fn record(&self, event: &RequestEvent) {
        self.total.fetch_add(1, Ordering::Relaxed);
        *self.outcomes.entry(event.outcome).or_insert(0) += 1;
        *self.schemes.entry(event.scheme.to_string()).or_insert(0) += 1;

        let mut counters = self
            .intents
            .entry(event.intent_label().to_string())
            .or_default();
        counters.count += 1;
        if !event.is_success() {
            counters.errors += 1;
        }
        counters.total += event.duration;
        counters.max = counters.max.max(event.duration);
        counters.min = Some(counters.min.map_or(event.duration, |m| m.min(event.duration)));
    }
}
