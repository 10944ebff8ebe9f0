//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Rendezvous (per finished request)
//!     → RequestEvent
//!     → central stage
//!     → Collector (injected)
//!         → MetricsCollector  → metrics facade → Prometheus exporter
//!         → InMemoryCollector → system.metrics intent
//!
//! All subsystems:
//!     → tracing events (structured fields, trace_id span per request)
//! ```
//!
//! # Design Decisions
//! - Trace ID flows through all stages via the request span
//! - Metrics are cheap (atomic increments)
//! - Exporter and subscriber are installed by the binary only

pub mod collector;
pub mod logging;
pub mod metrics;

pub use collector::{
    Collector, CollectorSnapshot, FanoutCollector, InMemoryCollector, IntentStats,
    MetricsCollector, NoopCollector, RequestEvent, SUCCESS,
};
pub use logging::{init_logging, DEFAULT_FILTER};
pub use metrics::{init_metrics, record_request};
