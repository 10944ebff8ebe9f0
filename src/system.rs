//! Built-in `system.*` intents.
//!
//! | intent           | REST           | returns                                |
//! |------------------|----------------|----------------------------------------|
//! | `system.welcome` | `GET /`        | name, version, protocols               |
//! | `system.health`  | `GET /system/health`  | status, uptime                  |
//! | `system.intents` | `GET /system/intents` | sorted registered patterns      |
//! | `system.metrics` | `GET /system/metrics` | in-memory collector snapshot    |

use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

use crate::aggregator::{Aggregator, AggregatorError};
use crate::observability::InMemoryCollector;
use crate::registry::{HandlerError, Invocation};

/// Static facts reported by the system intents.
#[derive(Debug, Clone)]
pub struct SystemInfo {
    pub name: String,
    pub version: String,
    pub started_at: Instant,
    pub collector: Option<Arc<InMemoryCollector>>,
}

impl SystemInfo {
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
            collector: None,
        }
    }

    pub fn with_collector(mut self, collector: Arc<InMemoryCollector>) -> Self {
        self.collector = Some(collector);
        self
    }
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self::new()
    }
}

pub fn register_system_handlers(
    aggregator: &mut Aggregator,
    info: SystemInfo,
) -> Result<(), AggregatorError> {
    let catalog = aggregator.catalog();
    let info = Arc::new(info);

    let welcome = {
        let info = Arc::clone(&info);
        let catalog = catalog.clone();
        move |_: &Invocation| -> Result<Value, HandlerError> {
            Ok(json!({
                "message": format!("Welcome to {}", info.name),
                "name": info.name,
                "version": info.version,
                "protocols": catalog.protocols(),
            }))
        }
    };

    let health = {
        let info = Arc::clone(&info);
        move |_: &Invocation| -> Result<Value, HandlerError> {
            Ok(json!({
                "status": "up",
                "uptime_secs": info.started_at.elapsed().as_secs(),
            }))
        }
    };

    let intents = move |_: &Invocation| -> Result<Value, HandlerError> {
        Ok(json!({ "intents": catalog.intents() }))
    };

    let metrics = move |_: &Invocation| -> Result<Value, HandlerError> {
        let collector = info
            .collector
            .as_ref()
            .ok_or_else(|| HandlerError::not_found("metrics collector is not enabled"))?;
        serde_json::to_value(collector.snapshot()).map_err(|e| HandlerError::failed(e.to_string()))
    };

    aggregator.register_handler("system.welcome", welcome)?;
    aggregator.register_handler("system.health", health)?;
    aggregator.register_handler("system.intents", intents)?;
    aggregator.register_handler("system.metrics", metrics)?;
    Ok(())
}
