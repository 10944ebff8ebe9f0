//! Horizon demo server.
//!
//! # Architecture Overview
//!
//! ```text
//!   HTTP ──▶ HttpFoyer ──┐
//!   WS   ──▶ WsFoyer   ──┤        ┌──────────────── Rendezvous<I, O> ─────────────────┐
//!   RPC  ──▶ RpcFoyer  ──┼──────▶ │ inbound sentinels → normalize → resolve intent    │
//!                        │        │   → HandlerRegistry → conductor pool → handler    │
//!                        │        │   → OutputBuilder → outbound sentinels            │
//!                        │        └───────────────────────────┬───────────────────────┘
//!                        │                                    │ RequestEvent
//!                        ▼                                    ▼
//!                 response written                 central pool → Collector
//! ```
//!
//! Usage: `horizon [config.toml]` (or `HORIZON_CONFIG=config.toml horizon`).

use std::path::Path;
use std::sync::Arc;

use horizon::config::{load_config, HorizonConfig};
use horizon::demo::{register_demo_handlers, UserStore};
use horizon::foyer::{HttpFoyer, RpcFoyer, WebSocketFoyer};
use horizon::intent::DeclarativeResolver;
use horizon::lifecycle::shutdown_signal;
use horizon::model::Scheme;
use horizon::observability::{
    init_logging, init_metrics, FanoutCollector, InMemoryCollector, MetricsCollector,
};
use horizon::protocol::http::{http_protocol, http_protocol_with};
use horizon::protocol::rpc::rpc_protocol;
use horizon::protocol::websocket::websocket_protocol;
use horizon::system::{register_system_handlers, SystemInfo};
use horizon::Aggregator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("HORIZON_CONFIG").ok());
    let config = match &config_path {
        Some(path) => load_config(Path::new(path))?,
        None => HorizonConfig::default(),
    };

    init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = config_path.as_deref().unwrap_or("<defaults>"),
        "horizon starting"
    );

    let memory = Arc::new(InMemoryCollector::new());
    let mut collector = FanoutCollector::new().with(memory.clone());
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                init_metrics(addr)?;
                collector = collector.with(Arc::new(MetricsCollector));
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut aggregator = Aggregator::from_config(&config, Arc::new(collector));

    if config.http.enabled {
        let protocol = if config.routes.is_empty() {
            http_protocol()
        } else {
            http_protocol_with(DeclarativeResolver::from_config(&config.routes))
        };
        aggregator.register_protocol(protocol, HttpFoyer::from_config(&config))?;
    }
    if config.websocket.enabled {
        aggregator.register_protocol(websocket_protocol(), WebSocketFoyer::from_config(&config))?;
    }
    if config.rpc.enabled {
        aggregator.register_protocol(rpc_protocol(), RpcFoyer::from_config(&config))?;
    }

    register_system_handlers(&mut aggregator, SystemInfo::new().with_collector(memory))?;
    register_demo_handlers(&mut aggregator, Arc::new(UserStore::new()))?;

    aggregator.start().await?;
    for scheme in [Scheme::HTTP, Scheme::WEBSOCKET, Scheme::RPC] {
        if let Some(addr) = aggregator.local_addr(&scheme) {
            tracing::info!(scheme = %scheme, address = %addr, "Accepting requests");
        }
    }

    shutdown_signal().await;
    aggregator.stop().await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
