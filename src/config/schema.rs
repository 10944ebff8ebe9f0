//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for a Horizon
//! instance. All types derive Serde traits for deserialization from config files.

use std::thread;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HorizonConfig {
    /// HTTP foyer.
    pub http: FoyerConfig,

    /// WebSocket foyer.
    pub websocket: WebSocketConfig,

    /// RPC foyer (unary JSON calls addressed by `Service/Method`).
    pub rpc: FoyerConfig,

    /// Transport-level timeouts applied by the foyers.
    pub timeouts: TimeoutConfig,

    /// Worker pools backing the pipeline stages.
    pub stages: StagesConfig,

    /// Request limits enforced by built-in sentinels.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Declarative HTTP routes (method + template → intent).
    pub routes: Vec<RouteConfig>,
}

impl Default for HorizonConfig {
    fn default() -> Self {
        Self {
            http: FoyerConfig::with_address("127.0.0.1:8080"),
            websocket: WebSocketConfig::default(),
            rpc: FoyerConfig::with_address("127.0.0.1:8082"),
            timeouts: TimeoutConfig::default(),
            stages: StagesConfig::default(),
            limits: LimitsConfig::default(),
            observability: ObservabilityConfig::default(),
            routes: Vec::new(),
        }
    }
}

/// A request/response foyer bound to a TCP address.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FoyerConfig {
    pub enabled: bool,

    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for FoyerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

impl FoyerConfig {
    pub fn with_address(bind_address: impl Into<String>) -> Self {
        Self {
            enabled: true,
            bind_address: bind_address.into(),
        }
    }
}

/// WebSocket foyer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub enabled: bool,

    pub bind_address: String,

    /// Upgrade path (e.g., "/ws").
    pub path: String,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            path: "/ws".to_string(),
        }
    }
}

/// Timeout configuration for the transports.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Whole-request timeout for HTTP and RPC in seconds.
    pub request_secs: u64,

    /// Idle WebSocket session timeout in seconds.
    pub idle_secs: u64,

    /// Per-frame WebSocket write timeout (and topic reply timeout) in seconds.
    pub write_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            idle_secs: 300,
            write_secs: 10,
        }
    }
}

/// Sizing of one bounded stage pool.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StageConfig {
    pub core_threads: usize,
    pub max_threads: usize,
    pub queue_capacity: usize,

    /// How long an idle non-core worker waits before retiring.
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,
}

fn default_keep_alive_ms() -> u64 {
    60_000
}

fn parallelism() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

impl StageConfig {
    /// Pre/post-processing pool: 2n core, 4n max, queue 2000.
    pub fn rendezvous_default() -> Self {
        let n = parallelism();
        Self {
            core_threads: 2 * n,
            max_threads: 4 * n,
            queue_capacity: 2000,
            keep_alive_ms: default_keep_alive_ms(),
        }
    }

    /// Handler pool: 2n core, 8n max, queue 4000.
    pub fn conductor_default() -> Self {
        let n = parallelism();
        Self {
            core_threads: 2 * n,
            max_threads: 8 * n,
            queue_capacity: 4000,
            keep_alive_ms: default_keep_alive_ms(),
        }
    }

    /// Event pool: 4n fixed, queue 100.
    pub fn central_default() -> Self {
        let n = parallelism();
        Self {
            core_threads: 4 * n,
            max_threads: 4 * n,
            queue_capacity: 100,
            keep_alive_ms: default_keep_alive_ms(),
        }
    }
}

/// Stage pools plus pipeline scheduling knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StagesConfig {
    pub rendezvous: StageConfig,
    pub conductor: StageConfig,
    pub central: StageConfig,

    /// Run normalize + interpret on the rendezvous pool instead of inline.
    pub preprocess_on_pool: bool,

    /// Stop waiting for a handler after this many milliseconds.
    pub handler_deadline_ms: Option<u64>,
}

impl Default for StagesConfig {
    fn default() -> Self {
        Self {
            rendezvous: StageConfig::rendezvous_default(),
            conductor: StageConfig::conductor_default(),
            central: StageConfig::central_default(),
            preprocess_on_pool: false,
            handler_deadline_ms: None,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted body in bytes; 0 disables the guard.
    pub max_body_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full EnvFilter).
    pub log_level: String,

    /// Install the Prometheus exporter.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "horizon=debug,tower_http=debug".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// A declarative route: requests matching `method` + `path` resolve to `intent`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteConfig {
    /// HTTP method, or `*` for any.
    #[serde(default = "default_route_method")]
    pub method: String,

    /// Path template; `{name}` captures one segment into the payload.
    pub path: String,

    /// Intent key to resolve to.
    pub intent: String,
}

fn default_route_method() -> String {
    "*".to_string()
}
