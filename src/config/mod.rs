//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HorizonConfig (validated, immutable)
//!     → read once by the aggregator builder at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload because the
//!   registries it feeds are frozen at start
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    FoyerConfig, HorizonConfig, LimitsConfig, ObservabilityConfig, RouteConfig, StageConfig,
    StagesConfig, TimeoutConfig, WebSocketConfig,
};
pub use validation::{validate_config, ValidationError};
