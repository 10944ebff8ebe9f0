//! Horizon: a protocol-neutral request pipeline.
//!
//! Requests arriving over HTTP, WebSocket, RPC or pub/sub topics are
//! normalized, mapped to an intent and dispatched to a registered handler.
//! The result is rendered back in the caller's protocol.

// Core model
pub mod error;
pub mod model;

// Pipeline
pub mod intent;
pub mod protocol;
pub mod registry;
pub mod rendezvous;
pub mod sentinel;
pub mod stage;

// Transports and assembly
pub mod aggregator;
pub mod foyer;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

// Built-in intents
pub mod demo;
pub mod system;

pub use aggregator::{Aggregator, AggregatorError, AggregatorState};
pub use config::HorizonConfig;
pub use error::{ErrorKind, PipelineError};
pub use rendezvous::Rendezvous;
