//! Foyers: transport endpoints that feed a rendezvous.
//!
//! # Data Flow
//! ```text
//! socket / channel
//!     → decode into RawInput           (foyer)
//!     → tokio::spawn(encounter(input)) (rendezvous)
//!     → write RawOutput back           (foyer)
//!
//! http.rs       axum fallback handler, request timeout layer
//! rpc.rs        axum POST /{service}/{method}, request timeout layer
//! websocket.rs  axum upgrade, per-session idle + per-frame write timeouts
//! topic.rs      in-process publish channel, reply timeout
//! ```
//!
//! # Design Decisions
//! - `open` is synchronous: binding errors surface before `start()` returns
//! - A panicked pipeline task is answered with the protocol's generic 500
//! - Timeouts here bound the transport only, never the handler

pub mod http;
pub mod listener;
pub mod rpc;
pub mod session;
pub mod topic;
pub mod websocket;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::model::{RawInput, RawOutput, Scheme};
use crate::rendezvous::Rendezvous;

pub use http::HttpFoyer;
pub use rpc::RpcFoyer;
pub use session::{SessionGuard, SessionId, SessionTracker};
pub use topic::{TopicFoyer, TopicPublisher};
pub use websocket::WebSocketFoyer;

/// Error type for foyer operations.
#[derive(Debug, thiserror::Error)]
pub enum FoyerError {
    #[error("invalid bind address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("foyer is already open")]
    AlreadyOpen,

    #[error("foyer is closed")]
    Closed,

    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    #[error("serve task failed: {0}")]
    Serve(String),
}

/// A transport endpoint bound to one protocol.
pub trait Foyer: Send + 'static {
    type Input: RawInput;
    type Output: RawOutput;

    fn scheme(&self) -> Scheme;

    /// Bind and start serving. Must be called inside a tokio runtime.
    fn open(
        &mut self,
        rendezvous: Arc<Rendezvous<Self::Input, Self::Output>>,
    ) -> Result<(), FoyerError>;

    /// Stop accepting and wait for in-flight transport work to finish.
    fn close(&mut self) -> BoxFuture<'_, Result<(), FoyerError>>;

    fn is_open(&self) -> bool;

    /// Bound address, once open. `None` for in-process transports.
    fn local_addr(&self) -> Option<SocketAddr>;
}
