//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     trigger() → foyers stop accepting → sessions close → serve tasks return
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → shutdown_signal() resolves → Aggregator::stop()
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: foyers first, then stage executors drain
//! - No forced cancellation of submitted handler work

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
