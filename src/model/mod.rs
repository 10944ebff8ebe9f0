//! Canonical data model.
//!
//! # Data Flow
//! ```text
//! Foyer
//!     → RawInput (protocol-specific, immutable, Arc-shared)
//!     → NormalizedRequest (value, derived once)
//!     → Intent (key + payload, derived once)
//!     → ExecutionContext (request-scoped, single owner)
//!     → RawOutput (built once, handed back to the foyer)
//! ```

pub mod context;
pub mod intent;
pub mod raw;
pub mod request;
pub mod scheme;

pub use context::{ExecutionContext, TraceId};
pub use intent::{Intent, IntentKey, IntentKeyError, Payload};
pub use raw::{RawInput, RawOutput};
pub use request::{NormalizedRequest, NormalizedRequestBuilder};
pub use scheme::{Scheme, SchemeSet};
