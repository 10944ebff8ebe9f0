//! Sentinel subsystem: cross-cutting request/response interceptors.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     SentinelRegistration { schemes, order, role: Inbound | Outbound | Both }
//!     → SentinelRegistry (registration order kept)
//!     → chain_for(scheme) once per protocol at start
//!     → SentinelChain { inbound[], outbound[] } (stable-sorted by order)
//!
//! Request:
//!     inbound chain  (before normalize; first rejection short-circuits)
//!     ... pipeline ...
//!     outbound chain (after output is built; errors logged and swallowed)
//! ```
//!
//! # Design Decisions
//! - One capability trait per role; a `Both` registration holds one instance
//!   implementing both and appears in both orderings
//! - Sentinels see the context read-only; outbound ones may add output headers
//! - Equal orders keep registration order

pub mod builtin;
pub mod chain;

use std::fmt;
use std::sync::Arc;

use crate::error::{FieldErrors, PipelineError};
use crate::model::{ExecutionContext, RawOutput, SchemeSet};

pub use builtin::{ProtocolGuardSentinel, TraceHeaderSentinel, TRACE_HEADER};
pub use chain::{SentinelChain, SentinelRegistry};

/// Why an inbound sentinel refused a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    AccessDenied(String),
    Validation(FieldErrors),
}

impl Rejection {
    pub fn denied(reason: impl Into<String>) -> Self {
        Rejection::AccessDenied(reason.into())
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), message.into());
        Rejection::Validation(fields)
    }
}

impl From<Rejection> for PipelineError {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::AccessDenied(reason) => PipelineError::AccessDenied(reason),
            Rejection::Validation(fields) => PipelineError::Validation(fields),
        }
    }
}

/// Outbound sentinel failure. Logged, never rendered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct SentinelError(pub String);

/// Inspects a request before it is normalized.
pub trait InboundSentinel: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn inspect_inbound(&self, ctx: &ExecutionContext) -> Result<(), Rejection>;
}

/// Inspects (and may annotate) the output before the foyer writes it.
pub trait OutboundSentinel: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn inspect_outbound(
        &self,
        ctx: &ExecutionContext,
        output: &mut dyn RawOutput,
    ) -> Result<(), SentinelError>;
}

/// A single instance acting in both directions.
pub trait DuplexSentinel: InboundSentinel + OutboundSentinel {
    fn into_inbound(self: Arc<Self>) -> Arc<dyn InboundSentinel>;
    fn into_outbound(self: Arc<Self>) -> Arc<dyn OutboundSentinel>;
}

impl<T: InboundSentinel + OutboundSentinel> DuplexSentinel for T {
    fn into_inbound(self: Arc<Self>) -> Arc<dyn InboundSentinel> {
        self
    }

    fn into_outbound(self: Arc<Self>) -> Arc<dyn OutboundSentinel> {
        self
    }
}

/// The role a registered sentinel plays.
#[derive(Clone)]
pub enum SentinelRole {
    Inbound(Arc<dyn InboundSentinel>),
    Outbound(Arc<dyn OutboundSentinel>),
    Both(Arc<dyn DuplexSentinel>),
}

impl SentinelRole {
    fn name(&self) -> &str {
        match self {
            SentinelRole::Inbound(s) => s.name(),
            SentinelRole::Outbound(s) => s.name(),
            SentinelRole::Both(s) => InboundSentinel::name(s.as_ref()),
        }
    }
}

/// A sentinel plus where and when it runs.
#[derive(Clone)]
pub struct SentinelRegistration {
    schemes: SchemeSet,
    order: i32,
    role: SentinelRole,
}

impl SentinelRegistration {
    pub fn inbound<S: InboundSentinel>(sentinel: S) -> Self {
        Self::with_role(SentinelRole::Inbound(Arc::new(sentinel)))
    }

    pub fn outbound<S: OutboundSentinel>(sentinel: S) -> Self {
        Self::with_role(SentinelRole::Outbound(Arc::new(sentinel)))
    }

    pub fn both<S: InboundSentinel + OutboundSentinel>(sentinel: S) -> Self {
        Self::with_role(SentinelRole::Both(Arc::new(sentinel)))
    }

    /// Applies to every scheme with order 0 until narrowed.
    pub fn with_role(role: SentinelRole) -> Self {
        Self {
            schemes: SchemeSet::All,
            order: 0,
            role,
        }
    }

    /// Lower orders run first.
    pub fn order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn schemes(mut self, schemes: SchemeSet) -> Self {
        self.schemes = schemes;
        self
    }

    pub fn scheme_set(&self) -> &SchemeSet {
        &self.schemes
    }

    pub fn order_value(&self) -> i32 {
        self.order
    }

    pub fn role(&self) -> &SentinelRole {
        &self.role
    }
}

impl fmt::Debug for SentinelRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let direction = match self.role {
            SentinelRole::Inbound(_) => "inbound",
            SentinelRole::Outbound(_) => "outbound",
            SentinelRole::Both(_) => "both",
        };
        f.debug_struct("SentinelRegistration")
            .field("name", &self.role.name())
            .field("direction", &direction)
            .field("order", &self.order)
            .field("schemes", &self.schemes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        let denied: PipelineError = Rejection::denied("blocked").into();
        assert_eq!(denied.status_code(), 403);

        let invalid: PipelineError = Rejection::invalid("token", "missing").into();
        assert_eq!(invalid.status_code(), 422);
    }
}
