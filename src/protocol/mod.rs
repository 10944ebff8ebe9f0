//! Protocol bindings: the per-protocol pieces a rendezvous is assembled from.
//!
//! # Data Flow
//! ```text
//! Protocol<I, O> {
//!     Normalizer<I>     I (RawInput) → NormalizedRequest
//!     IntentResolver    NormalizedRequest → Intent
//!     OutputBuilder<O>  (ExecutionContext, Outcome) → O (RawOutput)
//! }
//!
//! http.rs       HttpInput / HttpOutput       (REST + declarative routes)
//! websocket.rs  WsInput / WsOutput           (explicit intent in message)
//! rpc.rs        RpcInput / RpcOutput         (Service/Method)
//! topic.rs      TopicInput / TopicOutput     (pub/sub topics)
//! ```
//!
//! # Design Decisions
//! - Normalizers and output builders are pure and stateless
//! - Output types are concrete per protocol; sentinels see them as `dyn RawOutput`
//! - The resolver is swappable per protocol (e.g. declarative HTTP routes)

pub mod http;
pub mod rpc;
pub mod topic;
pub mod websocket;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::PipelineError;
use crate::intent::IntentResolver;
use crate::model::{ExecutionContext, NormalizedRequest, RawInput, RawOutput, Scheme};

/// Converts a protocol's raw input into the canonical request.
pub trait Normalizer<I>: Send + Sync + 'static {
    fn normalize(&self, input: &Arc<I>) -> Result<NormalizedRequest, PipelineError>;
}

/// What the pipeline produced for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure(PipelineError),
}

/// Renders a protocol output from the pipeline outcome.
pub trait OutputBuilder<O>: Send + Sync + 'static {
    fn build(&self, ctx: &ExecutionContext, outcome: Outcome) -> O;
}

/// Everything protocol-specific a rendezvous needs.
pub struct Protocol<I, O> {
    scheme: Scheme,
    normalizer: Arc<dyn Normalizer<I>>,
    resolver: Arc<dyn IntentResolver>,
    output: Arc<dyn OutputBuilder<O>>,
}

impl<I: RawInput, O: RawOutput> Protocol<I, O> {
    pub fn new(
        scheme: Scheme,
        normalizer: impl Normalizer<I>,
        resolver: impl IntentResolver,
        output: impl OutputBuilder<O>,
    ) -> Self {
        Self {
            scheme,
            normalizer: Arc::new(normalizer),
            resolver: Arc::new(resolver),
            output: Arc::new(output),
        }
    }

    /// Replace the intent resolver, keeping normalizer and output builder.
    pub fn with_resolver(mut self, resolver: impl IntentResolver) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn normalizer(&self) -> &Arc<dyn Normalizer<I>> {
        &self.normalizer
    }

    pub fn resolver(&self) -> &Arc<dyn IntentResolver> {
        &self.resolver
    }

    pub fn output(&self) -> &Arc<dyn OutputBuilder<O>> {
        &self.output
    }
}

impl<I, O> Clone for Protocol<I, O> {
    fn clone(&self) -> Self {
        Self {
            scheme: self.scheme.clone(),
            normalizer: Arc::clone(&self.normalizer),
            resolver: Arc::clone(&self.resolver),
            output: Arc::clone(&self.output),
        }
    }
}

impl<I, O> fmt::Debug for Protocol<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Protocol").field("scheme", &self.scheme).finish()
    }
}

/// JSON error body shared by the request/response protocols.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<crate::error::FieldErrors>,
}

impl ErrorBody {
    pub fn from_error(err: &PipelineError) -> Self {
        Self {
            kind: err.kind().as_str(),
            message: err.public_message(),
            fields: err.fields().cloned(),
        }
    }
}

/// `{"error": {...}, "trace_id": "..."}`
pub fn error_document(ctx: &ExecutionContext, err: &PipelineError) -> Value {
    json!({
        "error": ErrorBody::from_error(err),
        "trace_id": ctx.trace_id().to_string(),
    })
}

/// Serialize a JSON value, falling back to an empty object on failure.
pub(crate) fn to_bytes(value: &Value) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec())
}
