//! Per-request execution context.
//!
//! # Lifecycle
//! ```text
//! encounter() ──▶ new()            trace id, scheme, source, input
//!   normalize ──▶ set_request()
//!   interpret ──▶ set_intent()
//!   dispatch  ──▶ set_result() | set_failure()
//!   render    ──▶ set_output_status()
//!   return    ──▶ dropped
//! ```
//!
//! The rendezvous is the only owner. Stages run in sequence, so no locking is needed.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::model::{IntentKey, NormalizedRequest, Payload, RawInput, Scheme};

/// Globally unique request identifier (UUID v4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Uuid);

impl TraceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mutable hub for one request travelling through the pipeline.
pub struct ExecutionContext {
    trace_id: TraceId,
    scheme: Scheme,
    source: String,
    started_at: Instant,
    input: Arc<dyn RawInput>,
    request: Option<NormalizedRequest>,
    intent: Option<IntentKey>,
    payload: Option<Payload>,
    result: Option<Value>,
    failure: Option<PipelineError>,
    output_status: Option<u16>,
}

impl ExecutionContext {
    /// Create a context for `input`, generating a fresh trace id.
    pub fn new(input: Arc<dyn RawInput>) -> Self {
        Self {
            trace_id: TraceId::new(),
            scheme: input.scheme(),
            source: input.source().to_string(),
            started_at: Instant::now(),
            input,
            request: None,
            intent: None,
            payload: None,
            result: None,
            failure: None,
            output_status: None,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn input(&self) -> &Arc<dyn RawInput> {
        &self.input
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn request(&self) -> Option<&NormalizedRequest> {
        self.request.as_ref()
    }

    pub fn intent(&self) -> Option<&IntentKey> {
        self.intent.as_ref()
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&PipelineError> {
        self.failure.as_ref()
    }

    pub fn has_failed(&self) -> bool {
        self.failure.is_some()
    }

    pub fn output_status(&self) -> Option<u16> {
        self.output_status
    }

    pub(crate) fn set_request(&mut self, request: NormalizedRequest) {
        self.request = Some(request);
    }

    pub(crate) fn set_intent(&mut self, key: IntentKey, payload: Payload) {
        self.intent = Some(key);
        self.payload = Some(payload);
    }

    pub(crate) fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    pub(crate) fn set_failure(&mut self, failure: PipelineError) {
        self.failure = Some(failure);
    }

    pub(crate) fn set_output_status(&mut self, status: u16) {
        self.output_status = Some(status);
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("trace_id", &self.trace_id)
            .field("scheme", &self.scheme)
            .field("source", &self.source)
            .field("intent", &self.intent)
            .field("failure", &self.failure)
            .field("output_status", &self.output_status)
            .finish()
    }
}
