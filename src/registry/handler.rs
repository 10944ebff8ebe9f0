//! Handler capability and invocation.
//!
//! # Responsibilities
//! - `Handler`: business logic for one or more intents
//! - `Invocation`: read-only view of the request handed to a handler
//! - `HandlerError`: the failures a handler may report
//!
//! # Design Decisions
//! - Handlers are synchronous; they run on the conductor stage pool
//! - Any `Fn(&Invocation) -> Result<Value, HandlerError>` closure is a handler
//! - Deadlines are cooperative: handlers may poll `is_expired()`

use std::time::Instant;

use serde_json::Value;

use crate::error::{FieldErrors, PipelineError};
use crate::model::{IntentKey, Payload, Scheme, TraceId};

/// Business logic bound to an intent pattern.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, invocation: &Invocation) -> Result<Value, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&Invocation) -> Result<Value, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, invocation: &Invocation) -> Result<Value, HandlerError> {
        self(invocation)
    }
}

/// Failure reported by a handler.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HandlerError {
    #[error("validation failed")]
    Validation(FieldErrors),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), message.into());
        HandlerError::Validation(fields)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        HandlerError::NotFound(message.into())
    }

    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

impl From<HandlerError> for PipelineError {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Validation(fields) => PipelineError::Validation(fields),
            HandlerError::NotFound(message) => PipelineError::UnresolvedIntent(message),
            HandlerError::Failed(message) => PipelineError::HandlerExecution(message),
        }
    }
}

/// Everything a handler may read about the request it serves.
#[derive(Debug, Clone)]
pub struct Invocation {
    trace_id: TraceId,
    scheme: Scheme,
    key: IntentKey,
    payload: Payload,
    deadline: Option<Instant>,
}

impl Invocation {
    pub fn new(
        trace_id: TraceId,
        scheme: Scheme,
        key: IntentKey,
        payload: Payload,
        deadline: Option<Instant>,
    ) -> Self {
        Self {
            trace_id,
            scheme,
            key,
            payload,
            deadline,
        }
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn key(&self) -> &IntentKey {
        &self.key
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once the orchestrator has stopped waiting for this invocation.
    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// A payload field as a string, or a validation error naming the field.
    pub fn require_str(&self, field: &str) -> Result<&str, HandlerError> {
        match self.payload.get(field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
            Some(Value::String(_)) | None | Some(Value::Null) => {
                Err(HandlerError::invalid(field, "is required"))
            }
            Some(_) => Err(HandlerError::invalid(field, "must be a string")),
        }
    }
}
