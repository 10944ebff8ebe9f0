//! Pipeline failure taxonomy.
//!
//! # Design Decisions
//! - Every variant except `TransportWrite` is rendered into a protocol response
//! - `ErrorKind` is the stable, serializable classification output builders use
//! - Status codes are on the HTTP scale; non-HTTP protocols map from there

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Field name → message.
pub type FieldErrors = BTreeMap<String, String>;

/// A failure attached to an execution context.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PipelineError {
    /// The transport payload could not be decoded.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// No intent could be resolved, or no handler is registered for it.
    #[error("unresolved intent: {0}")]
    UnresolvedIntent(String),

    /// Field-level validation failure.
    #[error("validation failed: {}", format_fields(.0))]
    Validation(FieldErrors),

    /// A sentinel or access policy rejected the request.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The handler failed or panicked.
    #[error("handler failed: {0}")]
    HandlerExecution(String),

    /// A stage refused work because it is shutting down.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// The handler did not finish before the configured deadline.
    #[error("deadline exceeded after {0} ms")]
    DeadlineExceeded(u64),

    /// The output could not be delivered; the connection is closed.
    #[error("transport write failed: {0}")]
    TransportWrite(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::MalformedInput(_) => ErrorKind::MalformedInput,
            PipelineError::UnresolvedIntent(_) => ErrorKind::UnresolvedIntent,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::AccessDenied(_) => ErrorKind::AccessDenied,
            PipelineError::HandlerExecution(_) => ErrorKind::HandlerExecution,
            PipelineError::Unavailable(_) => ErrorKind::Unavailable,
            PipelineError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            PipelineError::TransportWrite(_) => ErrorKind::TransportWrite,
        }
    }

    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Message safe to show a client. Handler internals are not leaked.
    pub fn public_message(&self) -> String {
        match self {
            PipelineError::HandlerExecution(_) => "Internal handler error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn fields(&self) -> Option<&FieldErrors> {
        match self {
            PipelineError::Validation(fields) => Some(fields),
            _ => None,
        }
    }

    /// Convenience for a single-field validation failure.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = FieldErrors::new();
        fields.insert(field.into(), message.into());
        PipelineError::Validation(fields)
    }
}

/// Stable classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    UnresolvedIntent,
    Validation,
    AccessDenied,
    HandlerExecution,
    Unavailable,
    DeadlineExceeded,
    TransportWrite,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::MalformedInput => 400,
            ErrorKind::AccessDenied => 403,
            ErrorKind::UnresolvedIntent => 404,
            ErrorKind::Validation => 422,
            ErrorKind::HandlerExecution | ErrorKind::TransportWrite => 500,
            ErrorKind::Unavailable => 503,
            ErrorKind::DeadlineExceeded => 504,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::MalformedInput => "malformed_input",
            ErrorKind::UnresolvedIntent => "unresolved_intent",
            ErrorKind::Validation => "validation",
            ErrorKind::AccessDenied => "access_denied",
            ErrorKind::HandlerExecution => "handler_execution",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::TransportWrite => "transport_write",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn format_fields(fields: &FieldErrors) -> String {
    fields
        .iter()
        .map(|(field, message)| format!("{field}: {message}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(PipelineError::MalformedInput("x".into()).status_code(), 400);
        assert_eq!(PipelineError::UnresolvedIntent("x".into()).status_code(), 404);
        assert_eq!(PipelineError::AccessDenied("x".into()).status_code(), 403);
        assert_eq!(PipelineError::invalid_field("name", "required").status_code(), 422);
        assert_eq!(PipelineError::DeadlineExceeded(10).status_code(), 504);
    }

    #[test]
    fn test_validation_display() {
        let err = PipelineError::invalid_field("email", "must contain @");
        assert_eq!(err.to_string(), "validation failed: email: must contain @");
        assert_eq!(err.fields().map(|f| f.len()), Some(1));
    }

    #[test]
    fn test_handler_message_hidden() {
        let err = PipelineError::HandlerExecution("db password wrong".into());
        assert_eq!(err.public_message(), "Internal handler error");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::AccessDenied).unwrap();
        assert_eq!(json, "\"access_denied\"");
    }
}
