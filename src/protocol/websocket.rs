//! WebSocket protocol binding.
//!
//! Messages are JSON text frames:
//!
//! ```text
//! client → {"intent": "chat.send", "data": {...}, "id": 7}
//! server → {"intent": "chat.send.response", "id": 7,
//!           "data": {"success": true, "result": {...}}}
//! server → {"intent": "chat.send.error", "id": 7,
//!           "data": {"success": false, "error": "...", "type": "validation"}}
//! ```
//!
//! `id` is optional and echoed back so clients can match replies, which may
//! arrive out of order.

use std::any::Any;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::PipelineError;
use crate::intent::ExplicitResolver;
use crate::model::{ExecutionContext, NormalizedRequest, RawInput, RawOutput, Scheme};
use crate::protocol::{Normalizer, Outcome, OutputBuilder, Protocol};

/// One text frame received on a session.
#[derive(Debug, Clone)]
pub struct WsInput {
    pub session: String,
    pub text: String,
}

impl WsInput {
    pub fn new(session: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            text: text.into(),
        }
    }

    /// Best-effort read of the envelope, used when rendering replies.
    fn envelope(&self) -> Option<Envelope> {
        serde_json::from_str(&self.text).ok()
    }
}

impl RawInput for WsInput {
    fn scheme(&self) -> Scheme {
        Scheme::WEBSOCKET
    }

    fn native_reference(&self) -> &dyn Any {
        self
    }

    fn body(&self) -> &[u8] {
        self.text.as_bytes()
    }

    fn source(&self) -> &str {
        &self.session
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    intent: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    id: Value,
}

/// A text frame to send back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsOutput {
    pub status: u16,
    pub text: String,
}

impl WsOutput {
    pub fn internal_error() -> Self {
        Self {
            status: 500,
            text: json!({
                "intent": "error",
                "data": {"success": false, "error": "Internal server error", "type": "handler_execution"},
            })
            .to_string(),
        }
    }
}

impl RawOutput for WsOutput {
    fn content(&self) -> &[u8] {
        self.text.as_bytes()
    }

    fn status_code(&self) -> u16 {
        self.status
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsNormalizer;

impl Normalizer<WsInput> for WsNormalizer {
    fn normalize(&self, input: &Arc<WsInput>) -> Result<NormalizedRequest, PipelineError> {
        let envelope: Envelope = serde_json::from_str(&input.text)
            .map_err(|e| PipelineError::MalformedInput(format!("invalid message: {e}")))?;

        let intent = envelope
            .intent
            .filter(|i| !i.trim().is_empty())
            .ok_or_else(|| PipelineError::MalformedInput("message has no intent".to_string()))?;

        let body = match envelope.data {
            Value::Null => Vec::new(),
            data => serde_json::to_vec(&data)
                .map_err(|e| PipelineError::MalformedInput(e.to_string()))?,
        };

        let origin: Arc<dyn RawInput> = input.clone();
        Ok(NormalizedRequest::builder(origin)
            .method("MESSAGE")
            .path(intent)
            .body(body)
            .build())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WsOutputBuilder;

impl OutputBuilder<WsOutput> for WsOutputBuilder {
    fn build(&self, ctx: &ExecutionContext, outcome: Outcome) -> WsOutput {
        let envelope = ctx
            .input()
            .native_reference()
            .downcast_ref::<WsInput>()
            .and_then(WsInput::envelope);

        let intent = ctx
            .intent()
            .map(|k| k.to_string())
            .or_else(|| envelope.as_ref().and_then(|e| e.intent.clone()))
            .unwrap_or_else(|| "error".to_string());

        let (status, reply, data) = match outcome {
            Outcome::Success(result) => (
                200,
                format!("{intent}.response"),
                json!({"success": true, "result": result}),
            ),
            Outcome::Failure(err) => {
                let mut data = Map::new();
                data.insert("success".into(), Value::Bool(false));
                data.insert("error".into(), Value::String(err.public_message()));
                data.insert("type".into(), Value::String(err.kind().as_str().to_string()));
                if let Some(fields) = err.fields() {
                    data.insert("fields".into(), json!(fields));
                }
                (err.status_code(), format!("{intent}.error"), Value::Object(data))
            }
        };

        let mut message = json!({
            "intent": reply,
            "data": data,
            "trace_id": ctx.trace_id().to_string(),
        });
        if let Some(id) = envelope.map(|e| e.id).filter(|id| !id.is_null()) {
            message["id"] = id;
        }

        WsOutput {
            status,
            text: message.to_string(),
        }
    }
}

/// WebSocket with intents named by the client.
pub fn websocket_protocol() -> Protocol<WsInput, WsOutput> {
    Protocol::new(Scheme::WEBSOCKET, WsNormalizer, ExplicitResolver::new(), WsOutputBuilder)
}
