//! Pub/sub topic binding.

use std::any::Any;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::error::PipelineError;
use crate::intent::TopicResolver;
use crate::model::{ExecutionContext, NormalizedRequest, RawInput, RawOutput, Scheme};
use crate::protocol::{to_bytes, Normalizer, Outcome, OutputBuilder, Protocol};

/// A message published to a topic.
#[derive(Debug, Clone)]
pub struct TopicInput {
    pub topic: String,
    pub publisher: String,
    pub payload: Vec<u8>,
}

impl TopicInput {
    pub fn new(topic: impl Into<String>, publisher: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            publisher: publisher.into(),
            payload: payload.into(),
        }
    }
}

impl RawInput for TopicInput {
    fn scheme(&self) -> Scheme {
        Scheme::TOPIC
    }

    fn native_reference(&self) -> &dyn Any {
        self
    }

    fn body(&self) -> &[u8] {
        &self.payload
    }

    fn source(&self) -> &str {
        &self.publisher
    }
}

/// Acknowledgement returned to the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicOutput {
    pub status: u16,
    pub document: Value,
    body: Vec<u8>,
}

impl TopicOutput {
    pub fn new(status: u16, document: Value) -> Self {
        let body = to_bytes(&document);
        Self {
            status,
            document,
            body,
        }
    }

    pub fn internal_error() -> Self {
        Self::new(
            500,
            json!({"ack": false, "error": {"kind": "handler_execution", "message": "Internal server error"}}),
        )
    }
}

impl RawOutput for TopicOutput {
    fn content(&self) -> &[u8] {
        &self.body
    }

    fn status_code(&self) -> u16 {
        self.status
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TopicNormalizer;

impl Normalizer<TopicInput> for TopicNormalizer {
    fn normalize(&self, input: &Arc<TopicInput>) -> Result<NormalizedRequest, PipelineError> {
        let topic = input.topic.trim();
        if topic.is_empty() || topic.trim_matches('/').split('/').any(str::is_empty) {
            return Err(PipelineError::MalformedInput(format!(
                "invalid topic '{}'",
                input.topic
            )));
        }

        let origin: Arc<dyn RawInput> = input.clone();
        Ok(NormalizedRequest::builder(origin)
            .method("PUBLISH")
            .path(topic)
            .body(input.payload.clone())
            .build())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TopicOutputBuilder;

impl OutputBuilder<TopicOutput> for TopicOutputBuilder {
    fn build(&self, ctx: &ExecutionContext, outcome: Outcome) -> TopicOutput {
        let trace_id = ctx.trace_id().to_string();
        match outcome {
            Outcome::Success(result) => TopicOutput::new(
                200,
                json!({"ack": true, "result": result, "trace_id": trace_id}),
            ),
            Outcome::Failure(err) => TopicOutput::new(
                err.status_code(),
                json!({
                    "ack": false,
                    "error": crate::protocol::ErrorBody::from_error(&err),
                    "trace_id": trace_id,
                }),
            ),
        }
    }
}

pub fn topic_protocol() -> Protocol<TopicInput, TopicOutput> {
    Protocol::new(Scheme::TOPIC, TopicNormalizer, TopicResolver::new(), TopicOutputBuilder)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_levels_malformed() {
        for topic in ["", "a//b", "  "] {
            let input = Arc::new(TopicInput::new(topic, "p", Vec::new()));
            assert!(TopicNormalizer.normalize(&input).is_err(), "{topic:?}");
        }
    }

    #[test]
    fn test_normalize_topic() {
        let input = Arc::new(TopicInput::new("orders/created", "billing", b"{}".to_vec()));
        let req = TopicNormalizer.normalize(&input).unwrap();
        assert_eq!(req.path(), "orders/created");
        assert_eq!(req.method(), "PUBLISH");
    }
}
