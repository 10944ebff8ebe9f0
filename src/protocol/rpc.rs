//! RPC protocol binding: unary JSON calls addressed by `Service/Method`.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::PipelineError;
use crate::intent::RpcResolver;
use crate::model::{ExecutionContext, NormalizedRequest, RawInput, RawOutput, Scheme};
use crate::protocol::{error_document, to_bytes, Normalizer, Outcome, OutputBuilder, Protocol};

/// A single RPC call.
#[derive(Debug, Clone)]
pub struct RpcInput {
    pub service: String,
    pub method: String,
    pub metadata: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub peer: String,
}

impl RpcInput {
    pub fn new(service: impl Into<String>, method: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            metadata: BTreeMap::new(),
            body: body.into(),
            peer: "unknown".to_string(),
        }
    }
}

impl RawInput for RpcInput {
    fn scheme(&self) -> Scheme {
        Scheme::RPC
    }

    fn native_reference(&self) -> &dyn Any {
        self
    }

    fn body(&self) -> &[u8] {
        &self.body
    }

    fn source(&self) -> &str {
        &self.peer
    }
}

/// RPC reply: status on the HTTP scale plus a JSON document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcOutput {
    pub status: u16,
    pub metadata: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl RpcOutput {
    pub fn internal_error() -> Self {
        Self {
            status: 500,
            metadata: BTreeMap::new(),
            body: br#"{"error":{"kind":"handler_execution","message":"Internal server error"}}"#.to_vec(),
        }
    }
}

impl RawOutput for RpcOutput {
    fn content(&self) -> &[u8] {
        &self.body
    }

    fn status_code(&self) -> u16 {
        self.status
    }

    fn set_header(&mut self, name: &str, value: &str) {
        self.metadata.insert(name.to_ascii_lowercase(), value.to_string());
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.metadata.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

impl IntoResponse for RpcOutput {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in self.metadata {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                headers.insert(name, value);
            }
        }
        response
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RpcNormalizer;

impl Normalizer<RpcInput> for RpcNormalizer {
    fn normalize(&self, input: &Arc<RpcInput>) -> Result<NormalizedRequest, PipelineError> {
        if !is_identifier(&input.service) {
            return Err(PipelineError::MalformedInput(format!(
                "invalid service name '{}'",
                input.service
            )));
        }
        if !is_identifier(&input.method) {
            return Err(PipelineError::MalformedInput(format!(
                "invalid method name '{}'",
                input.method
            )));
        }

        let origin: Arc<dyn RawInput> = input.clone();
        let mut builder = NormalizedRequest::builder(origin)
            .method("CALL")
            .path(format!("{}/{}", input.service, input.method))
            .body(input.body.clone());
        for (name, value) in &input.metadata {
            builder = builder.header(name, value.clone());
        }
        Ok(builder.build())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RpcOutputBuilder;

impl OutputBuilder<RpcOutput> for RpcOutputBuilder {
    fn build(&self, ctx: &ExecutionContext, outcome: Outcome) -> RpcOutput {
        let (status, document) = match outcome {
            Outcome::Success(result) => (200, json!({ "result": result })),
            Outcome::Failure(err) => (err.status_code(), error_document(ctx, &err)),
        };
        RpcOutput {
            status,
            metadata: BTreeMap::new(),
            body: to_bytes(&document),
        }
    }
}

pub fn rpc_protocol() -> Protocol<RpcInput, RpcOutput> {
    Protocol::new(Scheme::RPC, RpcNormalizer, RpcResolver::new(), RpcOutputBuilder)
}
