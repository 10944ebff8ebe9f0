//! HTTP protocol binding.
//!
//! # Responsibilities
//! - `HttpInput`: method, URI, headers and body as received by the foyer
//! - `HttpNormalizer`: URI parsing, query splitting, header lower-casing
//! - `HttpOutputBuilder`: JSON success bodies, JSON error documents with status
//! - `HttpOutput` → axum `Response`

use std::any::Any;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use crate::error::PipelineError;
use crate::intent::{IntentResolver, RestResolver};
use crate::model::{ExecutionContext, NormalizedRequest, RawInput, RawOutput, Scheme};
use crate::protocol::{error_document, to_bytes, Normalizer, Outcome, OutputBuilder, Protocol};

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// An HTTP request as the foyer received it.
#[derive(Debug, Clone)]
pub struct HttpInput {
    pub method: String,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub peer: String,
}

impl HttpInput {
    pub fn new(method: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers: Vec::new(),
            body: Vec::new(),
            peer: "unknown".to_string(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }
}

impl RawInput for HttpInput {
    fn scheme(&self) -> Scheme {
        Scheme::HTTP
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

/// An HTTP response ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOutput {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpOutput {
    pub fn json(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), JSON_CONTENT_TYPE.to_string())],
            body,
        }
    }

    /// Written by the foyer when the pipeline task dies without output.
    pub fn internal_error() -> Self {
        Self::json(
            500,
            br#"{"error":{"kind":"handler_execution","message":"Internal server error"}}"#.to_vec(),
        )
    }
}

impl RawOutput for HttpOutput {
    fn content(&self) -> &[u8] {
        &self.body
    }

    fn status_code(&self) -> u16 {
        self.status
    }

    fn set_header(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        self.headers.retain(|(n, _)| *n != name);
        self.headers.push((name, value.to_string()));
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl IntoResponse for HttpOutput {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            match (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => tracing::warn!(header = %name, "Dropping invalid response header"),
            }
        }
        response
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpNormalizer;

impl Normalizer<HttpInput> for HttpNormalizer {
    fn normalize(&self, input: &Arc<HttpInput>) -> Result<NormalizedRequest, PipelineError> {
        let uri: Uri = input
            .uri
            .parse()
            .map_err(|e| PipelineError::MalformedInput(format!("invalid URI '{}': {e}", input.uri)))?;

        let origin: Arc<dyn RawInput> = input.clone();
        let mut builder = NormalizedRequest::builder(origin)
            .method(input.method.to_ascii_uppercase())
            .path(uri.path())
            .body(input.body.clone());

        if let Some(query) = uri.query() {
            for (name, value) in url::form_urlencoded::parse(query.as_bytes()) {
                builder = builder.param(name, value);
            }
        }
        for (name, value) in &input.headers {
            builder = builder.header(name, value.clone());
        }

        Ok(builder.build())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HttpOutputBuilder;

impl OutputBuilder<HttpOutput> for HttpOutputBuilder {
    fn build(&self, ctx: &ExecutionContext, outcome: Outcome) -> HttpOutput {
        match outcome {
            Outcome::Success(value) => HttpOutput::json(200, to_bytes(&value)),
            Outcome::Failure(err) => {
                HttpOutput::json(err.status_code(), to_bytes(&error_document(ctx, &err)))
            }
        }
    }
}

/// HTTP with the REST convention resolver.
pub fn http_protocol() -> Protocol<HttpInput, HttpOutput> {
    http_protocol_with(RestResolver::new())
}

/// HTTP with a custom resolver (e.g. a `DeclarativeResolver`).
pub fn http_protocol_with(resolver: impl IntentResolver) -> Protocol<HttpInput, HttpOutput> {
    Protocol::new(Scheme::HTTP, HttpNormalizer, resolver, HttpOutputBuilder)
}
