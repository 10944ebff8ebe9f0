//! Canonical request value.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::model::{RawInput, Scheme};

/// A protocol-independent view of one request.
///
/// Produced once per request by a normalizer. The `origin` back-reference is
/// only used for protocol-specific re-entry and is excluded from equality.
#[derive(Clone)]
pub struct NormalizedRequest {
    scheme: Scheme,
    method: String,
    path: String,
    headers: BTreeMap<String, String>,
    params: BTreeMap<String, String>,
    body: Vec<u8>,
    origin: Arc<dyn RawInput>,
}

impl NormalizedRequest {
    /// Start building a request that refers back to `origin`.
    pub fn builder(origin: Arc<dyn RawInput>) -> NormalizedRequestBuilder {
        NormalizedRequestBuilder {
            request: NormalizedRequest {
                scheme: origin.scheme(),
                method: String::new(),
                path: String::new(),
                headers: BTreeMap::new(),
                params: BTreeMap::new(),
                body: Vec::new(),
                origin,
            },
        }
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    /// Path for request/response protocols, topic for pub/sub.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Header lookup; names are stored lower-cased.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn origin(&self) -> &Arc<dyn RawInput> {
        &self.origin
    }
}

impl PartialEq for NormalizedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme
            && self.method == other.method
            && self.path == other.path
            && self.headers == other.headers
            && self.params == other.params
            && self.body == other.body
    }
}

impl Eq for NormalizedRequest {}

impl fmt::Debug for NormalizedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NormalizedRequest")
            .field("scheme", &self.scheme)
            .field("method", &self.method)
            .field("path", &self.path)
            .field("headers", &self.headers)
            .field("params", &self.params)
            .field("body_len", &self.body.len())
            .finish()
    }
}

/// Builder used by normalizers; the finished request is immutable.
pub struct NormalizedRequestBuilder {
    request: NormalizedRequest,
}

impl NormalizedRequestBuilder {
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.request.method = method.into();
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.request.path = path.into();
        self
    }

    /// Add a header. Names are lower-cased; a repeated name keeps the last value.
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.request.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.params.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn build(self) -> NormalizedRequest {
        self.request
    }
}
