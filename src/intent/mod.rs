//! Intent resolution subsystem.
//!
//! # Data Flow
//! ```text
//! NormalizedRequest (method, path/topic, params, body)
//!     → resolver (protocol-specific convention)
//!     → Intent { key: "user.create", payload: {...} }
//!     → handler registry lookup
//!
//! HTTP:      declarative.rs (configured routes) → rest.rs (convention fallback)
//! RPC:       rpc.rs   (Service/Method → service.action)
//! Topic:     topic.rs (a/b/+ → a.b.*)
//! WebSocket: explicit.rs (intent carried in the message)
//! ```
//!
//! # Design Decisions
//! - Resolvers are pure and stateless after construction; safe to share across threads
//! - Naming rules live in naming.rs so every resolver agrees on them
//! - Payload construction is shared: JSON body, else `{"body": text}`, params merged in

pub mod declarative;
pub mod explicit;
pub mod naming;
pub mod payload;
pub mod rest;
pub mod rpc;
pub mod topic;

use crate::error::PipelineError;
use crate::model::{Intent, NormalizedRequest};

pub use declarative::{DeclarativeResolver, PathTemplate};
pub use explicit::ExplicitResolver;
pub use payload::build_payload;
pub use rest::RestResolver;
pub use rpc::RpcResolver;
pub use topic::TopicResolver;

/// Derives the business intent from a normalized request.
pub trait IntentResolver: Send + Sync + 'static {
    /// Resolve `request`, or fail with `UnresolvedIntent`.
    fn resolve(&self, request: &NormalizedRequest) -> Result<Intent, PipelineError>;
}

impl<R: IntentResolver + ?Sized> IntentResolver for Box<R> {
    fn resolve(&self, request: &NormalizedRequest) -> Result<Intent, PipelineError> {
        (**self).resolve(request)
    }
}

impl<R: IntentResolver + ?Sized> IntentResolver for std::sync::Arc<R> {
    fn resolve(&self, request: &NormalizedRequest) -> Result<Intent, PipelineError> {
        (**self).resolve(request)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::any::Any;
    use std::sync::Arc;

    use crate::model::{NormalizedRequest, RawInput, Scheme};

    pub struct StubInput(pub Scheme);

    impl RawInput for StubInput {
        fn scheme(&self) -> Scheme {
            self.0.clone()
        }
        fn native_reference(&self) -> &dyn Any {
            self
        }
        fn body(&self) -> &[u8] {
            b""
        }
        fn source(&self) -> &str {
            "test"
        }
    }

    pub fn request(scheme: Scheme, method: &str, path: &str, body: &[u8]) -> NormalizedRequest {
        NormalizedRequest::builder(Arc::new(StubInput(scheme)))
            .method(method)
            .path(path)
            .body(body.to_vec())
            .build()
    }
}
