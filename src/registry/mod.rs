//! Handler registry.
//!
//! # Data Flow
//! ```text
//! Startup (single writer, owned by the aggregator):
//!     register(pattern, handler [, AccessPolicy])
//!     → validate pattern (non-empty, no empty segments, unique)
//!     → exact map  |  pattern list (registration order)
//!
//! Request (frozen, shared via Arc):
//!     intent key
//!     → exact map lookup
//!     → first matching pattern
//!     → Registration { handler, access }
//! ```
//!
//! # Design Decisions
//! - Exact entries always win over patterns
//! - Among patterns the first registered match wins
//! - Mutation needs `&mut`, so freezing is enforced by wrapping in `Arc`

pub mod access;
pub mod handler;
pub mod pattern;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::model::Scheme;

pub use access::AccessPolicy;
pub use handler::{Handler, HandlerError, Invocation};
pub use pattern::IntentPattern;

/// Error type for handler registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("intent pattern must not be empty")]
    EmptyPattern,

    #[error("intent pattern '{0}' has an empty segment")]
    EmptySegment(String),

    #[error("a handler is already registered for '{0}'")]
    Duplicate(String),
}

/// A handler plus the policy guarding it.
#[derive(Clone)]
pub struct Registration {
    pattern: String,
    handler: Arc<dyn Handler>,
    access: Option<AccessPolicy>,
}

impl Registration {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn access(&self) -> Option<&AccessPolicy> {
        self.access.as_ref()
    }

    /// No policy means every scheme is allowed.
    pub fn allows(&self, scheme: &Scheme) -> bool {
        self.access.as_ref().map_or(true, |policy| policy.allows(scheme))
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("pattern", &self.pattern)
            .field("access", &self.access)
            .finish()
    }
}

/// Maps intent keys to handlers.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    exact: HashMap<String, Registration>,
    patterns: Vec<(IntentPattern, Registration)>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for an exact key or a wildcard pattern.
    pub fn register<H: Handler>(&mut self, pattern: &str, handler: H) -> Result<(), RegistryError> {
        self.insert(pattern, Arc::new(handler), None)
    }

    /// Register a handler that only the schemes allowed by `access` may invoke.
    pub fn register_with_access<H: Handler>(
        &mut self,
        pattern: &str,
        handler: H,
        access: AccessPolicy,
    ) -> Result<(), RegistryError> {
        self.insert(pattern, Arc::new(handler), Some(access))
    }

    /// Register an already shared handler (one instance behind several patterns).
    pub fn register_shared(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        access: Option<AccessPolicy>,
    ) -> Result<(), RegistryError> {
        self.insert(pattern, handler, access)
    }

    fn insert(
        &mut self,
        pattern: &str,
        handler: Arc<dyn Handler>,
        access: Option<AccessPolicy>,
    ) -> Result<(), RegistryError> {
        let pattern = pattern.trim();
        if pattern.is_empty() {
            return Err(RegistryError::EmptyPattern);
        }
        if pattern.split('.').any(str::is_empty) {
            return Err(RegistryError::EmptySegment(pattern.to_string()));
        }

        let registration = Registration {
            pattern: pattern.to_string(),
            handler,
            access,
        };

        if IntentPattern::is_wildcard(pattern) {
            if self.patterns.iter().any(|(p, _)| p.as_str() == pattern) {
                return Err(RegistryError::Duplicate(pattern.to_string()));
            }
            self.patterns.push((IntentPattern::new(pattern), registration));
        } else {
            if self.exact.contains_key(pattern) {
                return Err(RegistryError::Duplicate(pattern.to_string()));
            }
            self.exact.insert(pattern.to_string(), registration);
        }

        tracing::debug!(pattern = %pattern, "Handler registered");
        Ok(())
    }

    /// Find the handler for `key`: exact entry first, then the first matching pattern.
    pub fn resolve(&self, key: &str) -> Option<&Registration> {
        self.exact.get(key).or_else(|| {
            self.patterns
                .iter()
                .find(|(pattern, _)| pattern.matches(key))
                .map(|(_, registration)| registration)
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.resolve(key).is_some()
    }

    /// All registered keys and patterns, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .exact
            .keys()
            .cloned()
            .chain(self.patterns.iter().map(|(p, _)| p.as_str().to_string()))
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
