//! Business intents.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque payload carried alongside an intent.
pub type Payload = Value;

/// Dot-namespaced identifier of what the caller wants done (`user.create`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentKey(String);

/// Why a client-supplied intent key was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentKeyError {
    #[error("intent key must not be empty")]
    Empty,

    #[error("intent key '{0}' has an empty segment")]
    EmptySegment(String),
}

impl IntentKey {
    /// Wraps `key` as is. Keys built by resolvers from known-good parts use this.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Validated construction for keys taken from a client: non-empty,
    /// no empty dot segments.
    pub fn parse(key: &str) -> Result<Self, IntentKeyError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(IntentKeyError::Empty);
        }
        if key.split('.').any(str::is_empty) {
            return Err(IntentKeyError::EmptySegment(key.to_string()));
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The first dot-separated segment (`user` for `user.create`).
    pub fn namespace(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for IntentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for IntentKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// A resolved intent: key plus payload. Immutable once created.
#[derive(Debug, Clone, PartialEq)]
pub struct Intent {
    key: IntentKey,
    payload: Payload,
}

impl Intent {
    pub fn new(key: impl Into<IntentKey>, payload: Payload) -> Self {
        Self {
            key: key.into(),
            payload,
        }
    }

    pub fn key(&self) -> &IntentKey {
        &self.key
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_parts(self) -> (IntentKey, Payload) {
        (self.key, self.payload)
    }
}

impl From<String> for IntentKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}
