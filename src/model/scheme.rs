//! Wire protocol identifiers.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies the wire protocol a request arrived on (http, websocket, rpc, ...).
///
/// Schemes are compared case-sensitively; the built-in constants are lower-case
/// and custom schemes should follow the same convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scheme(Cow<'static, str>);

impl Scheme {
    pub const HTTP: Scheme = Scheme(Cow::Borrowed("http"));
    pub const WEBSOCKET: Scheme = Scheme(Cow::Borrowed("websocket"));
    pub const RPC: Scheme = Scheme(Cow::Borrowed("rpc"));
    pub const TOPIC: Scheme = Scheme(Cow::Borrowed("topic"));

    /// Create a custom scheme.
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scheme {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// The set of schemes a sentinel or access policy applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemeSet {
    /// Applies to every scheme, including ones registered later.
    All,
    /// Applies only to the listed schemes.
    Only(Vec<Scheme>),
}

impl SchemeSet {
    pub fn only(schemes: impl IntoIterator<Item = Scheme>) -> Self {
        Self::Only(schemes.into_iter().collect())
    }

    pub fn contains(&self, scheme: &Scheme) -> bool {
        match self {
            SchemeSet::All => true,
            SchemeSet::Only(schemes) => schemes.contains(scheme),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_scheme_is_lowercased() {
        assert_eq!(Scheme::new("MQTT").as_str(), "mqtt");
        assert_eq!(Scheme::from("HTTP"), Scheme::HTTP);
    }

    #[test]
    fn test_scheme_set() {
        let set = SchemeSet::only([Scheme::HTTP, Scheme::RPC]);
        assert!(set.contains(&Scheme::HTTP));
        assert!(!set.contains(&Scheme::WEBSOCKET));
        assert!(SchemeSet::All.contains(&Scheme::new("mqtt")));
    }
}
