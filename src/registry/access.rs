//! Per-handler protocol access policy.
//!
//! # Responsibilities
//! - Decide whether a scheme may invoke a given handler
//!
//! # Design Decisions
//! - An empty allow list places no restriction
//! - Schemes outside a non-empty allow list are denied unless `allow_others` is set
//! - Checked at dispatch, after the intent (and therefore the handler) is known

use crate::model::Scheme;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AccessPolicy {
    allowed: Vec<Scheme>,
    allow_others: bool,
}

impl AccessPolicy {
    /// Allow only the listed schemes.
    pub fn only(schemes: impl IntoIterator<Item = Scheme>) -> Self {
        Self {
            allowed: schemes.into_iter().collect(),
            allow_others: false,
        }
    }

    /// Allow every scheme.
    pub fn unrestricted() -> Self {
        Self::default()
    }

    /// Keep the allow list for documentation but let other schemes through too.
    pub fn allow_others(mut self, allow: bool) -> Self {
        self.allow_others = allow;
        self
    }

    pub fn allowed(&self) -> &[Scheme] {
        &self.allowed
    }

    pub fn allows(&self, scheme: &Scheme) -> bool {
        self.allowed.is_empty() || self.allow_others || self.allowed.contains(scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_denies_others() {
        let policy = AccessPolicy::only([Scheme::HTTP]);
        assert!(policy.allows(&Scheme::HTTP));
        assert!(!policy.allows(&Scheme::WEBSOCKET));
    }

    #[test]
    fn test_allow_others() {
        let policy = AccessPolicy::only([Scheme::HTTP]).allow_others(true);
        assert!(policy.allows(&Scheme::RPC));
    }

    #[test]
    fn test_empty_list_unrestricted() {
        assert!(AccessPolicy::unrestricted().allows(&Scheme::new("mqtt")));
    }
}
