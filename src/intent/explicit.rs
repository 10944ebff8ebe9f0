//! Resolver for protocols whose messages name their intent directly.

use serde_json::Value;

use crate::error::PipelineError;
use crate::intent::{build_payload, IntentResolver};
use crate::model::{Intent, IntentKey, NormalizedRequest};

/// Uses the normalized path verbatim as the intent key.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitResolver;

impl ExplicitResolver {
    pub fn new() -> Self {
        Self
    }
}

impl IntentResolver for ExplicitResolver {
    fn resolve(&self, request: &NormalizedRequest) -> Result<Intent, PipelineError> {
        let key = IntentKey::parse(request.path())
            .map_err(|e| PipelineError::UnresolvedIntent(e.to_string()))?;

        let params = request
            .params()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())));

        Ok(Intent::new(key, build_payload(request.body(), params)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::testing::request;
    use crate::model::Scheme;
    use serde_json::json;

    #[test]
    fn test_path_is_intent() {
        let req = request(Scheme::WEBSOCKET, "MESSAGE", "chat.send", br#"{"text":"hi"}"#);
        let intent = ExplicitResolver.resolve(&req).unwrap();
        assert_eq!(intent.key().as_str(), "chat.send");
        assert_eq!(intent.payload(), &json!({"text": "hi"}));
    }

    #[test]
    fn test_empty_intent_unresolved() {
        let req = request(Scheme::WEBSOCKET, "MESSAGE", " ", b"");
        assert!(ExplicitResolver.resolve(&req).is_err());
    }

    #[test]
    fn test_empty_segment_unresolved() {
        let req = request(Scheme::WEBSOCKET, "MESSAGE", "user..create", b"");
        assert!(matches!(
            ExplicitResolver.resolve(&req),
            Err(PipelineError::UnresolvedIntent(_))
        ));
    }
}
