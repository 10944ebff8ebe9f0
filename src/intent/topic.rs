//! Topic resolver: `orders/created` → `orders.created`, `orders/+` → `orders.*`.

use serde_json::Value;

use crate::error::PipelineError;
use crate::intent::{build_payload, IntentResolver};
use crate::model::{Intent, NormalizedRequest};

#[derive(Debug, Clone, Copy, Default)]
pub struct TopicResolver;

impl TopicResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn derive(&self, topic: &str) -> String {
        topic
            .trim_matches('/')
            .split('/')
            .map(|level| match level {
                "+" | "#" => "*",
                other => other,
            })
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl IntentResolver for TopicResolver {
    fn resolve(&self, request: &NormalizedRequest) -> Result<Intent, PipelineError> {
        let key = self.derive(request.path());
        if key.is_empty() {
            return Err(PipelineError::UnresolvedIntent(request.path().to_string()));
        }

        let params = request
            .params()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())));

        Ok(Intent::new(key, build_payload(request.body(), params)))
    }
}
