//! RPC resolver: `pkg.UserService/CreateUser` → `user.create`.

use serde_json::Value;

use crate::error::PipelineError;
use crate::intent::naming::method_action;
use crate::intent::{build_payload, IntentResolver};
use crate::model::{Intent, NormalizedRequest};

#[derive(Debug, Clone, Copy, Default)]
pub struct RpcResolver;

impl RpcResolver {
    pub fn new() -> Self {
        Self
    }

    /// Intent key for a fully qualified service and method name.
    pub fn derive(&self, service: &str, method: &str) -> String {
        let service = service.rsplit('.').next().unwrap_or(service);
        let service = service
            .strip_suffix("Service")
            .or_else(|| service.strip_suffix("Svc"))
            .unwrap_or(service);

        format!("{}.{}", service.to_lowercase(), method_action(method))
    }
}

impl IntentResolver for RpcResolver {
    fn resolve(&self, request: &NormalizedRequest) -> Result<Intent, PipelineError> {
        let (service, method) = request
            .path()
            .split_once('/')
            .filter(|(s, m)| !s.is_empty() && !m.is_empty())
            .ok_or_else(|| PipelineError::UnresolvedIntent(request.path().to_string()))?;

        let params = request
            .params()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())));

        Ok(Intent::new(
            self.derive(service, method),
            build_payload(request.body(), params),
        ))
    }
}
