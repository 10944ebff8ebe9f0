//! REST convention resolver.
//!
//! # Responsibilities
//! - Map method + path onto `<resource>.<action>` without any configuration
//! - Turn numeric path segments into payload ids
//!
//! | path                | method     | intent           | ids added                      |
//! |---------------------|------------|------------------|--------------------------------|
//! | `/`                 | any        | `system.welcome` |                                |
//! | `/users`            | GET / POST | `user.list` / `user.create` |                     |
//! | `/users/42`         | GET        | `user.get`       | `id`                           |
//! | `/users/search`     | any        | `user.search`    |                                |
//! | `/users/42/orders`  | any        | `user.order`     | `user_id`, `id`                |

use serde_json::Value;

use crate::error::PipelineError;
use crate::intent::naming::{is_numeric, singularize};
use crate::intent::{build_payload, IntentResolver};
use crate::model::{Intent, NormalizedRequest};

const ROOT_INTENT: &str = "system.welcome";

#[derive(Debug, Clone, Copy, Default)]
pub struct RestResolver;

impl RestResolver {
    pub fn new() -> Self {
        Self
    }

    /// Derive the intent key and path ids for `method` + `path`.
    pub fn derive(&self, method: &str, path: &str) -> (String, Vec<(String, Value)>) {
        let segments = segments(path);
        let method = method.to_ascii_uppercase();
        let mut ids = Vec::new();

        let key = match segments.as_slice() {
            [] => ROOT_INTENT.to_string(),
            [resource] => {
                let resource = singularize(resource);
                match method.as_str() {
                    "GET" => format!("{resource}.list"),
                    "POST" => format!("{resource}.create"),
                    other => format!("{resource}.{}", other.to_ascii_lowercase()),
                }
            }
            [resource, second] if is_numeric(second) => {
                let resource = singularize(resource);
                ids.push(("id".to_string(), Value::String(second.to_string())));
                match method.as_str() {
                    "GET" => format!("{resource}.get"),
                    "PUT" | "PATCH" => format!("{resource}.update"),
                    "DELETE" => format!("{resource}.delete"),
                    other => format!("{resource}.{}", other.to_ascii_lowercase()),
                }
            }
            [resource, action] => format!("{}.{}", singularize(resource), action),
            nested => {
                let mut names = Vec::new();
                let mut last_id = None;
                for segment in nested {
                    if is_numeric(segment) {
                        let owner = names.last().copied().unwrap_or("parent");
                        ids.push((format!("{owner}_id"), Value::String(segment.to_string())));
                        last_id = Some(segment.to_string());
                    } else {
                        names.push(singularize(segment));
                    }
                }
                if let Some(id) = last_id {
                    ids.push(("id".to_string(), Value::String(id)));
                }
                names.join(".")
            }
        };

        (key, ids)
    }
}

/// Path segments with the query string, empty segments and a leading `api` removed.
fn segments(path: &str) -> Vec<&str> {
    let path = path.split('?').next().unwrap_or_default();
    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.first() == Some(&"api") {
        segments.remove(0);
    }
    segments
}

impl IntentResolver for RestResolver {
    fn resolve(&self, request: &NormalizedRequest) -> Result<Intent, PipelineError> {
        let (key, ids) = self.derive(request.method(), request.path());
        if key.is_empty() {
            return Err(PipelineError::UnresolvedIntent(format!(
                "{} {}",
                request.method(),
                request.path()
            )));
        }

        let params = request
            .params()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .chain(ids);

        Ok(Intent::new(key, build_payload(request.body(), params)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::testing::request;
    use crate::model::Scheme;
    use serde_json::json;

    fn key(method: &str, path: &str) -> String {
        RestResolver.derive(method, path).0
    }

    #[test]
    fn test_root_is_welcome() {
        assert_eq!(key("GET", "/"), "system.welcome");
        assert_eq!(key("GET", "/api/"), "system.welcome");
    }

    #[test]
    fn test_collection() {
        assert_eq!(key("GET", "/users"), "user.list");
        assert_eq!(key("POST", "/api/users"), "user.create");
        assert_eq!(key("DELETE", "/users"), "user.delete");
    }

    #[test]
    fn test_member() {
        assert_eq!(key("GET", "/users/42"), "user.get");
        assert_eq!(key("PUT", "/users/42"), "user.update");
        assert_eq!(key("PATCH", "/users/42"), "user.update");
        assert_eq!(key("DELETE", "/users/42"), "user.delete");
        assert_eq!(key("POST", "/users/42"), "user.post");
    }

    #[test]
    fn test_action() {
        assert_eq!(key("GET", "/users/search"), "user.search");
        assert_eq!(key("POST", "/users/export"), "user.export");
    }

    #[test]
    fn test_nested() {
        let (key, ids) = RestResolver.derive("GET", "/users/42/orders/7");
        assert_eq!(key, "user.order");
        assert_eq!(
            ids,
            vec![
                ("user_id".to_string(), json!("42")),
                ("order_id".to_string(), json!("7")),
                ("id".to_string(), json!("7")),
            ]
        );
    }

    #[test]
    fn test_query_string_ignored() {
        assert_eq!(key("GET", "/users?page=2"), "user.list");
    }

    #[test]
    fn test_resolve_payload_includes_id_and_body() {
        let req = request(Scheme::HTTP, "PUT", "/users/42", br#"{"name":"ada"}"#);
        let intent = RestResolver.resolve(&req).unwrap();
        assert_eq!(intent.key().as_str(), "user.update");
        assert_eq!(intent.payload(), &json!({"name": "ada", "id": "42"}));
    }
}
