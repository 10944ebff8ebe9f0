//! Declarative route resolver.
//!
//! # Responsibilities
//! - Match method + path against routes registered in code or loaded from config
//! - Capture `{name}` segments into the payload
//! - Fall back to the REST convention when no route matches
//!
//! # Design Decisions
//! - Routes are compiled once into segment lists; no regex in the hot path
//! - First registered match wins, mirroring handler pattern ordering
//! - Method `*` matches any method

use serde_json::Value;

use crate::config::RouteConfig;
use crate::error::PipelineError;
use crate::intent::{build_payload, IntentResolver, RestResolver};
use crate::model::{Intent, IntentKey, NormalizedRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Capture(String),
}

/// A compiled path template such as `/orders/{id}/cancel`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(template: &str) -> Self {
        let segments = template
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                Some(name) if !name.is_empty() => Segment::Capture(name.to_string()),
                _ => Segment::Literal(s.to_string()),
            })
            .collect();

        Self {
            source: template.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match `path`, returning captured segments in template order.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let path = path.split('?').next().unwrap_or_default();
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut captures = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Capture(name) => captures.push((name.clone(), part.to_string())),
            }
        }
        Some(captures)
    }
}

#[derive(Debug, Clone)]
struct Route {
    method: String,
    template: PathTemplate,
    intent: IntentKey,
}

impl Route {
    fn accepts(&self, method: &str) -> bool {
        self.method == "*" || self.method.eq_ignore_ascii_case(method)
    }
}

/// Routes requests by explicit (method, template) → intent mappings.
#[derive(Debug, Clone, Default)]
pub struct DeclarativeResolver {
    routes: Vec<Route>,
    fallback: RestResolver,
}

impl DeclarativeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `[[routes]]` config entries, in file order.
    pub fn from_config(routes: &[RouteConfig]) -> Self {
        routes.iter().fold(Self::new(), |resolver, route| {
            resolver.route(&route.method, &route.path, route.intent.as_str())
        })
    }

    /// Add a route. Earlier routes take precedence.
    pub fn route(mut self, method: &str, template: &str, intent: impl Into<IntentKey>) -> Self {
        self.routes.push(Route {
            method: method.to_ascii_uppercase(),
            template: PathTemplate::parse(template),
            intent: intent.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl IntentResolver for DeclarativeResolver {
    fn resolve(&self, request: &NormalizedRequest) -> Result<Intent, PipelineError> {
        let matched = self.routes.iter().find_map(|route| {
            if !route.accepts(request.method()) {
                return None;
            }
            route
                .template
                .matches(request.path())
                .map(|captures| (route, captures))
        });

        let Some((route, captures)) = matched else {
            tracing::debug!(
                method = %request.method(),
                path = %request.path(),
                "No declarative route matched, using REST convention"
            );
            return self.fallback.resolve(request);
        };

        let params = request
            .params()
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .chain(captures.into_iter().map(|(k, v)| (k, Value::String(v))));

        Ok(Intent::new(
            route.intent.clone(),
            build_payload(request.body(), params),
        ))
    }
}
