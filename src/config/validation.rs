//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (pool sizes > 0, core <= max, timeouts > 0)
//! - Validate addresses of enabled foyers
//! - Validate declarative route templates
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HorizonConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{HorizonConfig, StageConfig};

/// One semantic problem, tagged with the offending field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed config, collecting every problem found.
pub fn validate_config(config: &HorizonConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let foyers = [
        ("http", config.http.enabled, &config.http.bind_address),
        ("websocket", config.websocket.enabled, &config.websocket.bind_address),
        ("rpc", config.rpc.enabled, &config.rpc.bind_address),
    ];
    for (name, enabled, address) in foyers {
        if enabled {
            check_address(&mut errors, &format!("{name}.bind_address"), address);
        }
    }

    if config.websocket.enabled && !config.websocket.path.starts_with('/') {
        errors.push(ValidationError::new("websocket.path", "must start with '/'"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }
    if config.timeouts.idle_secs == 0 {
        errors.push(ValidationError::new("timeouts.idle_secs", "must be greater than 0"));
    }
    if config.timeouts.write_secs == 0 {
        errors.push(ValidationError::new("timeouts.write_secs", "must be greater than 0"));
    }

    check_stage(&mut errors, "stages.rendezvous", &config.stages.rendezvous);
    check_stage(&mut errors, "stages.conductor", &config.stages.conductor);
    check_stage(&mut errors, "stages.central", &config.stages.central);

    if config.stages.handler_deadline_ms == Some(0) {
        errors.push(ValidationError::new(
            "stages.handler_deadline_ms",
            "must be greater than 0 when set",
        ));
    }

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    for (i, route) in config.routes.iter().enumerate() {
        if !route.path.starts_with('/') {
            errors.push(ValidationError::new(
                format!("routes[{i}].path"),
                format!("'{}' must start with '/'", route.path),
            ));
        }
        if route.intent.trim().is_empty() {
            errors.push(ValidationError::new(format!("routes[{i}].intent"), "must not be empty"));
        }
        if route.method.trim().is_empty() {
            errors.push(ValidationError::new(format!("routes[{i}].method"), "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, address: &str) {
    if address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{address}' is not a valid socket address"),
        ));
    }
}

fn check_stage(errors: &mut Vec<ValidationError>, field: &str, stage: &StageConfig) {
    if stage.max_threads == 0 {
        errors.push(ValidationError::new(
            format!("{field}.max_threads"),
            "must be greater than 0",
        ));
    }
    if stage.core_threads > stage.max_threads {
        errors.push(ValidationError::new(
            format!("{field}.core_threads"),
            format!(
                "{} exceeds max_threads ({})",
                stage.core_threads, stage.max_threads
            ),
        ));
    }
    if stage.queue_capacity == 0 {
        errors.push(ValidationError::new(
            format!("{field}.queue_capacity"),
            "must be greater than 0",
        ));
    }
}
