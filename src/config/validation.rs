//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, ports valid, capacity fits)
//! - Detect duplicate backends
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: LbConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::LbConfig;
use crate::load_balancer::backend::MAX_HOST_LEN;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("backends[{index}]: host is empty")]
    EmptyHost { index: usize },

    #[error("backends[{index}]: host is longer than {max} bytes", max = MAX_HOST_LEN)]
    HostTooLong { index: usize },

    #[error("backends[{index}]: host is not ASCII")]
    HostNotAscii { index: usize },

    #[error("backends[{index}]: port is 0")]
    ZeroPort { index: usize },

    #[error("backends[{index}]: duplicate backend {host}:{port}")]
    Duplicate { index: usize, host: String, port: u16 },

    #[error("{count} backends configured but max_backends is {max}")]
    TooManyBackends { count: usize, max: usize },

    #[error("{field} must be greater than 0")]
    Zero { field: &'static str },
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &LbConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.max_backends == 0 {
        errors.push(ValidationError::Zero { field: "max_backends" });
    } else if config.backends.len() > config.max_backends {
        errors.push(ValidationError::TooManyBackends {
            count: config.backends.len(),
            max: config.max_backends,
        });
    }
    if config.worker_threads == Some(0) {
        errors.push(ValidationError::Zero { field: "worker_threads" });
    }

    let core = &config.core;
    let positive = [
        ("core.connect_timeout_ms", core.connect_timeout_ms),
        ("core.read_timeout_ms", core.read_timeout_ms),
        ("core.write_timeout_ms", core.write_timeout_ms),
        ("core.keepalive_timeout_ms", core.keepalive_timeout_ms),
        ("core.health_check_interval_ms", core.health_check_interval_ms),
        ("core.max_connections", core.max_connections),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    let mut seen = HashSet::new();
    for (index, backend) in config.backends.iter().enumerate() {
        if backend.host.is_empty() {
            errors.push(ValidationError::EmptyHost { index });
        } else if !backend.host.is_ascii() {
            errors.push(ValidationError::HostNotAscii { index });
        } else if backend.host.len() > MAX_HOST_LEN {
            errors.push(ValidationError::HostTooLong { index });
        }
        if backend.port == 0 {
            errors.push(ValidationError::ZeroPort { index });
        }
        if !seen.insert((backend.host.as_str(), backend.port)) {
            errors.push(ValidationError::Duplicate {
                index,
                host: backend.host.clone(),
                port: backend.port,
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
