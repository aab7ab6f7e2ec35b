//! Configuration validation.
//!
//! Serde handles syntax; this module checks semantics before the config is
//! accepted into the system. All violations are collected, not just the
//! first.

use thiserror::Error;
use url::Url;

use crate::balancer;
use crate::config::schema::ProxyConfig;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("no backends configured")]
    NoBackends,

    #[error("invalid backend target {url}: {reason}")]
    InvalidBackend { url: String, reason: String },

    #[error("unknown balancer algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),
}

/// Pure semantic check of a loaded configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    for target in &config.backends {
        if let Some(reason) = target_problem(target) {
            errors.push(ValidationError::InvalidBackend {
                url: target.clone(),
                reason,
            });
        }
    }

    if !balancer::is_registered(&config.balancer.algorithm) {
        errors.push(ValidationError::UnknownAlgorithm(
            config.balancer.algorithm.clone(),
        ));
    }

    if config.health_check.interval_secs == 0 {
        errors.push(ValidationError::ZeroValue("health_check.interval_secs"));
    }
    if config.health_check.timeout_secs == 0 {
        errors.push(ValidationError::ZeroValue("health_check.timeout_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroValue("timeouts.request_secs"));
    }
    if config.listener.max_inflight == 0 {
        errors.push(ValidationError::ZeroValue("listener.max_inflight"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn target_problem(target: &str) -> Option<String> {
    match Url::parse(target) {
        Err(err) => Some(err.to_string()),
        Ok(url) if url.scheme() != "http" => {
            // Upstream TLS is out of scope, so only plain HTTP targets.
            Some(format!("unsupported scheme {:?}", url.scheme()))
        }
        Ok(url) if url.host_str().is_none() => Some("missing host".to_string()),
        Ok(_) => None,
    }
}
