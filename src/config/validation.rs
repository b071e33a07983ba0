//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, lengths sane)
//! - Validate endpoint URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: OrchestratorConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::OrchestratorConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &OrchestratorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if url::Url::parse(&config.blockchain.rpc_url).is_err() {
        errors.push(ValidationError::new("blockchain.rpc_url", "not a valid URL"));
    }
    for failover in &config.blockchain.failover_urls {
        if url::Url::parse(failover).is_err() {
            errors.push(ValidationError::new(
                "blockchain.failover_urls",
                format!("'{}' is not a valid URL", failover),
            ));
        }
    }
    if config.blockchain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("blockchain.rpc_timeout_secs", "must be > 0"));
    }
    if url::Url::parse(&config.index.base_url).is_err() {
        errors.push(ValidationError::new("index.base_url", "not a valid URL"));
    }

    let v = &config.verification;
    if !(4..=12).contains(&v.pin_length) {
        errors.push(ValidationError::new("verification.pin_length", "must be between 4 and 12"));
    }
    if v.totp_step_secs == 0 {
        errors.push(ValidationError::new("verification.totp_step_secs", "must be > 0"));
    }
    if !(6..=8).contains(&v.totp_digits) {
        errors.push(ValidationError::new("verification.totp_digits", "must be 6, 7 or 8"));
    }
    if v.challenge_ttl_secs == 0 {
        errors.push(ValidationError::new("verification.challenge_ttl_secs", "must be > 0"));
    }

    if config.prediction.timeout_secs == 0 {
        errors.push(ValidationError::new("prediction.timeout_secs", "must be > 0"));
    }
    if config.prediction.max_attempts == 0 {
        errors.push(ValidationError::new("prediction.max_attempts", "must be > 0"));
    }
    if let Some(hash) = &config.prediction.init_code_hash {
        if hash.parse::<alloy::primitives::B256>().is_err() {
            errors.push(ValidationError::new(
                "prediction.init_code_hash",
                "must be a 32-byte hex string",
            ));
        }
    }
    if config.submission.max_attempts == 0 {
        errors.push(ValidationError::new("submission.max_attempts", "must be > 0"));
    }

    let t = &config.tracker;
    if t.timeout_secs == 0 {
        errors.push(ValidationError::new("tracker.timeout_secs", "must be > 0"));
    }
    if t.poll_interval_ms == 0 {
        errors.push(ValidationError::new("tracker.poll_interval_ms", "must be > 0"));
    }
    if t.event_buffer == 0 {
        errors.push(ValidationError::new("tracker.event_buffer", "must be > 0"));
    }
    for (kind, secs) in &t.timeout_overrides {
        if *secs == 0 {
            errors.push(ValidationError::new(
                "tracker.timeout_overrides",
                format!("budget for '{}' must be > 0", kind),
            ));
        }
    }

    if config.reconciler.enabled && config.reconciler.interval_secs == 0 {
        errors.push(ValidationError::new("reconciler.interval_secs", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
