//! Configuration validation.
//!
//! Serde handles the syntactic side; this checks value ranges and formats.
//! Every problem is reported, not just the first one.

use std::net::SocketAddr;
use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("upstream.base_url: '{0}' must be an absolute http or https URL")]
    InvalidUpstream(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("store.database_url must not be empty")]
    EmptyDatabaseUrl,

    #[error(
        "timeouts.request_secs ({request_secs}) must exceed upstream.request_timeout_secs ({upstream_secs})"
    )]
    TimeoutOrder { request_secs: u64, upstream_secs: u64 },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "listener.bind_address",
            value: config.listener.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    match Url::parse(&config.upstream.base_url) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
        _ => errors.push(ValidationError::InvalidUpstream(config.upstream.base_url.clone())),
    }

    let positive: [(&'static str, u64); 6] = [
        ("upstream.connect_timeout_secs", config.upstream.connect_timeout_secs),
        ("upstream.request_timeout_secs", config.upstream.request_timeout_secs),
        ("rate_limit.window_secs", config.rate_limit.window_secs),
        ("rate_limit.cleanup_interval_secs", config.rate_limit.cleanup_interval_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("store.max_connections", u64::from(config.store.max_connections)),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero(field));
        }
    }

    // The upstream timeout has to fire before the server-wide one.
    let (request_secs, upstream_secs) =
        (config.timeouts.request_secs, config.upstream.request_timeout_secs);
    if request_secs > 0 && upstream_secs > 0 && request_secs <= upstream_secs {
        errors.push(ValidationError::TimeoutOrder {
            request_secs,
            upstream_secs,
        });
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }

    if config.store.database_url.trim().is_empty() {
        errors.push(ValidationError::EmptyDatabaseUrl);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
