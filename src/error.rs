//! Gateway error taxonomy and its mapping to client responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::gateway::forwarder::ForwardError;
use crate::store::StoreError;

/// Every way a request can fail inside the gateway.
///
/// The credential, rate and permission variants are client-facing and terminal;
/// none of them is retried.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing API Key")]
    MissingCredential,

    #[error("Invalid API Key")]
    InvalidCredential,

    #[error("API Key inactive")]
    InactiveCredential,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Access denied to this resource")]
    PermissionDenied,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(#[from] ForwardError),

    #[error("Partner store failure: {0}")]
    Store(#[from] StoreError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingCredential
            | Self::InvalidCredential
            | Self::InactiveCredential
            | Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message returned to the caller. Infrastructure details stay in the logs.
    pub fn detail(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Missing API Key",
            Self::InvalidCredential => "Invalid API Key",
            Self::InactiveCredential => "API Key inactive",
            Self::RateLimitExceeded => "Rate limit exceeded",
            Self::PermissionDenied => "Access denied to this resource",
            Self::PayloadTooLarge => "Request body too large",
            Self::InvalidBody(_) => "Invalid request body",
            Self::UpstreamUnavailable(_) => "Upstream unavailable",
            Self::Store(_) => "Internal server error",
        }
    }

    /// Short label used for the rejection metric.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::InvalidCredential => "invalid_credential",
            Self::InactiveCredential => "inactive_credential",
            Self::RateLimitExceeded => "rate_limited",
            Self::PermissionDenied => "permission_denied",
            Self::PayloadTooLarge => "payload_too_large",
            Self::InvalidBody(_) => "invalid_body",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Store(_) => "store_failure",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}
