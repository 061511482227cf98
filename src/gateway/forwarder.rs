//! Relays admitted requests to the fixed upstream.
//!
//! The caller's method, path, query, headers and body are sent unchanged
//! (minus the filtered headers) to the configured base URL. Redirects are
//! relayed to the caller rather than followed. Every outbound exchange is
//! bounded by the connect and request timeouts.

use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::security::headers::{strip_request_headers, strip_response_headers};

/// Why a forward produced no upstream response.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("upstream timed out")]
    Timeout,

    #[error("could not connect to upstream: {0}")]
    Connect(String),

    #[error("upstream protocol error: {0}")]
    Protocol(String),

    #[error("invalid upstream base url '{url}': {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("upstream base url '{0}' must be http or https with a host")]
    UnsupportedBaseUrl(String),

    #[error("could not build upstream client: {0}")]
    Client(String),

    #[error("upstream exchange aborted: {0}")]
    Aborted(String),
}

impl ForwardError {
    /// Short label used for the upstream failure metric.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect(_) => "connect",
            Self::Protocol(_) => "protocol",
            Self::InvalidBaseUrl { .. } | Self::UnsupportedBaseUrl(_) | Self::Client(_) => "setup",
            Self::Aborted(_) => "aborted",
        }
    }
}

impl From<reqwest::Error> for ForwardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else {
            Self::Protocol(err.to_string())
        }
    }
}

/// A validated request ready to leave the gateway.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Absolute path, leading `/`.
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// What the upstream answered, after header filtering.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct Forwarder {
    client: reqwest::Client,
    base_url: Url,
}

impl Forwarder {
    pub fn new(config: &UpstreamConfig) -> Result<Self, ForwardError> {
        let base_url = Url::parse(&config.base_url).map_err(|source| ForwardError::InvalidBaseUrl {
            url: config.base_url.clone(),
            source,
        })?;
        if !matches!(base_url.scheme(), "http" | "https") || !base_url.has_host() {
            return Err(ForwardError::UnsupportedBaseUrl(config.base_url.clone()));
        }

        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::none());
        if !config.use_system_proxy {
            builder = builder.no_proxy();
        }
        let client = builder
            .build()
            .map_err(|e| ForwardError::Client(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Canonical form of an inbound request path: absolute, with `.` and `..`
    /// segments (including percent-encoded ones) resolved. This is the path
    /// that is both authorized and forwarded.
    pub fn resolve_path(&self, raw: &str) -> String {
        let mut url = self.base_url.clone();
        url.set_path(raw);
        url.path().to_string()
    }

    /// Join `path` onto the base URL's own path and attach the query string.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Url {
        let mut url = self.base_url.clone();
        let joined = format!("{}{}", self.base_url.path().trim_end_matches('/'), path);
        url.set_path(&joined);
        url.set_query(query.filter(|q| !q.is_empty()));
        url
    }

    pub async fn forward(&self, request: OutboundRequest) -> Result<UpstreamResponse, ForwardError> {
        let url = self.target_url(&request.path, request.query.as_deref());
        let mut headers = request.headers;
        strip_request_headers(&mut headers);

        tracing::debug!(method = %request.method, url = %url, "Forwarding to upstream");

        let mut outbound = self.client.request(request.method, url).headers(headers);
        if !request.body.is_empty() {
            outbound = outbound.body(request.body);
        }

        let response = outbound.send().await?;
        let status = response.status();
        let mut headers = response.headers().clone();
        strip_response_headers(&mut headers);
        let body = response.bytes().await?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}
