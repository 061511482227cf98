//! Per-request gatekeeping pipeline.
//!
//! # Stages
//! ```text
//! Start → Authenticated → RateChecked → Authorized → Forwarded → Recorded → Done
//! ```
//!
//! A failure before `Forwarded` ends the request with its error response and
//! nothing is recorded. Once the forward has been attempted a usage record is
//! always written, whatever the outcome. No stage is retried.
//!
//! The forward and the usage write run on tasks owned by the gateway's
//! tracker. Dropping the inbound request future (server timeout, client
//! disconnect) does not cancel them, and [`Gateway::drain`] waits for them
//! at shutdown.

use axum::{
    body::Body,
    http::Request,
    response::{IntoResponse, Response},
};
use http_body_util::LengthLimitError;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::gateway::forwarder::{ForwardError, Forwarder, OutboundRequest, UpstreamResponse};
use crate::gateway::usage::UsageRecorder;
use crate::http::request::request_id;
use crate::observability::metrics;
use crate::security::auth::credential;
use crate::security::{Authenticator, Authorizer, RateLimiter};
use crate::store::{Partner, PartnerStore, UsageRecord};

/// Owns every stage, the shared rate-window state and the in-flight exchanges.
pub struct Gateway {
    authenticator: Authenticator,
    rate_limiter: Arc<RateLimiter>,
    authorizer: Authorizer,
    forwarder: Arc<Forwarder>,
    recorder: UsageRecorder,
    tasks: TaskTracker,
    max_body_size: usize,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, store: Arc<dyn PartnerStore>) -> Result<Self, ForwardError> {
        Ok(Self {
            authenticator: Authenticator::new(store.clone()),
            rate_limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            authorizer: Authorizer::new(store.clone()),
            forwarder: Arc::new(Forwarder::new(&config.upstream)?),
            recorder: UsageRecorder::new(store),
            tasks: TaskTracker::new(),
            max_body_size: config.security.max_body_size,
        })
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Run one inbound request through every stage and produce the response.
    pub async fn handle(&self, request: Request<Body>) -> Response {
        let start = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();
        let request_id = request_id(request.headers()).to_string();

        let response = match self.process(request, &request_id).await {
            Ok(upstream) => upstream.into_response(),
            Err(err) => {
                match &err {
                    GatewayError::UpstreamUnavailable(e) => {
                        tracing::error!(request_id = %request_id, path = %path, error = %e, "Upstream request failed");
                    }
                    GatewayError::Store(e) => {
                        tracing::error!(request_id = %request_id, path = %path, error = %e, "Partner store failure");
                    }
                    _ => {
                        tracing::info!(request_id = %request_id, method = %method, path = %path, reason = err.reason(), "Request rejected");
                    }
                }
                metrics::record_rejection(err.reason());
                err.into_response()
            }
        };

        metrics::record_request(method.as_str(), response.status().as_u16(), start);
        response
    }

    /// Wait for every in-flight forward and usage write. Called once the
    /// listener has stopped accepting requests.
    pub async fn drain(&self) {
        self.tasks.close();
        let pending = self.tasks.len();
        if pending > 0 {
            tracing::info!(pending, "Waiting for in-flight exchanges");
        }
        self.tasks.wait().await;
    }

    async fn process(
        &self,
        request: Request<Body>,
        request_id: &str,
    ) -> Result<UpstreamResponse, GatewayError> {
        let (parts, body) = request.into_parts();

        let partner = self
            .authenticator
            .authenticate(credential(&parts.headers).as_deref())
            .await?;

        self.rate_limiter
            .check(&partner.api_key, partner.rate_limit)
            .inspect_err(|_| {
                tracing::warn!(
                    request_id = %request_id,
                    partner_id = partner.id,
                    partner = %partner.name,
                    limit = partner.rate_limit,
                    "Rate limit exceeded"
                );
            })?;

        let path = self.forwarder.resolve_path(parts.uri.path());
        self.authorizer.authorize(&partner, &path).await?;

        let body = axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(body_error)?;

        tracing::debug!(
            request_id = %request_id,
            partner = %partner.name,
            method = %parts.method,
            path = %path,
            "Request admitted"
        );

        let exchange = self.spawn_exchange(
            partner,
            OutboundRequest {
                method: parts.method,
                path,
                query: parts.uri.query().map(str::to_owned),
                headers: parts.headers,
                body,
            },
            request_id.to_string(),
        );

        match exchange.await {
            Ok(outcome) => outcome.map_err(GatewayError::from),
            Err(e) => Err(ForwardError::Aborted(e.to_string()).into()),
        }
    }

    /// Forward, then queue the usage write, on a tracked task.
    fn spawn_exchange(
        &self,
        partner: Partner,
        request: OutboundRequest,
        request_id: String,
    ) -> JoinHandle<Result<UpstreamResponse, ForwardError>> {
        let forwarder = Arc::clone(&self.forwarder);
        let recorder = self.recorder.clone();
        let tasks = self.tasks.clone();

        self.tasks.spawn(async move {
            let method = request.method.clone();
            let path = request.path.clone();
            let outcome = forwarder.forward(request).await;

            let status = match &outcome {
                Ok(response) => Some(response.status.as_u16()),
                Err(e) => {
                    metrics::record_upstream_failure(e.kind());
                    None
                }
            };
            let record = UsageRecorder::entry(&partner, &method, &path, status);
            tasks.spawn(record_usage(recorder, record, request_id));

            outcome
        })
    }
}

/// Persist one record off the response path. A failure is logged and
/// counted, then dropped: auditing never changes what the caller receives.
async fn record_usage(recorder: UsageRecorder, record: UsageRecord, request_id: String) {
    if let Err(e) = recorder.record(&record).await {
        metrics::record_usage_failure();
        tracing::warn!(
            request_id = %request_id,
            partner_id = record.partner_id,
            path = %record.path,
            status = record.status_code,
            error = %e,
            "Usage record dropped"
        );
    }
}

/// Only the configured size limit is a 413; any other failure reading the
/// body (client abort, framing error) is the caller's malformed request.
fn body_error(err: axum::Error) -> GatewayError {
    let mut source = std::error::Error::source(&err);
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return GatewayError::PayloadTooLarge;
        }
        source = cause.source();
    }
    GatewayError::InvalidBody(err.to_string())
}
