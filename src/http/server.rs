//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router for the proxied methods on every path
//! - Wire up middleware (request ID, tracing, timeout)
//! - Hand each request to the gateway pipeline
//! - Run background maintenance (rate-window sweep)
//! - Drain on shutdown, including in-flight forwards and usage writes

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::{get, MethodRouter},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::GatewayConfig;
use crate::gateway::{ForwardError, Gateway};
use crate::http::request::MakeRequestUuid;
use crate::store::PartnerStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

/// HTTP server for the partner gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    gateway: Arc<Gateway>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and store.
    pub fn new(config: GatewayConfig, store: Arc<dyn PartnerStore>) -> Result<Self, ForwardError> {
        let gateway = Arc::new(Gateway::new(&config, store)?);
        let state = AppState {
            gateway: gateway.clone(),
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            gateway,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let proxied: MethodRouter<AppState> = get(proxy_handler)
            .post(proxy_handler)
            .put(proxy_handler)
            .patch(proxy_handler)
            .delete(proxy_handler);

        Router::new()
            .route("/", proxied.clone())
            .route("/{*path}", proxied)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The fully layered router, for serving or driving in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener until
    /// the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.base_url,
            "HTTP server starting"
        );

        let cleanup = self.gateway.rate_limiter().spawn_cleanup(
            Duration::from_secs(self.config.rate_limit.cleanup_interval_secs),
            shutdown.resubscribe(),
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        cleanup.abort();
        self.gateway.drain().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.gateway.handle(request).await
}
