//! Partner API Gateway Library
//!
//! Authenticates each request by `X-API-Key`, applies the partner's rolling
//! rate limit and resource grants, relays it to one fixed upstream, and
//! records the outcome.

pub mod config;
pub mod error;
pub mod gateway;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
