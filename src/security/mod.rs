//! Security subsystem: the gates a request passes before it is forwarded.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → auth.rs (X-API-Key → active Partner)
//!     → rate_limit.rs (per-partner rolling window)
//!     → access_control.rs (granted resource prefixes)
//!     → headers.rs (strip Host/Content-Length before forwarding)
//!     → Pass to forwarder
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - Checks run in a fixed order and each runs once
//! - No trust in client input

pub mod access_control;
pub mod auth;
pub mod headers;
pub mod rate_limit;

pub use access_control::Authorizer;
pub use auth::{Authenticator, API_KEY_HEADER};
pub use rate_limit::RateLimiter;
