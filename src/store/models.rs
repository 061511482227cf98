//! Records kept by the partner store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status stored for a request whose forward never produced an upstream status.
pub const STATUS_UPSTREAM_FAILURE: u16 = 0;

/// A registered API consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partner {
    pub id: i64,
    pub name: String,
    pub api_key: String,
    /// Inactive partners are rejected at authentication.
    pub active: bool,
    /// Maximum requests per rolling window.
    pub rate_limit: u32,
}

/// Provisioning input for a new partner.
#[derive(Debug, Clone)]
pub struct NewPartner {
    pub name: String,
    pub api_key: String,
    pub active: bool,
    pub rate_limit: u32,
}

impl NewPartner {
    /// An active partner with the given per-window limit.
    pub fn new(name: impl Into<String>, api_key: impl Into<String>, rate_limit: u32) -> Self {
        Self {
            name: name.into(),
            api_key: api_key.into(),
            active: true,
            rate_limit,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Grants a partner every path beginning with `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub partner_id: i64,
    pub resource: String,
}

/// Append-only audit entry for one forwarded request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub partner_id: i64,
    pub api_key: String,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub path: String,
    /// Upstream status, or [`STATUS_UPSTREAM_FAILURE`].
    pub status_code: u16,
}

impl UsageRecord {
    /// Whether the forward failed before any upstream status was obtained.
    pub fn is_upstream_failure(&self) -> bool {
        self.status_code == STATUS_UPSTREAM_FAILURE
    }
}
