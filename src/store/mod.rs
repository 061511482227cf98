//! Partner, permission and usage persistence.
//!
//! The gateway only ever performs point lookups and appends, so the store is
//! a narrow async trait. [`SqliteStore`] is the shipped implementation; tests
//! and alternative backends implement [`PartnerStore`] directly.

pub mod models;
pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

pub use models::{NewPartner, Partner, Permission, UsageRecord, STATUS_UPSTREAM_FAILURE};
pub use sqlite::SqliteStore;

/// Errors raised by a partner store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A unique constraint (the API key) was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A record failed validation or could not be decoded.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The referenced partner does not exist.
    #[error("unknown partner: {0}")]
    UnknownPartner(String),
}

/// Keyed record store backing authentication, authorization and auditing.
#[async_trait]
pub trait PartnerStore: Send + Sync {
    /// Resolve an API key to its partner, active or not.
    async fn lookup(&self, api_key: &str) -> Result<Option<Partner>, StoreError>;

    /// Resource prefixes granted to the partner owning `api_key`.
    async fn permissions(&self, api_key: &str) -> Result<Vec<String>, StoreError>;

    /// Append one usage record.
    async fn record_usage(&self, record: &UsageRecord) -> Result<(), StoreError>;

    /// Register a partner; the API key must be unused.
    async fn insert_partner(&self, partner: NewPartner) -> Result<Partner, StoreError>;

    /// Grant a resource prefix to an existing partner.
    async fn grant_permission(&self, partner_id: i64, resource: &str)
        -> Result<Permission, StoreError>;

    /// Most recent usage records for a key, newest first.
    async fn recent_usage(&self, api_key: &str, limit: u32)
        -> Result<Vec<UsageRecord>, StoreError>;
}
