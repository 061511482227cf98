//! Usage recording for forwarded requests.

use axum::http::Method;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

use crate::store::{Partner, PartnerStore, StoreError, UsageRecord, STATUS_UPSTREAM_FAILURE};

/// A usage record could not be persisted.
#[derive(Debug, Error)]
#[error("failed to record usage: {0}")]
pub struct RecordingError(#[from] pub StoreError);

/// Appends one [`UsageRecord`] per forwarded request.
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn PartnerStore>,
}

impl UsageRecorder {
    pub fn new(store: Arc<dyn PartnerStore>) -> Self {
        Self { store }
    }

    /// Build the record for a completed forward. `status` is `None` when the
    /// upstream never answered.
    pub fn entry(partner: &Partner, method: &Method, path: &str, status: Option<u16>) -> UsageRecord {
        UsageRecord {
            partner_id: partner.id,
            api_key: partner.api_key.clone(),
            timestamp: Utc::now(),
            method: method.as_str().to_string(),
            path: path.to_string(),
            status_code: status.unwrap_or(STATUS_UPSTREAM_FAILURE),
        }
    }

    pub async fn record(&self, record: &UsageRecord) -> Result<(), RecordingError> {
        self.store.record_usage(record).await?;
        Ok(())
    }
}
