//! API key authentication against the partner store.

use axum::http::HeaderMap;
use std::borrow::Cow;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::store::{Partner, PartnerStore};

/// Header carrying the partner credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Raw credential from the request headers, if the header is present.
///
/// Bytes that are not valid UTF-8 are replaced rather than discarded, so such
/// a header still counts as present and fails as an unknown key.
pub fn credential(headers: &HeaderMap) -> Option<Cow<'_, str>> {
    headers
        .get(API_KEY_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()))
}

/// Resolves a credential to an active [`Partner`].
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn PartnerStore>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn PartnerStore>) -> Self {
        Self { store }
    }

    pub async fn authenticate(&self, credential: Option<&str>) -> Result<Partner, GatewayError> {
        let api_key = match credential {
            Some(key) if !key.is_empty() => key,
            _ => return Err(GatewayError::MissingCredential),
        };

        let partner = self
            .store
            .lookup(api_key)
            .await?
            .ok_or(GatewayError::InvalidCredential)?;

        if !partner.active {
            return Err(GatewayError::InactiveCredential);
        }

        Ok(partner)
    }
}
