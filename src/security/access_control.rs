//! Resource-prefix authorization.
//!
//! A partner may reach a path when any of its granted resources is a literal
//! string prefix of that path. Matching is not segment aware: a grant of
//! `/post` also covers `/posts/1`.

use std::sync::Arc;

use crate::error::GatewayError;
use crate::store::{Partner, PartnerStore};

/// True if any granted prefix starts `path`.
pub fn is_permitted<S: AsRef<str>>(grants: &[S], path: &str) -> bool {
    grants.iter().any(|grant| path.starts_with(grant.as_ref()))
}

#[derive(Clone)]
pub struct Authorizer {
    store: Arc<dyn PartnerStore>,
}

impl Authorizer {
    pub fn new(store: Arc<dyn PartnerStore>) -> Self {
        Self { store }
    }

    /// Check a resolved `path` against the partner's grants.
    pub async fn authorize(&self, partner: &Partner, path: &str) -> Result<(), GatewayError> {
        let grants = self.store.permissions(&partner.api_key).await?;

        if is_permitted(&grants, path) {
            Ok(())
        } else {
            tracing::warn!(partner_id = partner.id, partner = %partner.name, path = %path, "Access denied");
            Err(GatewayError::PermissionDenied)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::logging::capture::CapturedLogs;
    use crate::store::{NewPartner, SqliteStore};

    #[test]
    fn test_prefix_direction() {
        let grants = ["/posts"];
        assert!(is_permitted(&grants, "/posts"));
        assert!(is_permitted(&grants, "/posts/1"));
        assert!(is_permitted(&grants, "/posts/1/comments"));
        assert!(!is_permitted(&grants, "/post"));
        assert!(!is_permitted(&grants, "/users/1"));
        assert!(!is_permitted(&grants, "/"));
    }

    #[test]
    fn test_not_segment_aware() {
        assert!(is_permitted(&["/post"], "/posts/1"));
        assert!(is_permitted(&["/posts"], "/postsecret"));
    }

    #[test]
    fn test_root_grant_permits_everything() {
        let grants = ["/".to_string()];
        for path in ["/", "/posts/1", "/users", "/todos/1?x=1"] {
            assert!(is_permitted(&grants, path));
        }
    }

    #[test]
    fn test_empty_grants_deny() {
        let grants: [&str; 0] = [];
        assert!(!is_permitted(&grants, "/"));
        assert!(!is_permitted(&grants, "/posts"));
    }

    #[tokio::test]
    async fn test_denial_log_names_partner_not_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        let partner = store
            .insert_partner(NewPartner::new("Partner A", "secret_key_a", 10))
            .await
            .unwrap();
        let authorizer = Authorizer::new(Arc::new(store));

        let logs = CapturedLogs::default();
        let _guard = logs.install();
        assert!(authorizer.authorize(&partner, "/users/1").await.is_err());

        let output = logs.contents();
        assert!(output.contains("Access denied"));
        assert!(output.contains(&format!("partner_id={}", partner.id)));
        assert!(!output.contains("secret_key_a"));
    }

    #[tokio::test]
    async fn test_authorize_against_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = store.insert_partner(NewPartner::new("A", "key_a", 10)).await.unwrap();
        let none = store.insert_partner(NewPartner::new("B", "key_none", 10)).await.unwrap();
        store.grant_permission(a.id, "/posts").await.unwrap();

        let authorizer = Authorizer::new(Arc::new(store));
        assert!(authorizer.authorize(&a, "/posts/1").await.is_ok());
        assert!(matches!(
            authorizer.authorize(&a, "/users/1").await,
            Err(GatewayError::PermissionDenied)
        ));
        assert!(matches!(
            authorizer.authorize(&none, "/posts").await,
            Err(GatewayError::PermissionDenied)
        ));
    }
}
