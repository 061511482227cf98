//! SQLite-backed partner store.

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

use super::models::{NewPartner, Partner, Permission, UsageRecord};
use super::{PartnerStore, StoreError};
use crate::config::StoreConfig;

const SCHEMA: [&str; 4] = [
    r"
    CREATE TABLE IF NOT EXISTS partners (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        api_key TEXT UNIQUE NOT NULL,
        active BOOLEAN NOT NULL DEFAULT 1,
        rate_limit INTEGER NOT NULL DEFAULT 60
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS permissions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        partner_id INTEGER NOT NULL REFERENCES partners(id),
        resource TEXT NOT NULL,
        UNIQUE (partner_id, resource)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS api_usage (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        partner_id INTEGER NOT NULL,
        api_key TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        method TEXT NOT NULL,
        path TEXT NOT NULL,
        status_code INTEGER NOT NULL
    )
    ",
    r"
    CREATE INDEX IF NOT EXISTS idx_api_usage_api_key ON api_usage (api_key)
    ",
];

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) the database named by `config.database_url`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// A private in-memory database with the schema already created.
    ///
    /// Pinned to a single long-lived connection: every SQLite in-memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create tables and indexes. Safe to run repeatedly.
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    fn get_required<'r, T>(row: &'r SqliteRow, column: &str) -> Result<T, StoreError>
    where
        T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
    {
        row.try_get::<T, _>(column)
            .map_err(|e| StoreError::InvalidRecord(format!("column '{column}': {e}")))
    }

    fn row_to_partner(row: &SqliteRow) -> Result<Partner, StoreError> {
        let rate_limit: i64 = Self::get_required(row, "rate_limit")?;
        Ok(Partner {
            id: Self::get_required(row, "id")?,
            name: Self::get_required(row, "name")?,
            api_key: Self::get_required(row, "api_key")?,
            active: Self::get_required(row, "active")?,
            rate_limit: u32::try_from(rate_limit).map_err(|e| {
                StoreError::InvalidRecord(format!("rate_limit {rate_limit} out of range: {e}"))
            })?,
        })
    }

    fn row_to_usage(row: &SqliteRow) -> Result<UsageRecord, StoreError> {
        let status: i64 = Self::get_required(row, "status_code")?;
        Ok(UsageRecord {
            partner_id: Self::get_required(row, "partner_id")?,
            api_key: Self::get_required(row, "api_key")?,
            timestamp: Self::get_required(row, "timestamp")?,
            method: Self::get_required(row, "method")?,
            path: Self::get_required(row, "path")?,
            status_code: u16::try_from(status).map_err(|e| {
                StoreError::InvalidRecord(format!("status_code {status} out of range: {e}"))
            })?,
        })
    }
}

#[async_trait]
impl PartnerStore for SqliteStore {
    async fn lookup(&self, api_key: &str) -> Result<Option<Partner>, StoreError> {
        let row = sqlx::query(
            r"
            SELECT id, name, api_key, active, rate_limit
            FROM partners
            WHERE api_key = ?
            ",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| Self::row_to_partner(&row)).transpose()
    }

    async fn permissions(&self, api_key: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT p.resource
            FROM permissions p
            JOIN partners pa ON pa.id = p.partner_id
            WHERE pa.api_key = ?
            ",
        )
        .bind(api_key)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| Self::get_required(row, "resource"))
            .collect()
    }

    async fn record_usage(&self, record: &UsageRecord) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO api_usage (partner_id, api_key, timestamp, method, path, status_code)
            VALUES (?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(record.partner_id)
        .bind(&record.api_key)
        .bind(record.timestamp)
        .bind(&record.method)
        .bind(&record.path)
        .bind(i64::from(record.status_code))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_partner(&self, partner: NewPartner) -> Result<Partner, StoreError> {
        if partner.rate_limit == 0 {
            return Err(StoreError::InvalidRecord(format!(
                "partner '{}' must have a positive rate limit",
                partner.name
            )));
        }

        let result = sqlx::query(
            r"
            INSERT INTO partners (name, api_key, active, rate_limit)
            VALUES (?, ?, ?, ?)
            ",
        )
        .bind(&partner.name)
        .bind(&partner.api_key)
        .bind(partner.active)
        .bind(i64::from(partner.rate_limit))
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StoreError::Conflict(format!(
                    "partner with key {} already exists",
                    partner.api_key
                )));
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(partner_id = id, name = %partner.name, "partner added");

        Ok(Partner {
            id,
            name: partner.name,
            api_key: partner.api_key,
            active: partner.active,
            rate_limit: partner.rate_limit,
        })
    }

    async fn grant_permission(
        &self,
        partner_id: i64,
        resource: &str,
    ) -> Result<Permission, StoreError> {
        let result = sqlx::query(
            r"
            INSERT OR IGNORE INTO permissions (partner_id, resource)
            VALUES (?, ?)
            ",
        )
        .bind(partner_id)
        .bind(resource)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(Permission {
                partner_id,
                resource: resource.to_string(),
            }),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(StoreError::UnknownPartner(partner_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn recent_usage(
        &self,
        api_key: &str,
        limit: u32,
    ) -> Result<Vec<UsageRecord>, StoreError> {
        let rows = sqlx::query(
            r"
            SELECT partner_id, api_key, timestamp, method, path, status_code
            FROM api_usage
            WHERE api_key = ?
            ORDER BY id DESC
            LIMIT ?
            ",
        )
        .bind(api_key)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_usage).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::STATUS_UPSTREAM_FAILURE;
    use chrono::Utc;

    #[tokio::test]
    async fn test_partner_lookup() {
        let store = SqliteStore::in_memory().await.unwrap();
        let added = store
            .insert_partner(NewPartner::new("Partner A", "key_a", 10))
            .await
            .unwrap();

        let found = store.lookup("key_a").await.unwrap().unwrap();
        assert_eq!(found, added);
        assert!(found.active);
        assert_eq!(found.rate_limit, 10);

        assert!(store.lookup("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_partner_is_still_returned() {
        let store = SqliteStore::in_memory().await.unwrap();
        store
            .insert_partner(NewPartner::new("Old", "key_old", 5).inactive())
            .await
            .unwrap();

        let found = store.lookup("key_old").await.unwrap().unwrap();
        assert!(!found.active);
    }

    #[tokio::test]
    async fn test_duplicate_key_conflicts() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.insert_partner(NewPartner::new("A", "dup", 1)).await.unwrap();

        let err = store.insert_partner(NewPartner::new("B", "dup", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_zero_rate_limit_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store.insert_partner(NewPartner::new("A", "k", 0)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[tokio::test]
    async fn test_permissions_by_key() {
        let store = SqliteStore::in_memory().await.unwrap();
        let a = store.insert_partner(NewPartner::new("A", "key_a", 10)).await.unwrap();
        let b = store.insert_partner(NewPartner::new("B", "key_b", 10)).await.unwrap();
        store.grant_permission(a.id, "/posts").await.unwrap();
        store.grant_permission(a.id, "/comments").await.unwrap();
        store.grant_permission(a.id, "/posts").await.unwrap();
        store.grant_permission(b.id, "/users").await.unwrap();

        let mut granted = store.permissions("key_a").await.unwrap();
        granted.sort();
        assert_eq!(granted, vec!["/comments".to_string(), "/posts".to_string()]);
        assert_eq!(store.permissions("key_b").await.unwrap(), vec!["/users".to_string()]);
        assert!(store.permissions("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_to_unknown_partner() {
        let store = SqliteStore::in_memory().await.unwrap();
        let err = store.grant_permission(42, "/").await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownPartner(_)));
    }

    #[tokio::test]
    async fn test_usage_newest_first() {
        let store = SqliteStore::in_memory().await.unwrap();
        let partner = store.insert_partner(NewPartner::new("A", "key_a", 10)).await.unwrap();

        for (path, status) in [("/posts/1", 200), ("/posts/2", STATUS_UPSTREAM_FAILURE)] {
            store
                .record_usage(&UsageRecord {
                    partner_id: partner.id,
                    api_key: partner.api_key.clone(),
                    timestamp: Utc::now(),
                    method: "GET".into(),
                    path: path.into(),
                    status_code: status,
                })
                .await
                .unwrap();
        }

        let usage = store.recent_usage("key_a", 10).await.unwrap();
        assert_eq!(usage.len(), 2);
        assert_eq!(usage[0].path, "/posts/2");
        assert!(usage[0].is_upstream_failure());
        assert_eq!(usage[1].status_code, 200);

        assert_eq!(store.recent_usage("key_a", 1).await.unwrap().len(), 1);
    }
}
