//! PostgreSQL implementation of the client registration store.
//!
//! This is the shared backend for multi-replica deployments: every replica
//! reads and writes the same table, so a client registered on one replica is
//! recognized on all of them.

use crate::errors::StorageError;
use crate::storage::traits::{
    ClientRegistrationStore, DynamicClientRecord, Result, new_client_record,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgRow};

/// PostgreSQL-backed client registration store
pub struct PostgresClientRegistrationStore {
    pool: PgPool,
}

impl PostgresClientRegistrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table if it does not exist yet.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS dynamic_clients (
                client_id TEXT PRIMARY KEY,
                client_metadata TEXT NOT NULL,
                registration_access_token TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Unavailable(format!("Migration failed: {}", e)))?;
        Ok(())
    }

    fn row_to_record(row: &PgRow) -> Result<DynamicClientRecord> {
        let client_id: String = row
            .try_get("client_id")
            .map_err(|e| StorageError::InvalidData(format!("Failed to get client_id: {}", e)))?;
        let metadata_json: String = row.try_get("client_metadata").map_err(|e| {
            StorageError::InvalidData(format!("Failed to get client_metadata: {}", e))
        })?;
        let client_metadata: serde_json::Value = serde_json::from_str(&metadata_json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let registration_access_token: String =
            row.try_get("registration_access_token").map_err(|e| {
                StorageError::InvalidData(format!("Failed to get registration_access_token: {}", e))
            })?;
        let created_at: DateTime<Utc> = row
            .try_get("created_at")
            .map_err(|e| StorageError::InvalidData(format!("Failed to get created_at: {}", e)))?;

        Ok(DynamicClientRecord {
            client_id,
            client_metadata,
            registration_access_token,
            created_at,
        })
    }
}

#[async_trait]
impl ClientRegistrationStore for PostgresClientRegistrationStore {
    async fn create_client(&self, metadata: serde_json::Value) -> Result<DynamicClientRecord> {
        let record = new_client_record(metadata);
        let metadata_json = serde_json::to_string(&record.client_metadata)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO dynamic_clients
                (client_id, client_metadata, registration_access_token, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&record.client_id)
        .bind(&metadata_json)
        .bind(&record.registration_access_token)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Unavailable(format!("Insert failed: {}", e)))?;

        Ok(record)
    }

    async fn get_client(&self, client_id: &str) -> Result<Option<DynamicClientRecord>> {
        let row = sqlx::query("SELECT * FROM dynamic_clients WHERE client_id = $1")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Unavailable(format!("Query failed: {}", e)))?;

        row.as_ref().map(Self::row_to_record).transpose()
    }
}
