//! Signature request persistence: in-memory for development, PostgreSQL for deployments.

use crate::error::EsignError;
use crate::ledger::{InMemoryEventStore, MarkOutcome, ProcessedEventStore};
use crate::types::SignatureRequest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage backend selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process memory only; state is lost on restart.
    #[default]
    Memory,
    /// Requests and processed events live in PostgreSQL.
    Postgres {
        database_url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self::Memory
    }

    pub fn postgres(database_url: impl Into<String>, max_connections: u32) -> Self {
        Self::Postgres {
            database_url: database_url.into(),
            max_connections,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Postgres { .. } => "postgres",
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

/// Persistence for signature requests and their signatories.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Stores a new request. Fails if the id already exists.
    async fn insert(&self, request: &SignatureRequest) -> Result<(), EsignError>;

    async fn get(&self, request_id: Uuid) -> Result<Option<SignatureRequest>, EsignError>;

    /// Overwrites an existing request.
    async fn save(&self, request: &SignatureRequest) -> Result<(), EsignError>;

    async fn find_by_provider_request(
        &self,
        provider_request_id: &str,
    ) -> Result<Option<SignatureRequest>, EsignError>;

    async fn list_by_contract(&self, contract_id: &str)
        -> Result<Vec<SignatureRequest>, EsignError>;
}

/// Both stores the orchestrator needs, built from one [`StorageConfig`].
#[derive(Clone)]
pub struct StorageBackends {
    pub requests: Arc<dyn RequestStore>,
    pub events: Arc<dyn ProcessedEventStore>,
    pub label: &'static str,
}

pub async fn bootstrap_storage(config: &StorageConfig) -> Result<StorageBackends, EsignError> {
    match config {
        StorageConfig::Memory => Ok(StorageBackends {
            requests: Arc::new(InMemoryRequestStore::new()),
            events: Arc::new(InMemoryEventStore::new()),
            label: "memory",
        }),
        StorageConfig::Postgres {
            database_url,
            max_connections,
        } => {
            let store = PostgresStore::connect(database_url, *max_connections).await?;
            store.ensure_schema().await?;
            Ok(StorageBackends {
                requests: Arc::new(store.clone()),
                events: Arc::new(store),
                label: "postgres",
            })
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryRequestStore {
    requests: Arc<RwLock<HashMap<Uuid, SignatureRequest>>>,
}

impl InMemoryRequestStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RequestStore for InMemoryRequestStore {
    async fn insert(&self, request: &SignatureRequest) -> Result<(), EsignError> {
        let mut requests = self.requests.write().await;
        if requests.contains_key(&request.id) {
            return Err(EsignError::Storage(format!(
                "signature request '{}' already exists",
                request.id
            )));
        }
        requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<SignatureRequest>, EsignError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&request_id).cloned())
    }

    async fn save(&self, request: &SignatureRequest) -> Result<(), EsignError> {
        let mut requests = self.requests.write().await;
        match requests.get_mut(&request.id) {
            Some(existing) => {
                *existing = request.clone();
                Ok(())
            }
            None => Err(EsignError::not_found_request(request.id)),
        }
    }

    async fn find_by_provider_request(
        &self,
        provider_request_id: &str,
    ) -> Result<Option<SignatureRequest>, EsignError> {
        let requests = self.requests.read().await;
        Ok(requests
            .values()
            .find(|r| r.provider_request_id.as_deref() == Some(provider_request_id))
            .cloned())
    }

    async fn list_by_contract(
        &self,
        contract_id: &str,
    ) -> Result<Vec<SignatureRequest>, EsignError> {
        let requests = self.requests.read().await;
        let mut matching: Vec<SignatureRequest> = requests
            .values()
            .filter(|r| r.contract_id == contract_id)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }
}

/// PostgreSQL store for requests (JSONB payload) and processed events.
#[derive(Debug, Clone)]
struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    async fn connect(database_url: &str, max_connections: u32) -> Result<Self, EsignError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await
            .map_err(|e| EsignError::Storage(format!("postgres connect failed: {e}")))?;

        Ok(Self { pool })
    }

    async fn ensure_schema(&self) -> Result<(), EsignError> {
        // Signatories are embedded in the request payload; they never change outside it.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS esign_signature_requests (
                request_id UUID PRIMARY KEY,
                provider_request_id TEXT NULL UNIQUE,
                contract_id TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL,
                payload JSONB NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EsignError::Storage(format!("postgres schema create failed: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_esign_requests_contract_id ON esign_signature_requests (contract_id)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EsignError::Storage(format!("postgres index create failed: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS esign_processed_events (
                provider_event_id TEXT PRIMARY KEY,
                received_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| EsignError::Storage(format!("postgres schema create failed: {e}")))?;

        Ok(())
    }

    async fn fetch_one_where(
        &self,
        sql: &str,
        bind: &str,
    ) -> Result<Option<SignatureRequest>, EsignError> {
        let row = sqlx::query(sql)
            .bind(bind)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EsignError::Storage(format!("postgres load failed: {e}")))?;

        row.map(|row| decode_payload(&row)).transpose()
    }
}

fn encode_payload(request: &SignatureRequest) -> Result<serde_json::Value, EsignError> {
    serde_json::to_value(request).map_err(|e| EsignError::Serialization(e.to_string()))
}

fn decode_payload(row: &sqlx::postgres::PgRow) -> Result<SignatureRequest, EsignError> {
    let payload: serde_json::Value = row
        .try_get("payload")
        .map_err(|e| EsignError::Storage(format!("postgres decode payload failed: {e}")))?;
    serde_json::from_value(payload).map_err(|e| EsignError::Serialization(e.to_string()))
}

#[async_trait]
impl RequestStore for PostgresStore {
    async fn insert(&self, request: &SignatureRequest) -> Result<(), EsignError> {
        let payload = encode_payload(request)?;
        sqlx::query(
            r#"
            INSERT INTO esign_signature_requests (
                request_id,
                provider_request_id,
                contract_id,
                status,
                created_at,
                updated_at,
                payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.id)
        .bind(&request.provider_request_id)
        .bind(&request.contract_id)
        .bind(request.status.name())
        .bind(request.created_at)
        .bind(request.updated_at)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| EsignError::Storage(format!("postgres insert failed: {e}")))?;

        Ok(())
    }

    async fn get(&self, request_id: Uuid) -> Result<Option<SignatureRequest>, EsignError> {
        let row = sqlx::query("SELECT payload FROM esign_signature_requests WHERE request_id = $1")
            .bind(request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EsignError::Storage(format!("postgres load failed: {e}")))?;

        row.map(|row| decode_payload(&row)).transpose()
    }

    async fn save(&self, request: &SignatureRequest) -> Result<(), EsignError> {
        let payload = encode_payload(request)?;
        let result = sqlx::query(
            r#"
            UPDATE esign_signature_requests
            SET provider_request_id = $2,
                status = $3,
                updated_at = $4,
                payload = $5
            WHERE request_id = $1
            "#,
        )
        .bind(request.id)
        .bind(&request.provider_request_id)
        .bind(request.status.name())
        .bind(request.updated_at)
        .bind(&payload)
        .execute(&self.pool)
        .await
        .map_err(|e| EsignError::Storage(format!("postgres update failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(EsignError::not_found_request(request.id));
        }
        Ok(())
    }

    async fn find_by_provider_request(
        &self,
        provider_request_id: &str,
    ) -> Result<Option<SignatureRequest>, EsignError> {
        self.fetch_one_where(
            "SELECT payload FROM esign_signature_requests WHERE provider_request_id = $1",
            provider_request_id,
        )
        .await
    }

    async fn list_by_contract(
        &self,
        contract_id: &str,
    ) -> Result<Vec<SignatureRequest>, EsignError> {
        let rows = sqlx::query(
            "SELECT payload FROM esign_signature_requests WHERE contract_id = $1 ORDER BY created_at ASC",
        )
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| EsignError::Storage(format!("postgres load failed: {e}")))?;

        rows.iter().map(decode_payload).collect()
    }
}

#[async_trait]
impl ProcessedEventStore for PostgresStore {
    async fn try_mark_processed(
        &self,
        provider_event_id: &str,
        received_at: DateTime<Utc>,
    ) -> Result<MarkOutcome, EsignError> {
        let result = sqlx::query(
            r#"
            INSERT INTO esign_processed_events (provider_event_id, received_at)
            VALUES ($1, $2)
            ON CONFLICT (provider_event_id) DO NOTHING
            "#,
        )
        .bind(provider_event_id)
        .bind(received_at)
        .execute(&self.pool)
        .await
        .map_err(|e| EsignError::Storage(format!("postgres insert failed: {e}")))?;

        Ok(if result.rows_affected() == 1 {
            MarkOutcome::Inserted
        } else {
            MarkOutcome::AlreadyProcessed
        })
    }

    async fn contains(&self, provider_event_id: &str) -> Result<bool, EsignError> {
        let row = sqlx::query("SELECT 1 FROM esign_processed_events WHERE provider_event_id = $1")
            .bind(provider_event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EsignError::Storage(format!("postgres load failed: {e}")))?;
        Ok(row.is_some())
    }
}
