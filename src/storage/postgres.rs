//! Optional [`ReceptionStore`] backend: PostgreSQL via `deadpool-postgres`,
//! selected instead of [`super::sqlite::SqliteStore`] when `DATABASE_URL` is
//! configured (see `config::Config::database_url`).
//!
//! Narrowed from the reference architecture's `orm::postgres::PostgresAdapter`
//! (a dynamic-schema adapter that introspects `information_schema` to coerce
//! arbitrary JSON payloads into typed columns) down to the three fixed tables
//! this crate actually has. No column-type introspection is needed because
//! the schema never varies at runtime, so the parameter binding the teacher's
//! adapter does through `value_to_pg_typed` collapses to plain typed
//! `tokio_postgres` parameters.
//!
//! Connections are natively async (no `spawn_blocking` wrapper, unlike the
//! SQLite backend): `deadpool_postgres::Pool` hands out a pooled client per
//! call and `tokio_postgres` drives the wire protocol on the same task.
//! Embeddings and transcripts are stored as JSON text, matching the SQLite
//! backend's column shapes, so [`crate::retrieval`]'s in-process cosine
//! scoring behaves identically regardless of which backend is live.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Config as PgConfig, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use uuid::Uuid;

use super::{ReceptionStore, StoreCapabilities};
use crate::error::StorageError;
use crate::model::{CallOutcome, CallRecord, ContactRecord, EmailRecord, TranscriptEntry};

pub struct PostgresStore {
    pool: Pool,
}

impl PostgresStore {
    /// Connect and create the three tables if they don't already exist.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let mut pg_config = PgConfig::new();
        pg_config.url = Some(database_url.to_string());
        pg_config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let pool = pg_config
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        let store = PostgresStore { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn client(&self) -> Result<deadpool_postgres::Client, StorageError> {
        self.pool
            .get()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let client = self.client().await?;
        client
            .batch_execute(
                r#"
                CREATE TABLE IF NOT EXISTS emails (
                    id TEXT PRIMARY KEY,
                    subject TEXT NOT NULL,
                    body TEXT NOT NULL,
                    sender TEXT NOT NULL,
                    received_at TIMESTAMPTZ NOT NULL,
                    embedding TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS contacts (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    phone TEXT,
                    email TEXT,
                    notes TEXT NOT NULL,
                    embedding TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS calls (
                    id TEXT PRIMARY KEY,
                    gateway_call_sid TEXT,
                    caller_number TEXT,
                    started_at TIMESTAMPTZ NOT NULL,
                    ended_at TIMESTAMPTZ,
                    outcome TEXT NOT NULL,
                    transcript TEXT NOT NULL,
                    identified_name TEXT,
                    inferred_purpose TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_calls_gateway_sid ON calls(gateway_call_sid);
                CREATE INDEX IF NOT EXISTS idx_calls_started_at ON calls(started_at);
                CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(lower(name));
                "#,
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        Ok(())
    }
}

fn serialize_embedding(embedding: &[f32]) -> String {
    serde_json::to_string(embedding).unwrap_or_default()
}

fn deserialize_embedding(raw: &str) -> Vec<f32> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn row_to_email(row: &tokio_postgres::Row) -> Result<EmailRecord, StorageError> {
    let id: String = row.get(0);
    let embedding: String = row.get(5);
    Ok(EmailRecord {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::Operation(e.to_string()))?,
        subject: row.get(1),
        body: row.get(2),
        sender: row.get(3),
        received_at: row.get::<_, DateTime<Utc>>(4),
        embedding: deserialize_embedding(&embedding),
    })
}

fn row_to_contact(row: &tokio_postgres::Row) -> Result<ContactRecord, StorageError> {
    let id: String = row.get(0);
    let embedding: String = row.get(5);
    Ok(ContactRecord {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::Operation(e.to_string()))?,
        name: row.get(1),
        phone: row.get(2),
        email: row.get(3),
        notes: row.get(4),
        embedding: deserialize_embedding(&embedding),
    })
}

fn row_to_call(row: &tokio_postgres::Row) -> Result<CallRecord, StorageError> {
    let id: String = row.get(0);
    let outcome: String = row.get(5);
    let transcript: String = row.get(6);
    Ok(CallRecord {
        id: Uuid::parse_str(&id).map_err(|e| StorageError::Operation(e.to_string()))?,
        gateway_call_sid: row.get(1),
        caller_number: row.get(2),
        started_at: row.get::<_, DateTime<Utc>>(3),
        ended_at: row.get::<_, Option<DateTime<Utc>>>(4),
        outcome: serde_json::from_str(&outcome).unwrap_or(CallOutcome::InProgress),
        transcript: serde_json::from_str::<Vec<TranscriptEntry>>(&transcript)
            .unwrap_or_default(),
        identified_name: row.get(7),
        inferred_purpose: row.get(8),
    })
}

#[async_trait]
impl ReceptionStore for PostgresStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            native_vector_search: false,
        }
    }

    async fn insert_email(&self, record: &EmailRecord) -> Result<(), StorageError> {
        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO emails (id, subject, body, sender, received_at, embedding)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO UPDATE SET
                   subject = EXCLUDED.subject,
                   body = EXCLUDED.body,
                   sender = EXCLUDED.sender,
                   received_at = EXCLUDED.received_at,
                   embedding = EXCLUDED.embedding",
                &[
                    &record.id.to_string(),
                    &record.subject,
                    &record.body,
                    &record.sender,
                    &record.received_at,
                    &serialize_embedding(&record.embedding),
                ],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn all_emails(&self) -> Result<Vec<EmailRecord>, StorageError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, subject, body, sender, received_at, embedding FROM emails",
                &[],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        rows.iter().map(row_to_email).collect()
    }

    async fn find_email(&self, id: Uuid) -> Result<Option<EmailRecord>, StorageError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, subject, body, sender, received_at, embedding FROM emails WHERE id = $1",
                &[&id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        row.as_ref().map(row_to_email).transpose()
    }

    async fn delete_email(&self, id: Uuid) -> Result<(), StorageError> {
        let client = self.client().await?;
        client
            .execute("DELETE FROM emails WHERE id = $1", &[&id.to_string()])
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn insert_contact(&self, record: &ContactRecord) -> Result<(), StorageError> {
        let client = self.client().await?;
        client
            .execute(
                "INSERT INTO contacts (id, name, phone, email, notes, embedding)
                 VALUES ($1, $2, $3, $4, $5, $6)
                 ON CONFLICT (id) DO UPDATE SET
                   name = EXCLUDED.name,
                   phone = EXCLUDED.phone,
                   email = EXCLUDED.email,
                   notes = EXCLUDED.notes,
                   embedding = EXCLUDED.embedding",
                &[
                    &record.id.to_string(),
                    &record.name,
                    &record.phone,
                    &record.email,
                    &record.notes,
                    &serialize_embedding(&record.embedding),
                ],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn all_contacts(&self) -> Result<Vec<ContactRecord>, StorageError> {
        let client = self.client().await?;
        let rows = client
            .query(
                "SELECT id, name, phone, email, notes, embedding FROM contacts",
                &[],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        rows.iter().map(row_to_contact).collect()
    }

    async fn find_contact(&self, id: Uuid) -> Result<Option<ContactRecord>, StorageError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, name, phone, email, notes, embedding FROM contacts WHERE id = $1",
                &[&id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        row.as_ref().map(row_to_contact).transpose()
    }

    async fn delete_contact(&self, id: Uuid) -> Result<(), StorageError> {
        let client = self.client().await?;
        client
            .execute("DELETE FROM contacts WHERE id = $1", &[&id.to_string()])
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn find_contacts_by_name(&self, needle: &str) -> Result<Vec<ContactRecord>, StorageError> {
        let client = self.client().await?;
        let pattern = format!("%{}%", needle.to_lowercase());
        let rows = client
            .query(
                "SELECT id, name, phone, email, notes, embedding FROM contacts
                 WHERE lower(name) LIKE $1",
                &[&pattern],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        rows.iter().map(row_to_contact).collect()
    }

    async fn upsert_call(&self, record: &CallRecord) -> Result<(), StorageError> {
        let client = self.client().await?;
        let transcript = serde_json::to_string(&record.transcript).unwrap_or_default();
        let outcome = serde_json::to_string(&record.outcome).unwrap_or_default();
        client
            .execute(
                "INSERT INTO calls
                 (id, gateway_call_sid, caller_number, started_at, ended_at, outcome, transcript, identified_name, inferred_purpose)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                 ON CONFLICT (id) DO UPDATE SET
                   gateway_call_sid = EXCLUDED.gateway_call_sid,
                   caller_number = EXCLUDED.caller_number,
                   started_at = EXCLUDED.started_at,
                   ended_at = EXCLUDED.ended_at,
                   outcome = EXCLUDED.outcome,
                   transcript = EXCLUDED.transcript,
                   identified_name = EXCLUDED.identified_name,
                   inferred_purpose = EXCLUDED.inferred_purpose",
                &[
                    &record.id.to_string(),
                    &record.gateway_call_sid,
                    &record.caller_number,
                    &record.started_at,
                    &record.ended_at,
                    &outcome,
                    &transcript,
                    &record.identified_name,
                    &record.inferred_purpose,
                ],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        Ok(())
    }

    async fn find_call(&self, id: Uuid) -> Result<Option<CallRecord>, StorageError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, gateway_call_sid, caller_number, started_at, ended_at, outcome, transcript, identified_name, inferred_purpose
                 FROM calls WHERE id = $1",
                &[&id.to_string()],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        row.as_ref().map(row_to_call).transpose()
    }

    async fn find_call_by_gateway_sid(
        &self,
        sid: &str,
    ) -> Result<Option<CallRecord>, StorageError> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, gateway_call_sid, caller_number, started_at, ended_at, outcome, transcript, identified_name, inferred_purpose
                 FROM calls WHERE gateway_call_sid = $1",
                &[&sid.to_string()],
            )
            .await
            .map_err(|e| StorageError::Operation(e.to_string()))?;
        row.as_ref().map(row_to_call).transpose()
    }
}
