//! Default [`ReceptionStore`] backend: a single SQLite file via `rusqlite`.
//!
//! `rusqlite::Connection` is synchronous, so every operation is dispatched
//! through `tokio::task::spawn_blocking` and the connection itself lives
//! behind a `parking_lot::Mutex` — short, uncontended critical sections,
//! the same shape the reference architecture uses for its in-process caches.
//! Embeddings and transcripts are stored as JSON text columns; cosine
//! similarity is always computed in-process by [`crate::retrieval`] rather
//! than inside SQLite, so this backend and a future vector-native one share
//! identical ranking behavior.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{ReceptionStore, StoreCapabilities};
use crate::error::StorageError;
use crate::model::{CallOutcome, CallRecord, ContactRecord, EmailRecord, TranscriptEntry};

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = if path == Path::new(":memory:") {
            Connection::open_in_memory()
        } else {
            Connection::open(path)
        }
        .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                subject TEXT NOT NULL,
                body TEXT NOT NULL,
                sender TEXT NOT NULL,
                received_at TEXT NOT NULL,
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
                started_at TEXT NOT NULL,
                ended_at TEXT,
                outcome TEXT NOT NULL,
                transcript TEXT NOT NULL,
                identified_name TEXT,
                inferred_purpose TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_calls_gateway_sid ON calls(gateway_call_sid);
            CREATE INDEX IF NOT EXISTS idx_calls_started_at ON calls(started_at);
            CREATE INDEX IF NOT EXISTS idx_contacts_name ON contacts(name);
            "#,
        )
        .map_err(|e| StorageError::Operation(e.to_string()))?;

        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await
        .map_err(|e| StorageError::Operation(format!("blocking task join error: {e}")))?
        .map_err(|e| StorageError::Operation(e.to_string()))
    }
}

fn serialize_embedding(embedding: &[f32]) -> String {
    serde_json::to_string(embedding).unwrap_or_default()
}

fn deserialize_embedding(raw: &str) -> Vec<f32> {
    serde_json::from_str(raw).unwrap_or_default()
}

#[async_trait]
impl ReceptionStore for SqliteStore {
    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities {
            native_vector_search: false,
        }
    }

    async fn insert_email(&self, record: &EmailRecord) -> Result<(), StorageError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO emails (id, subject, body, sender, received_at, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.subject,
                    record.body,
                    record.sender,
                    record.received_at.to_rfc3339(),
                    serialize_embedding(&record.embedding),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn all_emails(&self) -> Result<Vec<EmailRecord>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, subject, body, sender, received_at, embedding FROM emails",
            )?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let received_at: String = row.get(4)?;
                let embedding: String = row.get(5)?;
                Ok(EmailRecord {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    subject: row.get(1)?,
                    body: row.get(2)?,
                    sender: row.get(3)?,
                    received_at: chrono::DateTime::parse_from_rfc3339(&received_at)
                        .map(|d| d.with_timezone(&chrono::Utc))
                        .unwrap_or_else(|_| chrono::Utc::now()),
                    embedding: deserialize_embedding(&embedding),
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn find_email(&self, id: Uuid) -> Result<Option<EmailRecord>, StorageError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, subject, body, sender, received_at, embedding FROM emails WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let received_at: String = row.get(4)?;
                    let embedding: String = row.get(5)?;
                    Ok(EmailRecord {
                        id,
                        subject: row.get(1)?,
                        body: row.get(2)?,
                        sender: row.get(3)?,
                        received_at: chrono::DateTime::parse_from_rfc3339(&received_at)
                            .map(|d| d.with_timezone(&chrono::Utc))
                            .unwrap_or_else(|_| chrono::Utc::now()),
                        embedding: deserialize_embedding(&embedding),
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn delete_email(&self, id: Uuid) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM emails WHERE id = ?1", params![id.to_string()])?;
            Ok(())
        })
        .await
    }

    async fn insert_contact(&self, record: &ContactRecord) -> Result<(), StorageError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO contacts (id, name, phone, email, notes, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.to_string(),
                    record.name,
                    record.phone,
                    record.email,
                    record.notes,
                    serialize_embedding(&record.embedding),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn all_contacts(&self) -> Result<Vec<ContactRecord>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, phone, email, notes, embedding FROM contacts")?;
            let rows = stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let embedding: String = row.get(5)?;
                Ok(ContactRecord {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    name: row.get(1)?,
                    phone: row.get(2)?,
                    email: row.get(3)?,
                    notes: row.get(4)?,
                    embedding: deserialize_embedding(&embedding),
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn find_contact(&self, id: Uuid) -> Result<Option<ContactRecord>, StorageError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, name, phone, email, notes, embedding FROM contacts WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let embedding: String = row.get(5)?;
                    Ok(ContactRecord {
                        id,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        email: row.get(3)?,
                        notes: row.get(4)?,
                        embedding: deserialize_embedding(&embedding),
                    })
                },
            )
            .optional()
        })
        .await
    }

    async fn delete_contact(&self, id: Uuid) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM contacts WHERE id = ?1", params![id.to_string()])?;
            Ok(())
        })
        .await
    }

    async fn find_contacts_by_name(&self, needle: &str) -> Result<Vec<ContactRecord>, StorageError> {
        let pattern = format!("%{}%", needle.to_lowercase());
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, phone, email, notes, embedding FROM contacts
                 WHERE lower(name) LIKE ?1",
            )?;
            let rows = stmt.query_map(params![pattern], |row| {
                let id: String = row.get(0)?;
                let embedding: String = row.get(5)?;
                Ok(ContactRecord {
                    id: Uuid::parse_str(&id).unwrap_or_default(),
                    name: row.get(1)?,
                    phone: row.get(2)?,
                    email: row.get(3)?,
                    notes: row.get(4)?,
                    embedding: deserialize_embedding(&embedding),
                })
            })?;
            rows.collect()
        })
        .await
    }

    async fn upsert_call(&self, record: &CallRecord) -> Result<(), StorageError> {
        let record = record.clone();
        self.with_conn(move |conn| {
            let transcript = serde_json::to_string(&record.transcript).unwrap_or_default();
            let outcome = serde_json::to_string(&record.outcome).unwrap_or_default();
            conn.execute(
                "INSERT OR REPLACE INTO calls
                 (id, gateway_call_sid, caller_number, started_at, ended_at, outcome, transcript, identified_name, inferred_purpose)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id.to_string(),
                    record.gateway_call_sid,
                    record.caller_number,
                    record.started_at.to_rfc3339(),
                    record.ended_at.map(|t| t.to_rfc3339()),
                    outcome,
                    transcript,
                    record.identified_name,
                    record.inferred_purpose,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_call(&self, id: Uuid) -> Result<Option<CallRecord>, StorageError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, gateway_call_sid, caller_number, started_at, ended_at, outcome, transcript, identified_name, inferred_purpose
                 FROM calls WHERE id = ?1",
                params![id.to_string()],
                row_to_call_record,
            )
            .optional()
        })
        .await
    }

    async fn find_call_by_gateway_sid(
        &self,
        sid: &str,
    ) -> Result<Option<CallRecord>, StorageError> {
        let sid = sid.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, gateway_call_sid, caller_number, started_at, ended_at, outcome, transcript, identified_name, inferred_purpose
                 FROM calls WHERE gateway_call_sid = ?1",
                params![sid],
                row_to_call_record,
            )
            .optional()
        })
        .await
    }
}

fn row_to_call_record(row: &rusqlite::Row) -> rusqlite::Result<CallRecord> {
    let id: String = row.get(0)?;
    let started_at: String = row.get(3)?;
    let ended_at: Option<String> = row.get(4)?;
    let outcome: String = row.get(5)?;
    let transcript: String = row.get(6)?;
    Ok(CallRecord {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        gateway_call_sid: row.get(1)?,
        caller_number: row.get(2)?,
        started_at: chrono::DateTime::parse_from_rfc3339(&started_at)
            .map(|d| d.with_timezone(&chrono::Utc))
            .unwrap_or_else(|_| chrono::Utc::now()),
        ended_at: ended_at.and_then(|t| {
            chrono::DateTime::parse_from_rfc3339(&t)
                .ok()
                .map(|d| d.with_timezone(&chrono::Utc))
        }),
        outcome: serde_json::from_str(&outcome).unwrap_or(CallOutcome::InProgress),
        transcript: serde_json::from_str::<Vec<TranscriptEntry>>(&transcript).unwrap_or_default(),
        identified_name: row.get(7)?,
        inferred_purpose: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reception.sqlite3");

        let id = Uuid::new_v4();
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .insert_contact(&ContactRecord {
                    id,
                    name: "File Backed Contact".to_string(),
                    phone: None,
                    email: None,
                    notes: String::new(),
                    embedding: vec![],
                })
                .await
                .unwrap();
        }

        let reopened = SqliteStore::open(&path).unwrap();
        let fetched = reopened.find_contact(id).await.unwrap();
        assert_eq!(fetched.unwrap().name, "File Backed Contact");
    }

    fn new_store() -> SqliteStore {
        SqliteStore::open(&PathBuf::from(":memory:")).unwrap()
    }

    #[tokio::test]
    async fn test_contact_roundtrip() {
        let store = new_store();
        let id = Uuid::new_v4();
        let contact = ContactRecord {
            id,
            name: "Ada Lovelace".to_string(),
            phone: Some("555-0100".to_string()),
            email: None,
            notes: "early collaborator".to_string(),
            embedding: vec![0.1, 0.2, 0.3],
        };
        store.insert_contact(&contact).await.unwrap();
        let fetched = store.find_contact(id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Ada Lovelace");
        assert_eq!(fetched.embedding, vec![0.1, 0.2, 0.3]);
    }

    #[tokio::test]
    async fn test_find_contacts_by_name_is_case_insensitive_substring() {
        let store = new_store();
        store
            .insert_contact(&ContactRecord {
                id: Uuid::new_v4(),
                name: "Grace Hopper".to_string(),
                phone: None,
                email: None,
                notes: String::new(),
                embedding: vec![],
            })
            .await
            .unwrap();

        let hits = store.find_contacts_by_name("grace").await.unwrap();
        assert_eq!(hits.len(), 1);
        let hits = store.find_contacts_by_name("HOPPER").await.unwrap();
        assert_eq!(hits.len(), 1);
        let hits = store.find_contacts_by_name("nobody").await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_delete_contact_removes_record() {
        let store = new_store();
        let id = Uuid::new_v4();
        store
            .insert_contact(&ContactRecord {
                id,
                name: "Temp Contact".to_string(),
                phone: None,
                email: None,
                notes: String::new(),
                embedding: vec![],
            })
            .await
            .unwrap();
        assert!(store.find_contact(id).await.unwrap().is_some());
        store.delete_contact(id).await.unwrap();
        assert!(store.find_contact(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_call_upsert_is_idempotent_on_id() {
        let store = new_store();
        let id = Uuid::new_v4();
        let mut call = CallRecord::new(
            id,
            Some("CA_test_sid".to_string()),
            Some("+15555550100".to_string()),
            chrono::Utc::now(),
        );
        store.upsert_call(&call).await.unwrap();
        call.outcome = CallOutcome::Connected;
        call.push_transcript(
            crate::model::SpeakerType::Caller,
            "hello".to_string(),
            chrono::Utc::now(),
        );
        store.upsert_call(&call).await.unwrap();

        let fetched = store.find_call(id).await.unwrap().unwrap();
        assert_eq!(fetched.outcome, CallOutcome::Connected);
        assert_eq!(fetched.transcript.len(), 1);
    }

    #[tokio::test]
    async fn test_find_call_by_gateway_sid() {
        let store = new_store();
        let id = Uuid::new_v4();
        let call = CallRecord::new(
            id,
            Some("CA_abc123".to_string()),
            None,
            chrono::Utc::now(),
        );
        store.upsert_call(&call).await.unwrap();

        let fetched = store.find_call_by_gateway_sid("CA_abc123").await.unwrap().unwrap();
        assert_eq!(fetched.id, id);
        assert!(store
            .find_call_by_gateway_sid("does-not-exist")
            .await
            .unwrap()
            .is_none());
    }
}
