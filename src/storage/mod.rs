//! C2 — Persistence Gateway.
//!
//! Narrowed from the reference architecture's generic `orm::adapter::StorageAdapter`
//! (which handles arbitrary JSON-shape collections with dynamic schema) down to
//! exactly three fixed collections: emails, contacts, calls. A call center has a
//! closed, known schema; the generic collection abstraction would buy us nothing
//! here and the reference architecture's own `naming` helpers have no call site left once the
//! schema is fixed, so they are dropped rather than carried along unused.

pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::{CallRecord, ContactRecord, EmailRecord};

/// Storage backend capability flags, mirroring the reference architecture's
/// `AdapterCapabilities` pattern at a granularity this crate actually needs.
#[derive(Debug, Clone, Copy)]
pub struct StoreCapabilities {
    /// True if cosine similarity is evaluated inside the database (e.g. via
    /// an extension); false if the caller must score rows in-process.
    pub native_vector_search: bool,
}

/// Persistence trait implemented once per backend (SQLite default, Postgres
/// optional). All methods are backend-agnostic; ranking/scoring for vector
/// search happens in [`crate::retrieval`], not here, so both backends can
/// share identical retrieval semantics regardless of `native_vector_search`.
#[async_trait]
pub trait ReceptionStore: Send + Sync {
    fn capabilities(&self) -> StoreCapabilities;

    async fn insert_email(&self, record: &EmailRecord) -> Result<(), StorageError>;
    async fn all_emails(&self) -> Result<Vec<EmailRecord>, StorageError>;
    async fn find_email(&self, id: Uuid) -> Result<Option<EmailRecord>, StorageError>;
    async fn delete_email(&self, id: Uuid) -> Result<(), StorageError>;

    async fn insert_contact(&self, record: &ContactRecord) -> Result<(), StorageError>;
    async fn all_contacts(&self) -> Result<Vec<ContactRecord>, StorageError>;
    async fn find_contact(&self, id: Uuid) -> Result<Option<ContactRecord>, StorageError>;
    async fn delete_contact(&self, id: Uuid) -> Result<(), StorageError>;
    /// Case-insensitive substring match against `name`, per the pinned
    /// decision — this is the fallback path when embeddings alone
    /// don't surface an exact name the caller spoke.
    async fn find_contacts_by_name(&self, needle: &str) -> Result<Vec<ContactRecord>, StorageError>;

    async fn upsert_call(&self, record: &CallRecord) -> Result<(), StorageError>;
    async fn find_call(&self, id: Uuid) -> Result<Option<CallRecord>, StorageError>;
    /// Looked up by the `POST /call-status` webhook, which only
    /// ever knows the gateway's own call identifier, never our internal one.
    async fn find_call_by_gateway_sid(
        &self,
        sid: &str,
    ) -> Result<Option<CallRecord>, StorageError>;
}
