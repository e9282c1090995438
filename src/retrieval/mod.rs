//! C4 — Retrieval Engine.
//!
//! `similarity::cosine` is lifted directly from the reference architecture's
//! `orm::vector::similarity` module (loop-unrolled dot-product/norm
//! accumulation); everything above it — `search_contacts`, `search_emails`,
//! `build_context` — is new, modeled on that module's `VectorSearchResult`
//! shape but narrowed to this system's two fixed collections instead of a
//! generic `VectorSearchAdapter`.
//!
//! Adaptive retrieval: `search_contacts` is a name lookup (no
//! embedding involved at all — a caller states a name verbatim, there is no
//! vector query to build from it); `search_emails` is the vector-similarity
//! path. `build_context` only runs the axis whose input is non-empty, and
//! runs both concurrently when both are present.

pub mod similarity;

use std::sync::Arc;

use crate::embedding::EmbeddingClient;
use crate::model::{ContactRecord, Context, EmailRecord, SearchResult, TranscriptEntry};
use crate::storage::ReceptionStore;

/// Fan out contact + email search concurrently (only for the axes that have
/// non-empty input) and assemble a turn-local [`Context`]. Either search
/// degrading to empty (storage error, embedding error) never fails the
/// whole turn — the reasoning driver simply sees fewer grounding hits, per
/// the degrade-to-empty edge case on a retrieval failure.
pub async fn build_context(
    store: &Arc<dyn ReceptionStore>,
    embedder: &Arc<dyn EmbeddingClient>,
    identified_name: Option<&str>,
    inferred_purpose: Option<&str>,
    k_contacts: usize,
    k_emails: usize,
    caller_number: Option<String>,
    transcript_tail: Vec<TranscriptEntry>,
) -> Context {
    let contacts_fut = async {
        match identified_name {
            Some(name) if !name.trim().is_empty() => search_contacts(store, name, k_contacts).await,
            _ => Vec::new(),
        }
    };
    let emails_fut = async {
        match inferred_purpose {
            Some(purpose) if !purpose.trim().is_empty() => {
                search_emails(store, embedder, purpose, k_emails).await
            }
            _ => Vec::new(),
        }
    };

    let (matched_contacts, matched_emails) = tokio::join!(contacts_fut, emails_fut);

    Context {
        identified_name: identified_name.map(str::to_string),
        inferred_purpose: inferred_purpose.map(str::to_string),
        matched_contacts,
        matched_emails,
        transcript_tail,
        caller_number,
    }
}

/// Name-based lookup over contacts. Embeds nothing — this axis
/// never touches the embedding provider. Degrades to empty on storage
/// failure rather than propagating an error to the caller.
pub async fn search_contacts(
    store: &Arc<dyn ReceptionStore>,
    name: &str,
    k: usize,
) -> Vec<SearchResult<ContactRecord>> {
    let hits = store.find_contacts_by_name(name).await.unwrap_or_default();
    let mut scored: Vec<SearchResult<ContactRecord>> = hits
        .into_iter()
        .map(|record| SearchResult { record, score: 1.0 })
        .collect();
    dedup_and_cap(&mut scored, k, |c| c.id);
    scored
}

/// Vector-similarity search over emails. Degrades to empty on embedding or
/// storage failure rather than propagating an error to the caller.
pub async fn search_emails(
    store: &Arc<dyn ReceptionStore>,
    embedder: &Arc<dyn EmbeddingClient>,
    purpose_text: &str,
    k: usize,
) -> Vec<SearchResult<EmailRecord>> {
    let query_vec = match embedder.embed_one(purpose_text).await {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    let all = match store.all_emails().await {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    top_k(all, &query_vec, k, |e| &e.embedding, |e| e.id.to_string())
}

/// Score-descending top-k, ties broken by lexicographic source identifier,
/// with no duplicate records by identifier.
fn top_k<T, F, I>(
    items: Vec<T>,
    query_vec: &[f32],
    k: usize,
    embedding_of: F,
    id_of: I,
) -> Vec<SearchResult<T>>
where
    F: Fn(&T) -> &Vec<f32>,
    I: Fn(&T) -> String,
{
    let mut scored: Vec<SearchResult<T>> = items
        .into_iter()
        .map(|item| {
            // cosine is in [-1, 1]; rescale into [0, 1] so the stored score
            // honors `SearchResult::score`'s documented range regardless of
            // what sign the embedding provider's components happen to take.
            let score = (similarity::cosine(query_vec, embedding_of(&item)) + 1.0) / 2.0;
            SearchResult { record: item, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| id_of(&a.record).cmp(&id_of(&b.record)))
    });
    dedup_and_cap(&mut scored, k, id_of);
    scored
}

fn dedup_and_cap<T, I: Eq + std::hash::Hash>(
    scored: &mut Vec<SearchResult<T>>,
    k: usize,
    id_of: impl Fn(&T) -> I,
) {
    let mut seen = std::collections::HashSet::new();
    scored.retain(|hit| seen.insert(id_of(&hit.record)));
    scored.truncate(k);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::local::LocalHashEmbedder;
    use crate::storage::sqlite::SqliteStore;
    use std::path::PathBuf;
    use uuid::Uuid;

    fn store() -> Arc<dyn ReceptionStore> {
        Arc::new(SqliteStore::open(&PathBuf::from(":memory:")).unwrap())
    }

    fn embedder() -> Arc<dyn EmbeddingClient> {
        Arc::new(LocalHashEmbedder::new(32))
    }

    #[tokio::test]
    async fn test_search_contacts_does_not_touch_embedder() {
        let store = store();
        store
            .insert_contact(&ContactRecord {
                id: Uuid::new_v4(),
                name: "Sarah Chen".to_string(),
                phone: None,
                email: Some("sarah@acme.example".to_string()),
                notes: "Acme".to_string(),
                embedding: vec![],
            })
            .await
            .unwrap();

        let hits = search_contacts(&store, "Sarah Chen", 3).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.name, "Sarah Chen");
    }

    #[tokio::test]
    async fn test_build_context_skips_empty_axes() {
        let store = store();
        let embedder = embedder();
        let ctx = build_context(&store, &embedder, None, None, 3, 3, None, Vec::new()).await;
        assert!(ctx.matched_contacts.is_empty());
        assert!(ctx.matched_emails.is_empty());
    }

    #[tokio::test]
    async fn test_build_context_runs_both_axes_when_present() {
        let store = store();
        let embedder = embedder();
        store
            .insert_contact(&ContactRecord {
                id: Uuid::new_v4(),
                name: "Jordan Price".to_string(),
                phone: None,
                email: None,
                notes: String::new(),
                embedding: vec![],
            })
            .await
            .unwrap();
        let email_vec = embedder.embed_one("invoice question").await.unwrap();
        store
            .insert_email(&EmailRecord {
                id: Uuid::new_v4(),
                subject: "Invoice".to_string(),
                body: "invoice question".to_string(),
                sender: "jordan@example.com".to_string(),
                received_at: chrono::Utc::now(),
                embedding: email_vec,
            })
            .await
            .unwrap();

        let ctx = build_context(
            &store,
            &embedder,
            Some("Jordan"),
            Some("invoice question"),
            3,
            3,
            None,
            Vec::new(),
        )
        .await;
        assert_eq!(ctx.matched_contacts.len(), 1);
        assert_eq!(ctx.matched_emails.len(), 1);
    }

    #[tokio::test]
    async fn test_email_search_breaks_score_ties_by_identifier() {
        let store = store();
        let embedder = embedder();
        let shared_vec = embedder.embed_one("support request").await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..2 {
            let id = Uuid::new_v4();
            ids.push(id);
            store
                .insert_email(&EmailRecord {
                    id,
                    subject: "Support".to_string(),
                    body: "support request".to_string(),
                    sender: "someone@example.com".to_string(),
                    received_at: chrono::Utc::now(),
                    embedding: shared_vec.clone(),
                })
                .await
                .unwrap();
        }
        ids.sort();

        let hits = search_emails(&store, &embedder, "support request", 3).await;
        assert_eq!(hits.len(), 2);
        assert!((hits[0].score - hits[1].score).abs() < f32::EPSILON);
        assert_eq!(hits[0].record.id, ids[0]);
        assert_eq!(hits[1].record.id, ids[1]);
    }
}
