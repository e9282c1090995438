//! Data model. Wire-facing types follow the `serde`-derive conventions
//! observed throughout the reference architecture's `ai::types` module
//! (tagged enums for variant payloads, `rename_all = "camelCase"` at the
//! wire boundary, plain `snake_case` internally for storage rows).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A contact's email on file, embedded once at ingest time for similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailRecord {
    pub id: Uuid,
    pub subject: String,
    pub body: String,
    pub sender: String,
    pub received_at: DateTime<Utc>,
    /// `EMB_DIM`-length embedding of `subject` + `body`, computed at ingest.
    pub embedding: Vec<f32>,
}

/// A known contact, embedded once at ingest time on `name` + `notes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub notes: String,
    pub embedding: Vec<f32>,
}

/// Who produced a given transcript line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerType {
    Caller,
    Assistant,
}

/// One line of the call transcript, append-only for the lifetime of the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: SpeakerType,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Terminal classification of a call, assigned once when the call record is
/// closed out. See the pinned reasoning-outcome mapping in `orchestrator.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    InProgress,
    Connected,
    Voicemail,
    Rejected,
    Missed,
}

/// A stored call record, one per inbound call, written incrementally as the
/// call progresses and finalized when it ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: Uuid,
    /// The telephony gateway's own call identifier (Twilio's `CallSid` or
    /// equivalent), when known. This is the key the `POST /call-status`
    /// webhook correlates against — the gateway has no notion of our
    /// internal `id` and never will. `None` only for the narrow window
    /// between `CallRecord::new` and the media stream's `start` frame
    /// arriving with the gateway's identifier attached.
    pub gateway_call_sid: Option<String>,
    pub caller_number: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: CallOutcome,
    pub transcript: Vec<TranscriptEntry>,
    pub identified_name: Option<String>,
    pub inferred_purpose: Option<String>,
}

impl CallRecord {
    pub fn new(
        id: Uuid,
        gateway_call_sid: Option<String>,
        caller_number: Option<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        CallRecord {
            id,
            gateway_call_sid,
            caller_number,
            started_at,
            ended_at: None,
            outcome: CallOutcome::InProgress,
            transcript: Vec::new(),
            identified_name: None,
            inferred_purpose: None,
        }
    }

    pub fn push_transcript(&mut self, speaker: SpeakerType, text: String, at: DateTime<Utc>) {
        self.transcript.push(TranscriptEntry { speaker, text, at });
    }
}

/// One scored hit from a vector-similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult<T> {
    pub record: T,
    pub score: f32,
}

/// Turn-local grounding context assembled by the retrieval engine and handed
/// to the reasoning driver for exactly one turn. Never persisted verbatim —
/// only the transcript entries and extracted fields survive into `CallRecord`.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub identified_name: Option<String>,
    pub inferred_purpose: Option<String>,
    pub matched_contacts: Vec<SearchResult<ContactRecord>>,
    pub matched_emails: Vec<SearchResult<EmailRecord>>,
    /// Last `TRANSCRIPT_TAIL_LEN` transcript entries, oldest first.
    pub transcript_tail: Vec<TranscriptEntry>,
    pub caller_number: Option<String>,
}
