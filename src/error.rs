//! Error taxonomy — one `thiserror` enum per component, mirroring the
//! reference architecture's nested-`thiserror` pattern (see its own
//! `voice::stt`/`voice::tts` error enums). Each component returns its own
//! narrow error type all the way up to its caller; nothing here needs a
//! single unified error type, since no call site crosses more than one of
//! these boundaries at once.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend unreachable: {0}")]
    Unavailable(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage operation failed: {0}")]
    Operation(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding input is empty or whitespace-only")]
    InvalidInput,
    #[error("embedding provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum SttError {
    #[error("stt session ended abnormally: {0}")]
    TranscriptionUnavailable(String),
}

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("tts session failed: {0}")]
    SynthesisUnavailable(String),
}

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning model transport/timeout error: {0}")]
    Unavailable(String),
}
