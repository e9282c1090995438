//! C9 — Audio Artifact Cache.
//!
//! Bounded LRU (the `lru` crate, the pack's common choice for exactly this
//! shape) keyed by `hash(reply_text, voice_params)`, guarded by a
//! `parking_lot::Mutex` under a "no I/O under the lock" rule: synthesis
//! happens outside any lock, insertion is a pointer swap. Concurrent miss on
//! the same key is single-flight (a pinned design decision) — the
//! second requester awaits the first's in-flight synthesis via a cloned
//! `tokio::sync::broadcast` receiver instead of triggering a second
//! round-trip to the TTS provider.

use std::num::NonZeroUsize;
use std::sync::Arc;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

use crate::error::TtsError;
use crate::voice::tts::TtsSession;

/// Synthesizes one block of audio for `text` end to end, with no
/// intermediate frames exposed to the caller — the "batch mode"
/// requires for cache population, as opposed to the frame-streaming
/// interface [`TtsSession::speak`] normally uses in-call.
#[async_trait]
pub trait BatchSynthesizer: Send + Sync {
    async fn synthesize_batch(&self, text: &str) -> Result<Vec<u8>, TtsError>;
}

/// Adapts a live [`TtsSession`] into [`BatchSynthesizer`] by draining every
/// frame of one `speak` call into a single concatenated blob.
pub struct SessionBatchSynthesizer {
    session: TtsSession,
}

impl SessionBatchSynthesizer {
    pub fn new(session: TtsSession) -> Self {
        SessionBatchSynthesizer { session }
    }
}

#[async_trait]
impl BatchSynthesizer for SessionBatchSynthesizer {
    async fn synthesize_batch(&self, text: &str) -> Result<Vec<u8>, TtsError> {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
        let done_rx = self.session.speak(text.to_string(), audio_tx).await;

        let mut blob = Vec::new();
        while let Some(frame) = audio_rx.recv().await {
            blob.extend_from_slice(&frame);
        }
        done_rx
            .await
            .map_err(|_| TtsError::SynthesisUnavailable("batch synthesis session closed".to_string()))??;
        Ok(blob)
    }
}

enum Slot {
    Ready(Arc<Vec<u8>>),
    InFlight(broadcast::Sender<Arc<Vec<u8>>>),
}

/// Process-wide, per-process-only (no persistence) cache from an
/// opaque identifier to a synthesized audio blob. The identifier doubles as
/// the cache key and the path segment served by the C10 audio pull route;
/// once evicted, the identifier is dead — a later GET for it is a 404.
pub struct AudioArtifactCache {
    inner: Mutex<LruCache<String, Slot>>,
}

impl AudioArtifactCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        AudioArtifactCache {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Deterministic key for `(reply_text, voice_params)` — same inputs
    /// always address the same cache slot, so repeated greetings or replies
    /// reuse one synthesis.
    pub fn key_for(reply_text: &str, voice_params: &str) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        reply_text.hash(&mut hasher);
        voice_params.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Serve an already-cached blob by its opaque id, without synthesizing.
    /// Used by the C10 pull-URL route; `None` means "expired or never
    /// existed" and the caller should respond 404.
    pub fn get(&self, id: &str) -> Option<Arc<Vec<u8>>> {
        match self.inner.lock().get(id) {
            Some(Slot::Ready(blob)) => Some(blob.clone()),
            _ => None,
        }
    }

    /// Fetch-or-synthesize. On a cache hit, returns immediately with no
    /// provider call. On a miss, synthesizes via `synth` outside the lock;
    /// a second caller racing the same key awaits the first's result
    /// instead of synthesizing again (single-flight).
    pub async fn get_or_synthesize(
        &self,
        reply_text: &str,
        voice_params: &str,
        synth: &dyn BatchSynthesizer,
    ) -> Result<(String, Arc<Vec<u8>>), TtsError> {
        let id = Self::key_for(reply_text, voice_params);

        enum Action {
            Hit(Arc<Vec<u8>>),
            Follow(broadcast::Receiver<Arc<Vec<u8>>>),
            Lead(broadcast::Sender<Arc<Vec<u8>>>),
        }

        let action = {
            let mut guard = self.inner.lock();
            match guard.get(&id) {
                Some(Slot::Ready(blob)) => Action::Hit(blob.clone()),
                Some(Slot::InFlight(tx)) => Action::Follow(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    guard.put(id.clone(), Slot::InFlight(tx.clone()));
                    Action::Lead(tx)
                }
            }
        };

        match action {
            Action::Hit(blob) => Ok((id, blob)),
            Action::Follow(mut rx) => {
                let blob = rx.recv().await.map_err(|_| {
                    TtsError::SynthesisUnavailable("in-flight synthesis dropped".to_string())
                })?;
                Ok((id, blob))
            }
            Action::Lead(tx) => {
                let result = synth.synthesize_batch(reply_text).await;
                match result {
                    Ok(bytes) => {
                        let blob = Arc::new(bytes);
                        self.inner.lock().put(id.clone(), Slot::Ready(blob.clone()));
                        let _ = tx.send(blob.clone());
                        Ok((id, blob))
                    }
                    Err(e) => {
                        self.inner.lock().pop(&id);
                        Err(e)
                    }
                }
            }
        }
    }
}
