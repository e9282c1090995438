//! Streaming speech-to-text session, grounded in the reference
//! architecture's `voice::stt_service` channel-owned-by-a-background-task
//! shape: the provider connection lives inside a spawned task; callers only
//! ever touch `mpsc` channels, so a provider hiccup can't deadlock the
//! orchestrator's call loop.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::SttError;

#[derive(Debug, Clone)]
pub enum SttEvent {
    /// Running, not-yet-final transcript of the caller's current utterance.
    Interim(String),
    /// A completed utterance. Empty finals are filtered before reaching
    /// callers — an STT provider emitting an empty final is not a turn.
    Final(String),
    Error(String),
}

/// One live connection to a streaming STT provider. Implementations own
/// the transport (websocket, gRPC stream, ...); `SttSession` owns the
/// channel plumbing around it.
#[async_trait]
pub trait SttConnection: Send {
    async fn send_audio(&mut self, frame: &[u8]) -> Result<(), SttError>;
    /// Returns `None` when the provider closes the stream.
    async fn next_event(&mut self) -> Option<SttEvent>;
}

#[async_trait]
pub trait SttAdapter: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SttConnection>, SttError>;
}

/// A restartable streaming session: audio frames go in over `audio_tx`,
/// transcript events come out over the returned receiver. If the provider
/// connection drops, call [`SttSession::restart`] to reconnect without the
/// orchestrator needing to know the old connection died.
pub struct SttSession {
    audio_tx: mpsc::Sender<Vec<u8>>,
    event_rx: mpsc::Receiver<SttEvent>,
    task: JoinHandle<()>,
}

impl SttSession {
    pub async fn start(adapter: &dyn SttAdapter) -> Result<Self, SttError> {
        let conn = adapter.connect().await?;
        Ok(Self::spawn_from(conn))
    }

    fn spawn_from(mut conn: Box<dyn SttConnection>) -> Self {
        let (audio_tx, mut audio_rx) = mpsc::channel::<Vec<u8>>(64);
        let (event_tx, event_rx) = mpsc::channel::<SttEvent>(64);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = audio_rx.recv() => {
                        match frame {
                            Some(bytes) => {
                                if let Err(e) = conn.send_audio(&bytes).await {
                                    let _ = event_tx.send(SttEvent::Error(e.to_string())).await;
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                    event = conn.next_event() => {
                        match event {
                            Some(SttEvent::Final(text)) if text.trim().is_empty() => {
                                // Empty finals carry no utterance; drop silently.
                            }
                            Some(ev) => {
                                if event_tx.send(ev).await.is_err() {
                                    break;
                                }
                            }
                            None => break,
                        }
                    }
                }
            }
        });

        SttSession { audio_tx, event_rx, task }
    }

    pub async fn send_audio(&self, frame: Vec<u8>) -> Result<(), SttError> {
        self.audio_tx
            .send(frame)
            .await
            .map_err(|_| SttError::TranscriptionUnavailable("stt session closed".to_string()))
    }

    pub async fn next_event(&mut self) -> Option<SttEvent> {
        self.event_rx.recv().await
    }

    /// Reconnect to the provider, replacing the background task. The old
    /// session's channels are dropped; the orchestrator must re-fetch the
    /// new `audio_tx`/event stream via the returned session.
    pub async fn restart(adapter: &dyn SttAdapter) -> Result<Self, SttError> {
        Self::start(adapter).await
    }
}

impl Drop for SttSession {
    /// Dropping a session (explicit close, restart, or call teardown) must
    /// release the provider connection promptly rather than waiting for the
    /// background task to notice its channels closed.
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use tokio::sync::Mutex;

    struct ScriptedConnection {
        events: Mutex<VecDeque<SttEvent>>,
    }

    #[async_trait]
    impl SttConnection for ScriptedConnection {
        async fn send_audio(&mut self, _frame: &[u8]) -> Result<(), SttError> {
            Ok(())
        }

        async fn next_event(&mut self) -> Option<SttEvent> {
            self.events.lock().await.pop_front()
        }
    }

    struct ScriptedAdapter;

    #[async_trait]
    impl SttAdapter for ScriptedAdapter {
        async fn connect(&self) -> Result<Box<dyn SttConnection>, SttError> {
            let mut events = VecDeque::new();
            events.push_back(SttEvent::Interim("hel".to_string()));
            events.push_back(SttEvent::Final("hello".to_string()));
            events.push_back(SttEvent::Final(String::new()));
            Ok(Box::new(ScriptedConnection {
                events: Mutex::new(events),
            }))
        }
    }

    #[tokio::test]
    async fn test_empty_final_is_filtered() {
        let adapter = ScriptedAdapter;
        let mut session = SttSession::start(&adapter).await.unwrap();

        let mut seen = Vec::new();
        while let Some(event) = session.next_event().await {
            seen.push(event);
            if seen.len() == 2 {
                break;
            }
        }

        assert!(matches!(seen[0], SttEvent::Interim(_)));
        assert!(matches!(&seen[1], SttEvent::Final(text) if text == "hello"));
    }
}
