//! Streaming text-to-speech session, grounded in the reference
//! architecture's `voice::tts_service`: speak requests are serialized FIFO
//! through a single background task, and a `cancel()` call drains any
//! in-flight synthesis so a barge-in can silence the assistant mid-sentence
//! without racing the next speak request.
//!
//! `cancel()` fires an independent `Notify` rather than going through the
//! speak queue: the background task is parked inside `conn.synthesize(...)`
//! while a speak is in flight, so a cancel signal delivered only through
//! that same queue would sit unread until the current utterance finishes on
//! its own — defeating the barge-in deadline. `Notify` always wakes the
//! task immediately regardless of what it's currently awaiting.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;

use crate::error::TtsError;

#[async_trait]
pub trait TtsConnection: Send {
    /// Synthesize `text`, streaming mulaw/PCM frames to `audio_tx` as they
    /// become available. Must return promptly once `cancel_rx` fires.
    async fn synthesize(
        &mut self,
        text: &str,
        audio_tx: mpsc::Sender<Vec<u8>>,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> Result<(), TtsError>;
}

#[async_trait]
pub trait TtsAdapter: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn TtsConnection>, TtsError>;
}

struct SpeakRequest {
    text: String,
    audio_tx: mpsc::Sender<Vec<u8>>,
    done_tx: oneshot::Sender<Result<(), TtsError>>,
}

/// A FIFO speak queue backed by one provider connection. `speak` returns a
/// receiver that resolves once that utterance finishes (or is cancelled);
/// `cancel` interrupts whatever is currently synthesizing without tearing
/// down the session. Subsequent `speak` calls after a `cancel` proceed
/// normally — cancellation only ever affects the utterance in flight at the
/// moment it fires.
pub struct TtsSession {
    speak_tx: mpsc::Sender<SpeakRequest>,
    cancel_signal: Arc<Notify>,
    task: JoinHandle<()>,
}

impl TtsSession {
    pub async fn start(adapter: &dyn TtsAdapter) -> Result<Self, TtsError> {
        let conn = adapter.connect().await?;
        Ok(Self::spawn_from(conn))
    }

    fn spawn_from(mut conn: Box<dyn TtsConnection>) -> Self {
        let (speak_tx, mut speak_rx) = mpsc::channel::<SpeakRequest>(16);
        let cancel_signal = Arc::new(Notify::new());
        let task_cancel_signal = cancel_signal.clone();

        let task = tokio::spawn(async move {
            while let Some(SpeakRequest { text, audio_tx, done_tx }) = speak_rx.recv().await {
                let (cancel_tx, mut cancel_rx) = oneshot::channel();
                let mut cancel_tx = Some(cancel_tx);
                let synth_fut = conn.synthesize(&text, audio_tx, &mut cancel_rx);
                tokio::pin!(synth_fut);

                let result = loop {
                    tokio::select! {
                        r = &mut synth_fut => break r,
                        _ = task_cancel_signal.notified(), if cancel_tx.is_some() => {
                            if let Some(tx) = cancel_tx.take() {
                                let _ = tx.send(());
                            }
                        }
                    }
                };
                let _ = done_tx.send(result);
            }
        });

        TtsSession { speak_tx, cancel_signal, task }
    }

    /// Queue `text` for synthesis; frames stream out over `audio_tx` as
    /// they're produced. The returned receiver resolves when this
    /// utterance's turn completes (or is cancelled).
    pub async fn speak(
        &self,
        text: String,
        audio_tx: mpsc::Sender<Vec<u8>>,
    ) -> oneshot::Receiver<Result<(), TtsError>> {
        let (done_tx, done_rx) = oneshot::channel();
        let _ = self
            .speak_tx
            .send(SpeakRequest { text, audio_tx, done_tx })
            .await;
        done_rx
    }

    /// Interrupt whatever is currently synthesizing, at the next frame
    /// boundary the provider connection checks its `cancel_rx`. A no-op if
    /// nothing is in flight.
    pub async fn cancel(&self) {
        self.cancel_signal.notify_one();
    }

    /// Drop the speak queue so the background task's receive loop ends on
    /// its own, then wait up to `grace` for it to actually exit. A real
    /// provider connection's teardown (closing its websocket, flushing
    /// buffers) happens as that task unwinds; this does not abort the task
    /// if `grace` elapses first — the caller proceeds regardless, per the
    /// call's own shutdown-grace bound.
    pub async fn close(self, grace: Duration) {
        let TtsSession { speak_tx, task, .. } = self;
        drop(speak_tx);
        let _ = tokio::time::timeout(grace, task).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoConnection;

    #[async_trait]
    impl TtsConnection for EchoConnection {
        async fn synthesize(
            &mut self,
            text: &str,
            audio_tx: mpsc::Sender<Vec<u8>>,
            _cancel_rx: &mut oneshot::Receiver<()>,
        ) -> Result<(), TtsError> {
            let _ = audio_tx.send(text.as_bytes().to_vec()).await;
            Ok(())
        }
    }

    struct EchoAdapter;

    #[async_trait]
    impl TtsAdapter for EchoAdapter {
        async fn connect(&self) -> Result<Box<dyn TtsConnection>, TtsError> {
            Ok(Box::new(EchoConnection))
        }
    }

    #[tokio::test]
    async fn test_speak_delivers_audio_and_resolves() {
        let adapter = EchoAdapter;
        let session = TtsSession::start(&adapter).await.unwrap();
        let (audio_tx, mut audio_rx) = mpsc::channel(4);

        let done_rx = session.speak("hello caller".to_string(), audio_tx).await;
        let frame = audio_rx.recv().await.unwrap();
        assert_eq!(frame, b"hello caller");

        let result = done_rx.await.unwrap();
        assert!(result.is_ok());
    }

    /// A connection that streams frames one at a time, forever, until its
    /// `cancel_rx` fires — the shape a real streaming provider takes.
    struct LongWindedConnection;

    #[async_trait]
    impl TtsConnection for LongWindedConnection {
        async fn synthesize(
            &mut self,
            _text: &str,
            audio_tx: mpsc::Sender<Vec<u8>>,
            cancel_rx: &mut oneshot::Receiver<()>,
        ) -> Result<(), TtsError> {
            loop {
                if cancel_rx.try_recv().is_ok() {
                    return Ok(());
                }
                if audio_tx.send(vec![0xFF; 160]).await.is_err() {
                    return Ok(());
                }
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        }
    }

    struct LongWindedAdapter;

    #[async_trait]
    impl TtsAdapter for LongWindedAdapter {
        async fn connect(&self) -> Result<Box<dyn TtsConnection>, TtsError> {
            Ok(Box::new(LongWindedConnection))
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_inflight_speak() {
        let adapter = LongWindedAdapter;
        let session = TtsSession::start(&adapter).await.unwrap();
        let (audio_tx, mut audio_rx) = mpsc::channel(64);

        let done_rx = session.speak("a very long reply".to_string(), audio_tx).await;
        // Let a couple of frames go out before barging in.
        audio_rx.recv().await.unwrap();
        session.cancel().await;

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), done_rx)
            .await
            .expect("cancel should resolve the in-flight speak promptly")
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_speak_after_cancel_proceeds_normally() {
        let adapter = EchoAdapter;
        let session = TtsSession::start(&adapter).await.unwrap();
        session.cancel().await; // no-op, nothing in flight

        let (audio_tx, mut audio_rx) = mpsc::channel(4);
        let done_rx = session.speak("hello again".to_string(), audio_tx).await;
        let frame = audio_rx.recv().await.unwrap();
        assert_eq!(frame, b"hello again");
        assert!(done_rx.await.unwrap().is_ok());
    }
}
