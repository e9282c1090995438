//! Deterministic TTS stand-in, grounded in the reference architecture's
//! `tts_service` test pattern of a fallback adapter that produces silence
//! instead of calling a real provider — used in tests and as the
//! last-resort adapter if no TTS provider key is configured, so a call
//! still gets *some* audio rather than dead air with no frames at all.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::error::TtsError;
use crate::voice::tts::{TtsAdapter, TtsConnection};

/// Bytes of mulaw silence (0xFF is mulaw's zero-amplitude code) per
/// synthesized "frame", one frame per word in the input as a crude
/// duration stand-in.
const SILENCE_FRAME: [u8; 160] = [0xFFu8; 160];

pub struct SilenceTtsAdapter;

struct SilenceConnection;

#[async_trait]
impl TtsConnection for SilenceConnection {
    async fn synthesize(
        &mut self,
        text: &str,
        audio_tx: mpsc::Sender<Vec<u8>>,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> Result<(), TtsError> {
        let frame_count = text.split_whitespace().count().max(1);
        for _ in 0..frame_count {
            if cancel_rx.try_recv().is_ok() {
                return Ok(());
            }
            if audio_tx.send(SILENCE_FRAME.to_vec()).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TtsAdapter for SilenceTtsAdapter {
    async fn connect(&self) -> Result<Box<dyn TtsConnection>, TtsError> {
        Ok(Box::new(SilenceConnection))
    }
}
