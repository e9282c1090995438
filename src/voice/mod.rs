//! C5 — Voice I/O Adapters: streaming STT and TTS sessions, grounded in the
//! reference architecture's `voice::stt_service`/`voice::tts_service`
//! channel-driven session pattern (a background `tokio::spawn`ed task owns
//! the provider connection; callers talk to it over `mpsc` channels rather
//! than holding the connection directly).

pub mod adapters;
pub mod stt;
pub mod tts;
