//! `reception-core` — a voice-first phone receptionist: answers inbound
//! calls over a telephony media websocket, transcribes the caller in real
//! time, runs a bounded tool-calling reasoning loop against a retrieval
//! engine (known contacts, similarity-matched emails), speaks the reply
//! back through streaming TTS, and persists one record per call.
//!
//! Module layout follows the reference architecture's own `src/` shape —
//! one file or directory per component, a thin `main.rs` that only wires
//! collaborators together and starts the server — generalized from that
//! system's multi-persona IPC runtime down to this system's single
//! responsibility: one call, one state machine, one reasoning loop.

pub mod admin;
pub mod cache;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod model;
pub mod orchestrator;
pub mod reasoning;
pub mod retrieval;
pub mod storage;
pub mod voice;
