//! Tunable limits and budgets — single source of truth.
//!
//! Every constant here has a matching override in [`crate::config::Config`];
//! the values below are the compiled-in defaults, not hard limits.

/// Dimensionality of every embedding vector produced by [`crate::embedding`].
pub const EMB_DIM: usize = 1024;

/// Maximum contact hits returned by `search_contacts` / folded into a `Context`.
pub const K_CONTACTS: usize = 3;

/// Maximum email hits returned by `search_emails` / folded into a `Context`.
pub const K_EMAILS: usize = 3;

/// Per-turn tool-calling iteration budget for the reasoning driver.
pub const MAX_TOOL_ITERS: u32 = 4;

/// Minimum running length (chars) of an interim transcript to count as barge-in.
pub const BARGE_IN_MIN_CHARS: usize = 3;

/// No audio frames at all for this long tears the call down.
pub const CALL_IDLE_TIMEOUT_SECS: u64 = 30;

/// No STT final while LISTENING for this long triggers a re-prompt.
pub const SILENCE_TIMEOUT_SECS: u64 = 6;

/// Budget for one reasoning-model invocation (including tool round-trips).
pub const MODEL_TURN_TIMEOUT_SECS: u64 = 8;

/// Budget for a single tool call dispatched to the retrieval engine.
pub const TOOL_CALL_TIMEOUT_SECS: u64 = 3;

/// Grace window after ENDING before the orchestrator forces ENDED regardless.
pub const SHUTDOWN_GRACE_SECS: u64 = 2;

/// Audio artifact cache capacity (entries), LRU eviction beyond this.
pub const CACHE_MAX: usize = 100;

/// Number of silence re-prompts allowed before the orchestrator hangs up.
pub const MAX_SILENCE_REPROMPTS: u32 = 2;

/// Number of utterances carried in a `Context`'s transcript tail.
pub const TRANSCRIPT_TAIL_LEN: usize = 10;

/// Backoff before the reasoning driver's single transport retry.
pub const REASONING_RETRY_BACKOFF_MS: u64 = 250;

/// mulaw/8kHz frame cadence assumed throughout the media gateway.
pub const MEDIA_FRAME_DURATION_MS: u64 = 20;
