//! C7 — Call State & Orchestrator. The core of this system: one task per
//! call, owning a `CallRecord` and driving it through GREETING → LISTENING →
//! THINKING → SPEAKING (looping) → ENDING → ENDED.
//!
//! Grounded structurally in the reference architecture's per-connection
//! `tokio::spawn` + `tokio::select!` loop (`voice::call_server::handle_connection`):
//! one long-lived task owns all mutable call state, every other component is
//! reached only through channels or `Arc`-shared handles, and cancellation is
//! a typed signal rather than a shared flag checked by polling. Unlike that
//! reference loop — which fans a caller's audio out to several AI
//! participants in a group call — this orchestrator drives exactly one
//! caller through exactly one reasoning turn at a time, which is why it's
//! new code rather than an adaptation of that file's body.
//!
//! Cancellation is modeled as a typed signal rather than a shared flag: `CallHandle`
//! is a thin newtype over a `watch::Sender<bool>`; barge-in cancels the
//! in-flight reasoning turn via `JoinHandle::abort()` and the in-flight
//! speech via `TtsSession::cancel()`, never via a shared `AtomicBool` another
//! task has to remember to poll.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Config;
use crate::constants::{MAX_SILENCE_REPROMPTS, TRANSCRIPT_TAIL_LEN};
use crate::embedding::EmbeddingClient;
use crate::error::TtsError;
use crate::model::{CallOutcome, CallRecord, SpeakerType, TranscriptEntry};
use crate::reasoning::adapter::ReasoningAdapter;
use crate::reasoning::types::ToolSpec;
use crate::reasoning::{self, ToolExecutor, TurnOutcome};
use crate::retrieval;
use crate::storage::ReceptionStore;
use crate::voice::stt::{SttAdapter, SttEvent, SttSession};
use crate::voice::tts::{TtsAdapter, TtsSession};
use crate::{clog_error, clog_info, clog_warn};

const GREETING: &str = "Thank you for calling. How can I help you today?";
const SILENCE_REPROMPT: &str = "Are you still there? Let me know how I can help, or I can take a message.";
const TIMEOUT_REPLY: &str =
    "I'm having trouble finding that right now. Could you say that again, or leave a message?";

const SYSTEM_PROMPT: &str = "You are a phone receptionist. Keep replies short and natural to \
speak aloud. If the caller states their name, include it verbatim once as \
`[[name: ...]]`. If you infer why they're calling, include it once as \
`[[purpose: ...]]`. If what you're hearing sounds like an answering \
machine greeting rather than a live caller, include `[[voicemail]]` once. \
Use `search_contacts` when a name is mentioned and `search_emails` when the \
caller's purpose suggests relevant correspondence is on file. When you're \
ready to speak to the caller, call `generate_response` with the exact words \
to say.";

/// Events the media gateway (C8) hands the orchestrator. Audio always flows
/// to STT regardless of call phase — a caller talking over the greeting is
/// still transcribed, even if it's discarded as a false barge-in.
#[derive(Debug)]
pub enum GatewayEvent {
    Media(Vec<u8>),
    Stop,
}

/// State machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    Greeting,
    Listening,
    Thinking,
    Speaking,
    Ending,
    Ended,
}

/// External handle to a running call, held by the media gateway / admin
/// surface. Cloning and calling [`CallHandle::hangup`] from any task is
/// safe; the orchestrator observes it via `watch::Receiver::changed`.
#[derive(Clone)]
pub struct CallHandle {
    pub call_id: Uuid,
    ending_tx: watch::Sender<bool>,
}

impl CallHandle {
    pub fn hangup(&self) {
        let _ = self.ending_tx.send(true);
    }
}

/// Everything [`spawn_call`] needs to drive a call, bundled so call sites
/// don't thread five `Arc`s through individually. Built once in `main` and
/// cloned (cheaply — every field is an `Arc`) per inbound call.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn ReceptionStore>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub reasoning: Arc<dyn ReasoningAdapter>,
    pub stt_adapter: Arc<dyn SttAdapter>,
    pub tts_adapter: Arc<dyn TtsAdapter>,
    pub config: Arc<Config>,
}

/// What the gateway gets back from [`spawn_call`]: a handle to force a
/// hangup, a sender for inbound media/control events, and a receiver for
/// outbound synthesized audio frames to relay to the caller.
pub struct CallSession {
    pub handle: CallHandle,
    pub inbound: mpsc::Sender<GatewayEvent>,
    pub outbound_audio: mpsc::Receiver<Vec<u8>>,
}

/// Dispatches `search_contacts` / `search_emails` against the retrieval
/// engine. `generate_response` is listed so the model knows it exists, but
/// the turn loop intercepts it before it would ever reach `call_tool`.
struct RetrievalToolExecutor {
    store: Arc<dyn ReceptionStore>,
    embedder: Arc<dyn EmbeddingClient>,
    k_contacts: usize,
    k_emails: usize,
}

#[async_trait::async_trait]
impl ToolExecutor for RetrievalToolExecutor {
    fn tool_specs(&self) -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: "search_contacts".to_string(),
                description: "Look up a known contact by the name the caller gave.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "name": { "type": "string" } },
                    "required": ["name"],
                }),
            },
            ToolSpec {
                name: "search_emails".to_string(),
                description: "Find emails on file related to the caller's stated purpose."
                    .to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "purpose": { "type": "string" } },
                    "required": ["purpose"],
                }),
            },
            ToolSpec {
                name: "generate_response".to_string(),
                description: "End this turn and speak `reply` to the caller.".to_string(),
                input_schema: serde_json::json!({
                    "type": "object",
                    "properties": { "reply": { "type": "string" } },
                    "required": ["reply"],
                }),
            },
        ]
    }

    async fn call_tool(&self, name: &str, input: serde_json::Value) -> Result<String, String> {
        match name {
            "search_contacts" => {
                let name_arg = input
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing `name` argument".to_string())?;
                let hits = retrieval::search_contacts(&self.store, name_arg, self.k_contacts).await;
                serde_json::to_string(&hits).map_err(|e| e.to_string())
            }
            "search_emails" => {
                let purpose_arg = input
                    .get("purpose")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| "missing `purpose` argument".to_string())?;
                let hits =
                    retrieval::search_emails(&self.store, &self.embedder, purpose_arg, self.k_emails)
                        .await;
                serde_json::to_string(&hits).map_err(|e| e.to_string())
            }
            other => Err(format!("unknown tool: {other}")),
        }
    }
}

/// Why a call ended, used only to pick a [`CallOutcome`] — never persisted
/// itself.
#[derive(Debug, Clone, Copy)]
enum EndReason {
    StreamStopped,
    ExplicitHangup,
    IdleTimeout,
    SilenceExhausted,
    ProtocolError,
}

/// Pinned mapping from termination circumstance to [`CallOutcome`].
/// `voicemail_detected` wins regardless of how the call otherwise ended —
/// it is set either by the telephony gateway's own answered-by signal
/// (a `start` frame custom parameter) or by the reasoning model recognizing
/// an answering-machine greeting mid-call (`[[voicemail]]`). Otherwise, a
/// call that never produced a single transcribed caller utterance counts
/// as `Missed`, not `Connected`, regardless of how it ended.
/// `Rejected` is reserved for a future inbound-screening feature and is
/// never produced here.
fn classify_outcome(_reason: EndReason, caller_turns: usize, voicemail_detected: bool) -> CallOutcome {
    if voicemail_detected {
        return CallOutcome::Voicemail;
    }
    if caller_turns == 0 {
        CallOutcome::Missed
    } else {
        CallOutcome::Connected
    }
}

/// Persist the call record, retrying once on failure before logging and
/// moving on — "call record persisted at least once... retry-once-
/// then-log-and-proceed" edge case. A persistence outage must never block
/// call teardown.
async fn persist_with_retry(store: &Arc<dyn ReceptionStore>, record: &CallRecord) {
    if let Err(e) = store.upsert_call(record).await {
        clog_warn!("call {} persistence failed, retrying once: {}", record.id, e);
        if let Err(e2) = store.upsert_call(record).await {
            clog_error!(
                "call {} persistence failed after retry, proceeding without it: {}",
                record.id,
                e2
            );
        }
    }
}

fn transcript_tail(transcript: &[TranscriptEntry], n: usize) -> Vec<TranscriptEntry> {
    let start = transcript.len().saturating_sub(n);
    transcript[start..].to_vec()
}

/// Spawn one bounded reasoning turn as its own task so the caller-facing
/// select loop can cancel it with [`JoinHandle::abort`] on barge-in without
/// waiting for it to unwind cooperatively. Bounded at the top by
/// `model_turn_timeout`, distinct from (and larger than) the finer-grained
/// per-tool-call timeout `reasoning::run_turn` already enforces internally.
fn spawn_turn(
    collaborators: &Collaborators,
    executor: Arc<dyn ToolExecutor>,
    record: &CallRecord,
    caller_utterance: String,
) -> JoinHandle<TurnOutcome> {
    let reasoning = collaborators.reasoning.clone();
    let store = collaborators.store.clone();
    let embedder = collaborators.embedder.clone();
    let k_contacts = collaborators.config.k_contacts;
    let k_emails = collaborators.config.k_emails;
    let model_turn_timeout = collaborators.config.model_turn_timeout;
    let limits = reasoning::TurnLimits {
        max_tool_iters: collaborators.config.max_tool_iters,
        tool_call_timeout: collaborators.config.tool_call_timeout,
    };
    let identified_name = record.identified_name.clone();
    let inferred_purpose = record.inferred_purpose.clone();
    let caller_number = record.caller_number.clone();
    let tail = transcript_tail(&record.transcript, TRANSCRIPT_TAIL_LEN);

    tokio::spawn(async move {
        let context = retrieval::build_context(
            &store,
            &embedder,
            identified_name.as_deref(),
            inferred_purpose.as_deref(),
            k_contacts,
            k_emails,
            caller_number,
            tail,
        )
        .await;

        let turn = reasoning::run_turn(
            &reasoning,
            &executor,
            SYSTEM_PROMPT,
            &context,
            &caller_utterance,
            limits,
        );

        match tokio::time::timeout(model_turn_timeout, turn).await {
            Ok(outcome) => outcome,
            Err(_) => TurnOutcome {
                reply: TIMEOUT_REPLY.to_string(),
                identified_name: None,
                inferred_purpose: None,
                voicemail: false,
            },
        }
    })
}

/// Spawn a call's state machine task and return the handles the media
/// gateway drives it with. `gateway_call_sid` is the telephony provider's
/// own call identifier (Twilio's `CallSid`), known by the time the media
/// gateway's `start` frame has been parsed — carried onto the call record
/// so the `POST /call-status` webhook (C10) can find this call later.
/// `voicemail_signaled` is the gateway's own answered-by signal, read off
/// the same `start` frame; the model can also raise it mid-call, so the
/// final outcome ORs both sources together.
pub fn spawn_call(
    collaborators: Collaborators,
    gateway_call_sid: Option<String>,
    caller_number: Option<String>,
    voicemail_signaled: bool,
) -> CallSession {
    let call_id = Uuid::new_v4();
    let (ending_tx, ending_rx) = watch::channel(false);
    let (inbound_tx, inbound_rx) = mpsc::channel::<GatewayEvent>(64);
    let (outbound_tx, outbound_rx) = mpsc::channel::<Vec<u8>>(128);

    let handle = CallHandle { call_id, ending_tx };

    tokio::spawn(run_call(
        collaborators,
        call_id,
        gateway_call_sid,
        caller_number,
        voicemail_signaled,
        inbound_rx,
        outbound_tx,
        ending_rx,
    ));

    CallSession {
        handle,
        inbound: inbound_tx,
        outbound_audio: outbound_rx,
    }
}

async fn run_call(
    collaborators: Collaborators,
    call_id: Uuid,
    gateway_call_sid: Option<String>,
    caller_number: Option<String>,
    voicemail_signaled: bool,
    mut inbound: mpsc::Receiver<GatewayEvent>,
    outbound_tx: mpsc::Sender<Vec<u8>>,
    mut ending_rx: watch::Receiver<bool>,
) {
    let mut record = CallRecord::new(call_id, gateway_call_sid, caller_number, Utc::now());
    let mut voicemail_detected = voicemail_signaled;

    let mut stt = match SttSession::start(collaborators.stt_adapter.as_ref()).await {
        Ok(s) => s,
        Err(e) => {
            clog_error!("call {} could not start stt session: {}", call_id, e);
            record.outcome = CallOutcome::Missed;
            record.ended_at = Some(Utc::now());
            persist_with_retry(&collaborators.store, &record).await;
            return;
        }
    };

    let tts = match TtsSession::start(collaborators.tts_adapter.as_ref()).await {
        Ok(t) => t,
        Err(e) => {
            clog_error!("call {} could not start tts session: {}", call_id, e);
            record.outcome = CallOutcome::Missed;
            record.ended_at = Some(Utc::now());
            persist_with_retry(&collaborators.store, &record).await;
            return;
        }
    };

    let executor: Arc<dyn ToolExecutor> = Arc::new(RetrievalToolExecutor {
        store: collaborators.store.clone(),
        embedder: collaborators.embedder.clone(),
        k_contacts: collaborators.config.k_contacts,
        k_emails: collaborators.config.k_emails,
    });

    clog_info!("call {} entered GREETING", call_id);
    let mut phase = CallPhase::Greeting;
    record.push_transcript(SpeakerType::Assistant, GREETING.to_string(), Utc::now());
    let mut tts_done_rx: Option<oneshot::Receiver<Result<(), TtsError>>> =
        Some(tts.speak(GREETING.to_string(), outbound_tx.clone()).await);

    let mut in_flight_turn: Option<JoinHandle<TurnOutcome>> = None;
    let mut silence_reprompts: u32 = 0;

    let mut idle_sleep = Box::pin(tokio::time::sleep(collaborators.config.call_idle_timeout));
    let mut silence_sleep = Box::pin(tokio::time::sleep(collaborators.config.silence_timeout));

    let end_reason = loop {
        tokio::select! {
            changed = ending_rx.changed() => {
                if changed.is_ok() && *ending_rx.borrow() {
                    break EndReason::ExplicitHangup;
                }
            }

            event = inbound.recv() => {
                match event {
                    Some(GatewayEvent::Media(bytes)) => {
                        idle_sleep.as_mut().reset(tokio::time::Instant::now() + collaborators.config.call_idle_timeout);
                        let _ = stt.send_audio(bytes).await;
                    }
                    Some(GatewayEvent::Stop) | None => break EndReason::StreamStopped,
                }
            }

            stt_event = stt.next_event() => {
                match stt_event {
                    Some(SttEvent::Interim(text)) => {
                        let barging_in = matches!(phase, CallPhase::Speaking | CallPhase::Greeting)
                            && text.trim().chars().count() >= collaborators.config.barge_in_min_chars;
                        if barging_in {
                            clog_info!("call {} barge-in detected, cancelling in-flight speech/turn", call_id);
                            tts.cancel().await;
                            if let Some(handle) = in_flight_turn.take() {
                                handle.abort();
                            }
                            tts_done_rx = None;
                            phase = CallPhase::Listening;
                            silence_sleep.as_mut().reset(tokio::time::Instant::now() + collaborators.config.silence_timeout);
                        }
                    }
                    Some(SttEvent::Final(text)) => {
                        if phase == CallPhase::Listening && !text.trim().is_empty() {
                            record.push_transcript(SpeakerType::Caller, text.clone(), Utc::now());
                            phase = CallPhase::Thinking;
                            silence_reprompts = 0;
                            in_flight_turn = Some(spawn_turn(&collaborators, executor.clone(), &record, text));
                        }
                        // A final arriving outside LISTENING (e.g. stray provider
                        // output while THINKING/SPEAKING) belongs to no open turn
                        // and is dropped.
                    }
                    Some(SttEvent::Error(e)) => {
                        clog_warn!("call {} stt error, attempting one restart: {}", call_id, e);
                        match SttSession::restart(collaborators.stt_adapter.as_ref()).await {
                            Ok(new_stt) => stt = new_stt,
                            Err(e2) => {
                                clog_error!("call {} stt restart failed: {}", call_id, e2);
                                break EndReason::ProtocolError;
                            }
                        }
                    }
                    None => break EndReason::ProtocolError,
                }
            }

            res = async { in_flight_turn.as_mut().unwrap().await }, if in_flight_turn.is_some() => {
                in_flight_turn = None;
                if let Ok(outcome) = res {
                    if let Some(name) = outcome.identified_name {
                        record.identified_name = Some(name);
                    }
                    if let Some(purpose) = outcome.inferred_purpose {
                        record.inferred_purpose = Some(purpose);
                    }
                    if outcome.voicemail {
                        voicemail_detected = true;
                    }
                    record.push_transcript(SpeakerType::Assistant, outcome.reply.clone(), Utc::now());
                    phase = CallPhase::Speaking;
                    tts_done_rx = Some(tts.speak(outcome.reply, outbound_tx.clone()).await);
                }
                // `Err` means the turn was aborted mid-barge-in; its result is
                // already stale and the caller is back in LISTENING.
            }

            res = async { tts_done_rx.as_mut().unwrap().await }, if tts_done_rx.is_some() => {
                tts_done_rx = None;
                let _ = res;
                if matches!(phase, CallPhase::Greeting | CallPhase::Speaking) {
                    phase = CallPhase::Listening;
                    silence_sleep.as_mut().reset(tokio::time::Instant::now() + collaborators.config.silence_timeout);
                }
            }

            _ = &mut idle_sleep => break EndReason::IdleTimeout,

            _ = &mut silence_sleep, if phase == CallPhase::Listening => {
                silence_reprompts += 1;
                if silence_reprompts > MAX_SILENCE_REPROMPTS {
                    break EndReason::SilenceExhausted;
                }
                phase = CallPhase::Speaking;
                record.push_transcript(SpeakerType::Assistant, SILENCE_REPROMPT.to_string(), Utc::now());
                tts_done_rx = Some(tts.speak(SILENCE_REPROMPT.to_string(), outbound_tx.clone()).await);
            }
        }
    };

    phase = CallPhase::Ending;
    clog_info!("call {} entered ENDING ({:?})", call_id, end_reason);
    if let Some(handle) = in_flight_turn.take() {
        handle.abort();
    }
    tts.cancel().await;
    // Bounded by SHUTDOWN_GRACE: every collaborator must release its
    // resources promptly, but a slow provider teardown must never hold up
    // ENDED. `SttSession` has no such handle — dropping it below ends its
    // background task through the same audio channel closing that `close`
    // waits on for TTS.
    tts.close(collaborators.config.shutdown_grace).await;
    drop(stt);

    let caller_turns = record
        .transcript
        .iter()
        .filter(|e| e.speaker == SpeakerType::Caller)
        .count();
    record.outcome = classify_outcome(end_reason, caller_turns, voicemail_detected);
    record.ended_at = Some(Utc::now());
    persist_with_retry(&collaborators.store, &record).await;

    phase = CallPhase::Ended;
    clog_info!("call {} entered ENDED with outcome {:?}", call_id, record.outcome);
    let _ = phase;
}
