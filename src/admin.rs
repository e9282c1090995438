//! C10 — Admin I/O Surface.
//!
//! The HTTP edge of the system: the telephony webhooks the gateway calls
//! into, the websocket upgrade that hands a live call off to [`crate::gateway`],
//! and the pull-URL the synthesized-audio cache is served from. Grounded in
//! the reference architecture's own `axum::Router` + `TraceLayer` composition
//! (`api::server::build_router`) — same middleware stack, same
//! `Router::with_state` sharing pattern — over a different route table: the
//! reference server exposes a REST CRUD surface, this one exposes exactly
//! the four endpoints a telephony provider and its own media stream need.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::cache::AudioArtifactCache;
use crate::gateway::handle_media_socket;
use crate::model::CallOutcome;
use crate::orchestrator::Collaborators;
use crate::storage::ReceptionStore;
use crate::{clog_info, clog_warn};

/// Everything every route handler needs, shared via `axum::extract::State`
/// the way the reference architecture's `AppState` is threaded through its
/// own router.
#[derive(Clone)]
pub struct AppState {
    pub collaborators: Collaborators,
    pub audio_cache: Arc<AudioArtifactCache>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/incoming-call", post(incoming_call))
        .route("/media", get(media_upgrade))
        .route("/call-status", post(call_status))
        .route("/audio/:id", get(audio_pull))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Form body the telephony provider posts when a call first connects.
#[derive(Debug, Deserialize)]
struct IncomingCallForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "From")]
    from: Option<String>,
}

/// Answer the inbound-call webhook with markup that opens a bidirectional
/// media stream back to this process's own `/media` route, attaching the
/// caller's number as a custom parameter (`caller_phone=<From>`) since
/// the gateway's `start` frame is the only place that value can travel to
/// [`crate::gateway::handle_media_socket`].
async fn incoming_call(
    State(state): State<AppState>,
    Form(form): Form<IncomingCallForm>,
) -> Response {
    clog_info!(
        "incoming call webhook: sid={} from={:?}",
        form.call_sid,
        form.from
    );

    let media_url = format!(
        "{}/media",
        state
            .collaborators
            .config
            .public_base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1)
    );

    let caller_param = form
        .from
        .as_deref()
        .map(|from| format!(r#"<Parameter name="caller_phone" value="{}"/>"#, escape_xml(from)))
        .unwrap_or_default();

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect><Stream url="{}">{}</Stream></Connect></Response>"#,
        escape_xml(&media_url),
        caller_param
    );

    ([("content-type", "application/xml")], xml).into_response()
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Upgrade to the media websocket and hand the connection to [`crate::gateway`].
/// The handshake itself (reading the gateway's own `start` frame) happens
/// inside `handle_media_socket`, not here — this route's only job is the
/// HTTP-to-websocket upgrade axum owns.
async fn media_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    let collaborators = state.collaborators.clone();
    ws.on_upgrade(move |socket| handle_media_socket(socket, collaborators))
}

/// Form body the telephony provider posts on call status changes.
#[derive(Debug, Deserialize)]
struct CallStatusForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "CallStatus")]
    call_status: String,
}

/// Correlate against the stored call record by the gateway's own identifier
/// (never our internal `Uuid`, which the webhook has no notion of) and
/// reconcile its outcome if the provider reports the call ended before our
/// own state machine observed that and persisted first. Most of the time
/// this webhook arrives after `run_call` has already finalized the record,
/// in which case this is a no-op confirmation rather than a correction.
async fn call_status(State(state): State<AppState>, Form(form): Form<CallStatusForm>) -> Response {
    clog_info!(
        "call status webhook: sid={} status={}",
        form.call_sid,
        form.call_status
    );

    let store = &state.collaborators.store;
    let record = match store.find_call_by_gateway_sid(&form.call_sid).await {
        Ok(Some(r)) => r,
        Ok(None) => {
            clog_warn!(
                "call-status webhook for unknown gateway sid {}",
                form.call_sid
            );
            return StatusCode::OK.into_response();
        }
        Err(e) => {
            clog_warn!("call-status lookup failed for sid {}: {}", form.call_sid, e);
            return StatusCode::OK.into_response();
        }
    };

    if record.ended_at.is_some() {
        return StatusCode::OK.into_response();
    }

    if matches!(form.call_status.as_str(), "completed" | "no-answer" | "busy" | "failed" | "canceled") {
        let mut record = record;
        record.ended_at = Some(chrono::Utc::now());
        record.outcome = match form.call_status.as_str() {
            "no-answer" | "busy" | "failed" | "canceled" => CallOutcome::Missed,
            _ => CallOutcome::Connected,
        };
        if let Err(e) = store.upsert_call(&record).await {
            clog_warn!("call-status reconciliation failed to persist: {}", e);
        }
    }

    StatusCode::OK.into_response()
}

/// Serve a previously synthesized audio artifact by its opaque cache id.
/// `404` on a miss or an expired entry — there is no fallback
/// resynthesis on this path, only [`AudioArtifactCache::get_or_synthesize`]
/// (called from within a call, never from this route) populates the cache.
async fn audio_pull(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.audio_cache.get(&id) {
        Some(blob) => ([("content-type", "audio/basic")], (*blob).clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_xml_handles_reserved_characters() {
        assert_eq!(escape_xml(r#"<a & "b">"#), "&lt;a &amp; &quot;b&quot;&gt;");
    }

    #[test]
    fn test_incoming_call_form_parses_expected_fields() {
        let body = "CallSid=CA123&From=%2B15551234567&To=%2B15557654321&CallStatus=ringing";
        let parsed: IncomingCallForm = serde_urlencoded::from_str(body).unwrap();
        assert_eq!(parsed.call_sid, "CA123");
        assert_eq!(parsed.from.as_deref(), Some("+15551234567"));
    }

    #[test]
    fn test_call_status_form_parses_expected_fields() {
        let body = "CallSid=CA123&CallStatus=completed&CallDuration=42";
        let parsed: CallStatusForm = serde_urlencoded::from_str(body).unwrap();
        assert_eq!(parsed.call_sid, "CA123");
        assert_eq!(parsed.call_status, "completed");
    }
}
