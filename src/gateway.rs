//! C8 — Media Gateway Adapter.
//!
//! Grounded structurally in the reference architecture's
//! `voice::call_server::handle_connection` (accept the socket, split it
//! into independent read/write halves, drive one connection per spawned
//! task, close on every exit path) but over a different wire protocol: the
//! Twilio-style discriminated union rather than the
//! reference architecture's own `CallMessage` enum. Unlike that reference
//! loop — which owns a `TcpListener` and calls `accept_async` itself — this
//! adapter's socket arrives already upgraded by the C10 admin router's
//! `GET /media` route, so the accept/handshake step is delegated to axum's
//! `WebSocketUpgrade` extractor instead of `tokio_tungstenite::accept_async`
//! directly; everything downstream of the handshake (decode, dispatch,
//! encode, close-on-every-exit-path) is this module's own.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::orchestrator::{spawn_call, CallSession, Collaborators, GatewayEvent};
use crate::{clog_error, clog_info, clog_warn};

/// Inbound frames from the telephony provider. `#[serde(tag = "event")]`
/// dispatches on the wire's own `event` field rather than this module
/// inventing its own discriminant — the exact field names the gateway sends
/// are part of the external contract and must round-trip untouched.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum InboundFrame {
    Connected,
    Start { start: StreamStartPayload },
    Media { media: MediaPayload },
    Stop,
}

#[derive(Debug, Deserialize)]
struct StreamStartPayload {
    #[serde(rename = "streamSid")]
    stream_sid: String,
    #[serde(rename = "callSid")]
    call_sid: String,
    #[serde(default, rename = "customParameters")]
    custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    payload: String,
}

#[derive(Debug, Serialize)]
struct OutboundMediaFrame<'a> {
    event: &'static str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
    media: OutboundMediaPayload,
}

#[derive(Debug, Serialize)]
struct OutboundMediaPayload {
    payload: String,
}

/// Parsed handshake: the two gateway-assigned identifiers the rest of the
/// call needs, plus whatever custom parameter the webhook attached the
/// caller's number under (`caller_phone=<From>`). `voicemail_signaled` is
/// set when the gateway itself already believes it dialed into an
/// answering machine (`answered_by=machine*`, the same convention
/// telephony providers use on the call-status webhook) — a second,
/// independent voicemail signal from the model's own `[[voicemail]]`
/// marker is folded in later, per turn.
struct Handshake {
    stream_sid: String,
    call_sid: String,
    caller_number: Option<String>,
    voicemail_signaled: bool,
}

/// Read frames until the gateway's `start` message arrives (ignoring the
/// optional leading `connected` frame Twilio-style gateways send first).
/// Anything else arriving before `start` — a media frame, a malformed
/// payload, the socket closing — is `GatewayProtocol`: the gateway has
/// violated the handshake contract and there is no call to run yet.
async fn await_handshake(socket: &mut WebSocket) -> Result<Handshake, String> {
    loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<InboundFrame>(&text) {
                Ok(InboundFrame::Connected) => continue,
                Ok(InboundFrame::Start { start }) => {
                    let caller_number = start.custom_parameters.get("caller_phone").cloned();
                    let voicemail_signaled = start
                        .custom_parameters
                        .get("answered_by")
                        .is_some_and(|v| v.contains("machine"));
                    return Ok(Handshake {
                        stream_sid: start.stream_sid,
                        call_sid: start.call_sid,
                        caller_number,
                        voicemail_signaled,
                    });
                }
                Ok(_) => return Err("media or stop frame arrived before start".to_string()),
                Err(e) => return Err(format!("malformed handshake frame: {e}")),
            },
            Some(Ok(Message::Close(_))) | None => {
                return Err("socket closed before handshake completed".to_string())
            }
            Some(Ok(_)) => continue, // ping/pong/binary before handshake: ignore
            Some(Err(e)) => return Err(e.to_string()),
        }
    }
}

fn encode_outbound_media(stream_sid: &str, frame: &[u8]) -> String {
    let payload = BASE64.encode(frame);
    let msg = OutboundMediaFrame {
        event: "media",
        stream_sid,
        media: OutboundMediaPayload { payload },
    };
    serde_json::to_string(&msg).unwrap_or_default()
}

/// Drive one media websocket end to end: handshake, spawn the call, then
/// fan inbound media frames into the orchestrator and outbound synthesized
/// frames back out to the gateway until either side closes. The socket is
/// `close()`d on every exit path — handshake failure, a
/// malformed frame, the gateway's own `stop`, or the call ending on its own
/// all fall through to the same `socket.close()` at the bottom.
pub async fn handle_media_socket(mut socket: WebSocket, collaborators: Collaborators) {
    let handshake = match await_handshake(&mut socket).await {
        Ok(h) => h,
        Err(reason) => {
            clog_warn!("media socket handshake failed: {}", reason);
            let _ = socket.close().await;
            return;
        }
    };

    clog_info!(
        "media stream {} connected (gateway call sid {})",
        handshake.stream_sid,
        handshake.call_sid
    );

    let CallSession {
        handle,
        inbound,
        mut outbound_audio,
    } = spawn_call(
        collaborators,
        Some(handshake.call_sid.clone()),
        handshake.caller_number.clone(),
        handshake.voicemail_signaled,
    );
    let call_id = handle.call_id;

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<InboundFrame>(&text) {
                            Ok(InboundFrame::Media { media }) => {
                                match BASE64.decode(media.payload.as_bytes()) {
                                    Ok(bytes) => {
                                        if inbound.send(GatewayEvent::Media(bytes)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(e) => {
                                        clog_warn!("call {} malformed media payload, tearing down: {}", call_id, e);
                                        handle.hangup();
                                        break;
                                    }
                                }
                            }
                            Ok(InboundFrame::Stop) => {
                                let _ = inbound.send(GatewayEvent::Stop).await;
                                break;
                            }
                            Ok(InboundFrame::Connected) | Ok(InboundFrame::Start { .. }) => {
                                // A duplicate handshake frame after the stream is already
                                // live; harmless, ignore it rather than tearing the call down.
                            }
                            Err(e) => {
                                clog_warn!("call {} malformed gateway frame, tearing down: {}", call_id, e);
                                handle.hangup();
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        let _ = inbound.send(GatewayEvent::Stop).await;
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary: no telephony provider in this contract sends these
                    Some(Err(e)) => {
                        clog_error!("call {} media socket error: {}", call_id, e);
                        handle.hangup();
                        break;
                    }
                }
            }

            frame = outbound_audio.recv() => {
                match frame {
                    Some(bytes) => {
                        let msg = encode_outbound_media(&handshake.stream_sid, &bytes);
                        if socket.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    None => break, // orchestrator reached ENDED and dropped the outbound sender
                }
            }
        }
    }

    let _ = socket.close().await;
    clog_info!("call {} media socket closed", call_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_frame_start_parses_custom_parameters() {
        let json = r#"{"event":"start","start":{"streamSid":"MZ1","callSid":"CA1","customParameters":{"caller_phone":"+15551234567"}}}"#;
        let frame: InboundFrame = serde_json::from_str(json).unwrap();
        match frame {
            InboundFrame::Start { start } => {
                assert_eq!(start.stream_sid, "MZ1");
                assert_eq!(start.call_sid, "CA1");
                assert_eq!(
                    start.custom_parameters.get("caller_phone").map(String::as_str),
                    Some("+15551234567")
                );
            }
            _ => panic!("expected Start variant"),
        }
    }

    #[test]
    fn test_inbound_frame_media_decodes_base64() {
        let payload = BASE64.encode([0xFFu8; 4]);
        let json = format!(r#"{{"event":"media","media":{{"payload":"{payload}"}}}}"#);
        let frame: InboundFrame = serde_json::from_str(&json).unwrap();
        match frame {
            InboundFrame::Media { media } => {
                let decoded = BASE64.decode(media.payload.as_bytes()).unwrap();
                assert_eq!(decoded, vec![0xFF; 4]);
            }
            _ => panic!("expected Media variant"),
        }
    }

    #[test]
    fn test_inbound_frame_stop_and_connected() {
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"event":"stop"}"#).unwrap(),
            InboundFrame::Stop
        ));
        assert!(matches!(
            serde_json::from_str::<InboundFrame>(r#"{"event":"connected"}"#).unwrap(),
            InboundFrame::Connected
        ));
    }

    #[test]
    fn test_malformed_frame_is_rejected() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"event":"unknown"}"#).is_err());
        assert!(serde_json::from_str::<InboundFrame>("not json").is_err());
    }

    #[test]
    fn test_outbound_media_encodes_exact_field_names() {
        let json = encode_outbound_media("MZ1", &[0x00, 0x01]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "media");
        assert_eq!(value["streamSid"], "MZ1");
        assert!(value["media"]["payload"].is_string());
        let decoded = BASE64
            .decode(value["media"]["payload"].as_str().unwrap().as_bytes())
            .unwrap();
        assert_eq!(decoded, vec![0x00, 0x01]);
    }
}
