//! Network streaming TTS adapter: dials a websocket speech-synthesis
//! endpoint per utterance, sends the text to speak as one JSON request
//! frame, and relays binary audio frames back to the caller as they
//! arrive. Grounded in the same client-side websocket shape as
//! [`super::provider_stt`]; a dedicated connection per [`synthesize`] call
//! rather than a long-lived one, since TTS requests in this system are
//! one-shot (a whole reply at a time), not a continuous stream the way STT
//! audio is.
//!
//! [`synthesize`]: ProviderTtsConnection::synthesize

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::error::TtsError;
use crate::voice::tts::{TtsAdapter, TtsConnection};

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    voice: &'a str,
}

pub struct ProviderTtsAdapter {
    endpoint: String,
    api_key: String,
    voice: String,
}

impl ProviderTtsAdapter {
    pub fn new(endpoint: String, api_key: String, voice: String) -> Self {
        ProviderTtsAdapter {
            endpoint,
            api_key,
            voice,
        }
    }
}

pub struct ProviderTtsConnection {
    endpoint: String,
    api_key: String,
    voice: String,
}

#[async_trait]
impl TtsConnection for ProviderTtsConnection {
    async fn synthesize(
        &mut self,
        text: &str,
        audio_tx: mpsc::Sender<Vec<u8>>,
        cancel_rx: &mut oneshot::Receiver<()>,
    ) -> Result<(), TtsError> {
        let mut request = self
            .endpoint
            .clone()
            .into_client_request()
            .map_err(|e| TtsError::SynthesisUnavailable(e.to_string()))?;
        let auth_value = format!("Bearer {}", self.api_key)
            .parse()
            .map_err(|_| TtsError::SynthesisUnavailable("invalid api key header".to_string()))?;
        request.headers_mut().insert("Authorization", auth_value);

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TtsError::SynthesisUnavailable(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let body = serde_json::to_string(&SynthesizeRequest {
            text,
            voice: &self.voice,
        })
        .map_err(|e| TtsError::SynthesisUnavailable(e.to_string()))?;
        write
            .send(Message::Text(body))
            .await
            .map_err(|e| TtsError::SynthesisUnavailable(e.to_string()))?;

        loop {
            tokio::select! {
                _ = &mut *cancel_rx => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                frame = read.next() => {
                    match frame {
                        Some(Ok(Message::Binary(bytes))) => {
                            if audio_tx.send(bytes).await.is_err() {
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Text(text))) if text.contains("\"done\"") => return Ok(()),
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(TtsError::SynthesisUnavailable(e.to_string())),
                    }
                }
            }
        }
    }
}

#[async_trait]
impl TtsAdapter for ProviderTtsAdapter {
    async fn connect(&self) -> Result<Box<dyn TtsConnection>, TtsError> {
        Ok(Box::new(ProviderTtsConnection {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            voice: self.voice.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesize_request_serializes_expected_fields() {
        let body = serde_json::to_string(&SynthesizeRequest {
            text: "hello caller",
            voice: "default",
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["text"], "hello caller");
        assert_eq!(value["voice"], "default");
    }
}
