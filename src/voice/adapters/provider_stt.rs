//! Network streaming STT adapter: connects once per call to a websocket
//! speech-to-text endpoint, sends raw mulaw audio frames as binary
//! messages, and reads back JSON transcript events. Connection lifecycle
//! (`connect`/`split`/spawn-per-direction) is grounded in the reference
//! architecture's `voice::call_server` handshake shape; unlike that
//! server-side accept loop, this adapter is the *client* half of a
//! websocket, dialing out to the provider instead of accepting an inbound
//! connection.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;

use crate::error::SttError;
use crate::voice::stt::{SttAdapter, SttConnection, SttEvent};

/// One transcript event as the provider's websocket emits it.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ProviderEvent {
    Partial { text: String },
    Final { text: String },
    Error { message: String },
}

pub struct ProviderSttAdapter {
    endpoint: String,
    api_key: String,
}

impl ProviderSttAdapter {
    pub fn new(endpoint: String, api_key: String) -> Self {
        ProviderSttAdapter { endpoint, api_key }
    }
}

pub struct ProviderSttConnection {
    write: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        Message,
    >,
    read: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    >,
}

#[async_trait]
impl SttConnection for ProviderSttConnection {
    async fn send_audio(&mut self, frame: &[u8]) -> Result<(), SttError> {
        self.write
            .send(Message::Binary(frame.to_vec()))
            .await
            .map_err(|e| SttError::TranscriptionUnavailable(e.to_string()))
    }

    async fn next_event(&mut self) -> Option<SttEvent> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ProviderEvent>(&text) {
                        Ok(ProviderEvent::Partial { text }) => return Some(SttEvent::Interim(text)),
                        Ok(ProviderEvent::Final { text }) => return Some(SttEvent::Final(text)),
                        Ok(ProviderEvent::Error { message }) => return Some(SttEvent::Error(message)),
                        Err(e) => return Some(SttEvent::Error(format!("malformed stt event: {e}"))),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => continue, // ping/pong/binary: no provider in this contract sends these back
                Some(Err(e)) => return Some(SttEvent::Error(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl SttAdapter for ProviderSttAdapter {
    async fn connect(&self) -> Result<Box<dyn SttConnection>, SttError> {
        let mut request = self
            .endpoint
            .clone()
            .into_client_request()
            .map_err(|e| SttError::TranscriptionUnavailable(e.to_string()))?;
        let auth_value = format!("Bearer {}", self.api_key)
            .parse()
            .map_err(|_| SttError::TranscriptionUnavailable("invalid api key header".to_string()))?;
        request.headers_mut().insert("Authorization", auth_value);

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| SttError::TranscriptionUnavailable(e.to_string()))?;
        let (write, read) = stream.split();
        Ok(Box::new(ProviderSttConnection { write, read }))
    }
}
