//! WebSocket client for the audio-native realtime model.

use crate::error::WorkerError;
use crate::realtime::RealtimeModel;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use schola_agents::{ConversationItemEvent, SessionShared, ToolCallRequest};
use schola_types::ConversationRole;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

const DEFAULT_MODEL: &str = "gpt-realtime";
const DEFAULT_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";
const INPUT_TRANSCRIPTION_MODEL: &str = "gpt-4o-mini-transcribe";

struct Connection {
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

/// Realtime model over the OpenAI realtime WebSocket endpoint.
///
/// The constructor deliberately takes no instructions: they belong to the
/// agent and are sent with `session.update` at start.
pub struct OpenAiRealtime {
    api_key: String,
    model: String,
    endpoint: String,
    connection: Mutex<Option<Connection>>,
}

impl OpenAiRealtime {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            connection: Mutex::new(None),
        }
    }

    pub fn from_env() -> Result<Self, WorkerError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| WorkerError::MissingCredential("OPENAI_API_KEY"))?;
        let mut model = Self::new(api_key);
        if let Ok(endpoint) = std::env::var("OPENAI_REALTIME_ENDPOINT") {
            model.endpoint = endpoint;
        }
        if let Ok(id) = std::env::var("SCHOLA_REALTIME_MODEL") {
            model.model = id;
        }
        Ok(model)
    }

    fn send(&self, connection: &Connection, event: Value) -> Result<(), WorkerError> {
        connection
            .outbound
            .send(Message::Text(event.to_string()))
            .map_err(|_| WorkerError::Realtime("realtime socket closed".to_string()))
    }
}

#[async_trait]
impl RealtimeModel for OpenAiRealtime {
    async fn start(
        &self,
        instructions: &str,
        voice: &str,
        shared: Arc<SessionShared>,
    ) -> Result<mpsc::UnboundedReceiver<ToolCallRequest>, WorkerError> {
        let url = format!("{}?model={}", self.endpoint, self.model);
        let mut request = url
            .into_client_request()
            .map_err(|e| WorkerError::Realtime(format!("bad endpoint: {e}")))?;
        let headers = request.headers_mut();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| WorkerError::Realtime(e.to_string()))?,
        );
        headers.insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| WorkerError::Realtime(format!("connect failed: {e}")))?;
        let (mut sink, mut stream) = ws.split();

        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let (tool_tx, tool_rx) = mpsc::unbounded_channel();
        let reader_shared = shared.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let text = match message {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => continue,
                };
                let Ok(event) = serde_json::from_str::<Value>(&text) else {
                    continue;
                };
                handle_server_event(&event, &reader_shared, &tool_tx);
            }
            reader_shared.aclose();
        });

        let connection = Connection {
            outbound,
            reader,
            writer,
        };
        self.send(
            &connection,
            json!({
                "type": "session.update",
                "session": {
                    "voice": voice,
                    "instructions": instructions,
                    "modalities": ["audio", "text"],
                    "input_audio_transcription": { "model": INPUT_TRANSCRIPTION_MODEL },
                    "turn_detection": { "type": "server_vad" },
                },
            }),
        )?;

        *self.connection.lock().await = Some(connection);
        Ok(tool_rx)
    }

    async fn generate_reply(&self, user_input: Option<&str>) -> Result<(), WorkerError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .ok_or_else(|| WorkerError::Realtime("realtime session not started".to_string()))?;
        if let Some(text) = user_input {
            self.send(
                connection,
                json!({
                    "type": "conversation.item.create",
                    "item": {
                        "type": "message",
                        "role": "user",
                        "content": [{ "type": "input_text", "text": text }],
                    },
                }),
            )?;
        }
        self.send(
            connection,
            json!({
                "type": "response.create",
                "response": { "modalities": ["audio", "text"] },
            }),
        )
    }

    async fn aclose(&self) {
        if let Some(connection) = self.connection.lock().await.take() {
            let _ = connection.outbound.send(Message::Close(None));
            connection.writer.abort();
            connection.reader.abort();
        }
    }
}

/// Decodes one server event into an item signal or a tool call.
fn handle_server_event(
    event: &Value,
    shared: &Arc<SessionShared>,
    tool_tx: &mpsc::UnboundedSender<ToolCallRequest>,
) {
    let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
    match event_type {
        // Assistant speech, transcribed alongside the native audio.
        "response.audio_transcript.done" => {
            if let Some(transcript) = event.get("transcript").and_then(Value::as_str) {
                shared.signals.emit_conversation_item(&ConversationItemEvent {
                    role: ConversationRole::Assistant,
                    content: transcript.to_string(),
                    speaker: None,
                });
            }
        }
        // The student's utterance, transcribed server-side.
        "conversation.item.input_audio_transcription.completed" => {
            if let Some(transcript) = event.get("transcript").and_then(Value::as_str) {
                shared.signals.emit_conversation_item(&ConversationItemEvent {
                    role: ConversationRole::User,
                    content: transcript.to_string(),
                    speaker: None,
                });
            }
        }
        "response.function_call_arguments.done" => {
            let name = event
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = event
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(Value::Null);
            let _ = tool_tx.send(ToolCallRequest { name, arguments });
        }
        "error" => {
            let message = event
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            tracing::error!(message, "realtime server error");
        }
        _ => {}
    }
}
