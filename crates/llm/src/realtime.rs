//! Audio-native (realtime) model session over websocket
//!
//! The model speaks directly into the room; there is no text intermediate
//! for the runtime to intercept. Conversation items are surfaced through a
//! synchronous handler so callers can run their post-hoc checks.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tutor_agent_core::{
    ConversationItem, Error, ItemRole, RealtimeHandle, RealtimeItem, RealtimeModel,
    RealtimeOptions, Result, ToolCall,
};

/// Configuration for the realtime backend
#[derive(Debug, Clone)]
pub struct WsRealtimeModelConfig {
    /// Websocket endpoint, e.g. `wss://api.example.com/v1/realtime`.
    pub ws_url: String,
    pub api_key: String,
    pub model: String,
}

/// Websocket realtime model backend.
pub struct WsRealtimeModel {
    config: WsRealtimeModelConfig,
}

impl WsRealtimeModel {
    pub fn new(config: WsRealtimeModelConfig) -> Self {
        Self { config }
    }
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type ItemHandler = Box<dyn Fn(RealtimeItem) + Send + Sync>;
type ToolHandler = Box<dyn Fn(ToolCall) + Send + Sync>;

#[async_trait]
impl RealtimeModel for WsRealtimeModel {
    async fn connect(&self, options: RealtimeOptions) -> Result<Box<dyn RealtimeHandle>> {
        let url = format!("{}?model={}", self.config.ws_url, self.config.model);
        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(&url)
            .header("authorization", format!("Bearer {}", self.config.api_key))
            .header("host", host_of(&url))
            .header("upgrade", "websocket")
            .header("connection", "Upgrade")
            .header("sec-websocket-version", "13")
            .header(
                "sec-websocket-key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .map_err(|e| Error::LanguageModel(e.to_string()))?;

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::LanguageModel(e.to_string()))?;
        let (mut sink, mut source) = socket.split();

        // Instructions ride on the session update, agent side; the model
        // object itself rejects an instruction argument.
        let session_update = serde_json::json!({
            "type": "session.update",
            "session": {
                "voice": options.voice,
                "instructions": options.instructions,
                "room": options.room_name,
            },
        });
        sink.send(WsMessage::Text(session_update.to_string()))
            .await
            .map_err(|e| Error::LanguageModel(e.to_string()))?;

        let handlers: Arc<RwLock<Vec<ItemHandler>>> = Arc::new(RwLock::new(Vec::new()));
        let tool_handlers: Arc<RwLock<Vec<ToolHandler>>> = Arc::new(RwLock::new(Vec::new()));
        let (closed_tx, closed_rx) = watch::channel(false);

        let reader_handlers = handlers.clone();
        let reader_tool_handlers = tool_handlers.clone();
        tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(WsMessage::Text(raw)) => {
                        if let Some(item) = parse_item_event(&raw) {
                            let wrapped = RealtimeItem { item };
                            for handler in reader_handlers.read().iter() {
                                handler(wrapped.clone());
                            }
                        } else if let Some(call) = parse_tool_call_event(&raw) {
                            for handler in reader_tool_handlers.read().iter() {
                                handler(call.clone());
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = closed_tx.send(true);
        });

        Ok(Box::new(WsRealtimeHandle {
            sink: Mutex::new(sink),
            handlers,
            tool_handlers,
            closed: closed_rx,
        }))
    }
}

struct WsRealtimeHandle {
    sink: Mutex<WsSink>,
    handlers: Arc<RwLock<Vec<ItemHandler>>>,
    tool_handlers: Arc<RwLock<Vec<ToolHandler>>>,
    closed: watch::Receiver<bool>,
}

#[async_trait]
impl RealtimeHandle for WsRealtimeHandle {
    fn on_conversation_item(&self, handler: ItemHandler) {
        self.handlers.write().push(handler);
    }

    fn on_tool_call(&self, handler: ToolHandler) {
        self.tool_handlers.write().push(handler);
    }

    async fn drive_reply(&self, question: &str) -> Result<()> {
        let event = serde_json::json!({
            "type": "response.create",
            "response": {
                "instructions": format!(
                    "The student asked: \"{question}\". Answer them now, out loud."
                ),
            },
        });
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(event.to_string()))
            .await
            .map_err(|e| Error::LanguageModel(e.to_string()))
    }

    async fn closed(&self) {
        let mut closed = self.closed.clone();
        loop {
            if *closed.borrow() {
                return;
            }
            if closed.changed().await.is_err() {
                return;
            }
        }
    }

    async fn close(&self) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(WsMessage::Close(None))
            .await
            .map_err(|e| Error::LanguageModel(e.to_string()))
    }
}

/// Extract role and text content from a `conversation.item.created` event.
fn parse_item_event(raw: &str) -> Option<ConversationItem> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if value["type"] != "conversation.item.created" {
        return None;
    }
    let item = &value["item"];
    let role = match item["role"].as_str()? {
        "user" => ItemRole::User,
        "assistant" => ItemRole::Assistant,
        _ => return None,
    };
    let content = item["content"]
        .as_array()?
        .iter()
        .filter_map(|part| {
            part["text"]
                .as_str()
                .or_else(|| part["transcript"].as_str())
        })
        .collect::<Vec<_>>()
        .join(" ");
    if content.is_empty() {
        return None;
    }
    Some(ConversationItem { role, content })
}

/// Extract a completed tool call from a
/// `response.function_call_arguments.done` event.
fn parse_tool_call_event(raw: &str) -> Option<ToolCall> {
    let value: serde_json::Value = serde_json::from_str(raw).ok()?;
    if value["type"] != "response.function_call_arguments.done" {
        return None;
    }
    let name = value["name"].as_str()?.to_string();
    let arguments = value["arguments"]
        .as_str()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_else(|| serde_json::json!({}));
    Some(ToolCall { name, arguments })
}

fn host_of(url: &str) -> String {
    url.split("//")
        .nth(1)
        .unwrap_or(url)
        .split(['/', '?'])
        .next()
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_event_parsing() {
        let raw = serde_json::json!({
            "type": "conversation.item.created",
            "item": {
                "role": "assistant",
                "content": [
                    { "type": "audio", "transcript": "An adjective describes a noun." },
                ],
            },
        })
        .to_string();
        let item = parse_item_event(&raw).unwrap();
        assert_eq!(item.role, ItemRole::Assistant);
        assert_eq!(item.content, "An adjective describes a noun.");
    }

    #[test]
    fn non_item_events_are_ignored() {
        assert!(parse_item_event(r#"{"type":"session.updated"}"#).is_none());
        assert!(parse_item_event("not json").is_none());
    }

    #[test]
    fn tool_call_event_parsing() {
        let raw = serde_json::json!({
            "type": "response.function_call_arguments.done",
            "name": "route_back_to_orchestrator",
            "arguments": "{\"reason\":\"math question\"}",
        })
        .to_string();
        let call = parse_tool_call_event(&raw).unwrap();
        assert_eq!(call.name, "route_back_to_orchestrator");
        assert_eq!(call.str_arg("reason"), "math question");
    }
}
