//! Language model trait

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::Result;
use crate::llm_types::{ChatRequest, ToolCall};

/// One event from a streaming chat completion.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// Incremental text delta.
    TextDelta(String),
    /// A complete tool invocation.
    ToolCall(ToolCall),
    /// Stream finished normally.
    Done,
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;

/// Streaming chat-completion backend with native tool calling.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream>;

    /// Model identifier for telemetry.
    fn model_id(&self) -> &str;
}
