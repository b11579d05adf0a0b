//! Audio-native (realtime) model traits
//!
//! The realtime model produces audio directly, without a text intermediate
//! the runtime can intercept; see the worker crate for the post-hoc safety
//! mitigation.

use async_trait::async_trait;

use crate::error::Result;
use crate::item::ConversationItem;
use crate::llm_types::ToolCall;

/// Wrapper delivered by the realtime runtime's conversation-item signal.
/// The inner item carries role and text content.
#[derive(Debug, Clone)]
pub struct RealtimeItem {
    pub item: ConversationItem,
}

/// Lifecycle events surfaced by a realtime session.
#[derive(Debug, Clone)]
pub enum RealtimeEvent {
    ItemAdded(RealtimeItem),
    Closed,
}

/// Connection options for a realtime session.
///
/// Instructions are carried here, on the agent side of the connection; the
/// model object itself rejects an instruction argument.
#[derive(Debug, Clone)]
pub struct RealtimeOptions {
    pub room_name: String,
    pub voice: String,
    pub instructions: String,
}

/// Audio-native model boundary.
#[async_trait]
pub trait RealtimeModel: Send + Sync {
    async fn connect(&self, options: RealtimeOptions) -> Result<Box<dyn RealtimeHandle>>;
}

/// A live realtime session.
#[async_trait]
pub trait RealtimeHandle: Send + Sync {
    /// Register the conversation-item handler.
    ///
    /// The host runtime invokes handlers synchronously and rejects async
    /// callbacks; a handler that needs I/O must schedule an independent
    /// task and return immediately.
    fn on_conversation_item(&self, handler: Box<dyn Fn(RealtimeItem) + Send + Sync>);

    /// Register the tool-call handler. Same synchronous contract as
    /// [`on_conversation_item`].
    ///
    /// [`on_conversation_item`]: RealtimeHandle::on_conversation_item
    fn on_tool_call(&self, handler: Box<dyn Fn(ToolCall) + Send + Sync>);

    /// Drive the model to produce a spoken reply conditioned on `question`.
    async fn drive_reply(&self, question: &str) -> Result<()>;

    /// Resolves when the session has closed.
    async fn closed(&self);

    /// Graceful close; lets in-flight audio finish.
    async fn close(&self) -> Result<()>;
}
