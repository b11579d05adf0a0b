//! Language-model integration
//!
//! Two backends against the same OpenAI-compatible API surface:
//! - [`chat::OpenAiChatClient`]: streaming chat completions with native
//!   tool calls, used by the classifier and text-path specialists.
//! - [`realtime::WsRealtimeModel`]: the audio-native session used by the
//!   realtime English worker.

pub mod chat;
pub mod realtime;
pub mod speech;

pub use chat::{ChatClientConfig, OpenAiChatClient};
pub use realtime::{WsRealtimeModel, WsRealtimeModelConfig};
pub use speech::{HttpSpeechSynthesis, WsSpeechToText};
