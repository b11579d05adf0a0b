//! Core traits and types for the tutoring agent runtime
//!
//! This crate provides foundational types used across all other crates:
//! - Subject and speaker vocabulary for the tutoring room
//! - Per-room session state carried across agent handoffs
//! - Conversation items and the transcript data-channel event
//! - The dispatch-metadata codec shared by both workers
//! - Chat/tool types for language-model integration
//! - Boundary traits for pluggable external services
//! - Error types

pub mod error;
pub mod item;
pub mod llm_types;
pub mod metadata;
pub mod session;
pub mod subject;
pub mod traits;

pub use error::{Error, Result};
pub use item::{ConversationItem, ItemRole, TranscriptEvent, TRANSCRIPT_TOPIC};
pub use llm_types::{ChatRequest, Message, Role, ToolCall, ToolDefinition};
pub use metadata::DispatchMetadata;
pub use session::{SessionState, SharedSession};
pub use subject::{Speaker, Subject};

pub use traits::{
    AgentDispatchRequest,
    AudioFrame,
    AudioStream,
    ChatEvent,
    // Language model
    ChatModel,
    ChatStream,
    // Media plane
    ControlPlane,
    DispatchAck,
    JobRequest,
    RealtimeEvent,
    RealtimeHandle,
    RealtimeItem,
    // Realtime
    RealtimeModel,
    RealtimeOptions,
    RoomHandle,
    // Speech
    SpeechSynthesis,
    SpeechToText,
    SynthesisOptions,
    TranscriptFragment,
    TranscriptStream,
    WorkerRegistry,
};
