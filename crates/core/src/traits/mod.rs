//! Boundary traits for pluggable external services
//!
//! Every out-of-process collaborator is reached through one of these seams:
//!
//! ```text
//! Language models:
//!   - ChatModel: streaming chat completion with native tool calls
//!   - RealtimeModel: audio-native session (no text intermediate)
//!
//! Speech:
//!   - SpeechToText: room audio -> finalized transcripts
//!   - SpeechSynthesis: safe sentence text -> audio frames
//!
//! Media plane:
//!   - ControlPlane: typed agent dispatch into a named room
//!   - WorkerRegistry: long-lived worker registration and job intake
//!   - RoomHandle: one joined room (data topics, audio, graceful close)
//! ```
//!
//! Production implementations live in the `llm` and `media` crates; tests
//! install mocks.

mod llm;
mod media;
mod realtime;
mod speech;

pub use llm::{ChatEvent, ChatModel, ChatStream};
pub use media::{
    AgentDispatchRequest, ControlPlane, DispatchAck, JobRequest, RoomHandle, WorkerRegistry,
};
pub use realtime::{RealtimeEvent, RealtimeHandle, RealtimeItem, RealtimeModel, RealtimeOptions};
pub use speech::{
    AudioFrame, AudioStream, SpeechSynthesis, SpeechToText, SynthesisOptions, TranscriptFragment,
    TranscriptStream,
};
