//! Media-plane control service traits

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::traits::speech::{AudioFrame, AudioStream};

/// Typed agent-dispatch request.
///
/// Recent control-service versions accept only this typed form; loose
/// key-value arguments are rejected.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AgentDispatchRequest {
    pub agent_name: String,
    pub room: String,
    pub metadata: String,
}

/// Acknowledgement of an accepted dispatch.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct DispatchAck {
    pub dispatch_id: String,
}

/// Control-plane operations consumed by the routing controller.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn dispatch_agent(&self, request: AgentDispatchRequest) -> Result<DispatchAck>;
}

/// A room-join job handed to a registered worker.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub room_name: String,
    pub student_identity: String,
    /// Raw dispatch metadata; empty for a fresh student join.
    pub metadata: String,
}

/// Long-lived worker registration against the control service.
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    /// Register under `worker_name` and receive room-join jobs until the
    /// process shuts down.
    async fn register(&self, worker_name: &str) -> Result<mpsc::Receiver<JobRequest>>;
}

/// One joined room.
#[async_trait]
pub trait RoomHandle: Send + Sync {
    fn room_name(&self) -> &str;

    /// Publish a data packet on the room under a topic label.
    async fn publish_data(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Enqueue synthesized audio for playback to the room.
    async fn play(&self, frames: Vec<AudioFrame>) -> Result<()>;

    /// Subscribe to the student's incoming audio.
    async fn subscribe_audio(&self) -> Result<AudioStream>;

    /// Graceful close: waits for enqueued playback, never cuts mid-word.
    async fn close(&self) -> Result<()>;
}
