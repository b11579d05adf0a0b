//! Media-plane control service integration
//!
//! The media plane itself (WebRTC transport, room hosting) is an external
//! hosted service. This crate provides the pieces the runtime consumes:
//! - [`dispatch::HttpControlPlane`]: typed agent-dispatch requests
//! - [`gateway::GatewayClient`]: worker registration, job intake, and the
//!   per-room gateway connection (data topics + audio frames)
//! - [`vad::VadModel`]: the voice-activity-detection model loaded at
//!   pipeline-worker prewarm

pub mod dispatch;
pub mod gateway;
pub mod vad;

pub use dispatch::HttpControlPlane;
pub use gateway::{GatewayClient, GatewayRoom};
pub use vad::VadModel;
