//! Dual-worker runtime
//!
//! One binary, two registrations. `AGENT_TYPE=orchestrator` runs the
//! pipeline worker (`learning-orchestrator`): VAD prewarm, classifier-first
//! sessions, per-sentence safety interception. `AGENT_TYPE=english` runs the
//! realtime worker (`learning-english`): audio-native English specialist
//! with post-hoc safety checks. The two coordinate by joining the same room
//! sequentially and passing context through dispatch metadata.

pub mod http;
pub mod pipeline;
pub mod realtime;

pub use pipeline::{run_pipeline_job, PipelineDeps};
pub use realtime::{run_realtime_job, RealtimeDeps};

/// Resolves once the worker-wide shutdown flag flips. Job runners race this
/// against their session's close signal so a stopping worker drains live
/// sessions gracefully instead of cutting them off.
pub(crate) async fn shutdown_requested(shutdown: &mut tokio::sync::watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
