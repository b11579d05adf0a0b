//! Centralized operational constants
//!
//! Infrastructure values only. Agent instructions and per-subject voices
//! live with the agent definitions; service endpoints come from
//! [`crate::Settings`].

/// Registered worker names on the media-plane control service.
pub mod workers {
    /// Pipeline worker: speech-to-text -> language model -> text-to-speech.
    pub const PIPELINE_WORKER_NAME: &str = "learning-orchestrator";
    /// Realtime worker hosting the audio-native English specialist.
    pub const REALTIME_WORKER_NAME: &str = "learning-english";
}

/// Handoff timing envelope.
pub mod timing {
    use std::time::Duration;

    /// Sleep between a successful English dispatch and the graceful close of
    /// the pipeline session, tuned so the outgoing transition sentence
    /// finishes and the realtime worker's first utterance begins about half a
    /// second later.
    pub const PIPELINE_DRAIN: Duration = Duration::from_millis(3500);

    /// Delay before the realtime worker drives its first reply; the WebRTC
    /// audio path must be established or the reply plays into silence.
    pub const REALTIME_REPLY_DELAY: Duration = Duration::from_secs(3);

    /// Upper bound on the drain-and-close sequence even if the drain task
    /// is lost.
    pub const CLOSE_WATCHDOG: Duration = Duration::from_secs(30);
}

/// Telemetry attribute limits.
pub mod telemetry {
    /// Free-text span attributes (question summaries, reasons, last user
    /// message) are clipped to this many characters.
    pub const SPAN_TEXT_MAX: usize = 500;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_finishes_well_inside_watchdog() {
        assert!(timing::PIPELINE_DRAIN < timing::CLOSE_WATCHDOG);
    }
}
