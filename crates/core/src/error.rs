//! Shared error type for the tutoring agent runtime

use thiserror::Error;

/// Errors surfaced by runtime components.
///
/// External-service failures carry the upstream message as a string; the
/// caller decides between fallback and propagation (see the failure
/// semantics on each component).
#[derive(Debug, Error)]
pub enum Error {
    #[error("moderation request failed: {0}")]
    Moderation(String),

    #[error("rewrite request failed: {0}")]
    Rewrite(String),

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("speech synthesis error: {0}")]
    Synthesis(String),

    #[error("speech recognition error: {0}")]
    Transcription(String),

    #[error("media plane error: {0}")]
    MediaPlane(String),

    #[error("agent dispatch failed: {0}")]
    Dispatch(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("dispatch metadata error: {0}")]
    Metadata(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("session closed")]
    SessionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
