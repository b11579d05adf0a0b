//! Speech recognition and synthesis traits

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::error::Result;

/// A chunk of PCM audio moving through the pipeline.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub data: Bytes,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(data: impl Into<Bytes>, sample_rate: u32) -> Self {
        Self {
            data: data.into(),
            sample_rate,
        }
    }
}

pub type AudioStream = Pin<Box<dyn Stream<Item = AudioFrame> + Send>>;

/// A (possibly interim) recognition result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptFragment {
    pub text: String,
    /// Final fragments commit a user turn; interim ones do not.
    pub is_final: bool,
}

pub type TranscriptStream = Pin<Box<dyn Stream<Item = Result<TranscriptFragment>> + Send>>;

/// Speech-to-text boundary.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: AudioStream) -> Result<TranscriptStream>;
}

/// Per-sentence synthesis settings.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub voice: String,
    pub speed: f32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            voice: "alloy".to_string(),
            speed: 1.0,
        }
    }
}

/// Text-to-speech boundary. Receives only guardrail-approved text.
#[async_trait]
pub trait SpeechSynthesis: Send + Sync {
    async fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Vec<AudioFrame>>;
}
