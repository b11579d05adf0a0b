//! Speech service clients
//!
//! Synthesis goes over plain HTTP (one request per guardrail-approved
//! sentence). Recognition is a websocket: audio frames up, transcript
//! fragments down, with the service's server-side VAD deciding finality.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use tutor_agent_core::{
    AudioFrame, AudioStream, Error, Result, SpeechSynthesis, SpeechToText, SynthesisOptions,
    TranscriptFragment, TranscriptStream,
};

/// HTTP text-to-speech client (`/audio/speech`).
pub struct HttpSpeechSynthesis {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    /// Output sample rate of the synthesis endpoint.
    sample_rate: u32,
}

impl HttpSpeechSynthesis {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            sample_rate: 24_000,
        }
    }
}

#[async_trait]
impl SpeechSynthesis for HttpSpeechSynthesis {
    async fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Vec<AudioFrame>> {
        let url = format!("{}/audio/speech", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "voice": options.voice,
                "speed": options.speed,
                "input": text,
                "response_format": "pcm",
            }))
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Synthesis(format!(
                "synthesis endpoint returned {}",
                response.status()
            )));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;
        Ok(vec![AudioFrame::new(audio, self.sample_rate)])
    }
}

/// Websocket speech-to-text client.
pub struct WsSpeechToText {
    ws_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct SttMessage {
    #[serde(default)]
    text: String,
    #[serde(default)]
    is_final: bool,
}

impl WsSpeechToText {
    pub fn new(ws_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl SpeechToText for WsSpeechToText {
    async fn transcribe(&self, mut audio: AudioStream) -> Result<TranscriptStream> {
        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(&self.ws_url)
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("host", host_of(&self.ws_url))
            .header("upgrade", "websocket")
            .header("connection", "Upgrade")
            .header("sec-websocket-version", "13")
            .header(
                "sec-websocket-key",
                tokio_tungstenite::tungstenite::handshake::client::generate_key(),
            )
            .body(())
            .map_err(|e| Error::Transcription(e.to_string()))?;

        let (socket, _) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| Error::Transcription(e.to_string()))?;
        let (mut sink, mut source) = socket.split();

        // Uplink: pump audio frames until the room audio ends.
        tokio::spawn(async move {
            while let Some(frame) = audio.next().await {
                if sink
                    .send(WsMessage::Binary(frame.data.to_vec()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            let _ = sink.send(WsMessage::Close(None)).await;
        });

        let stream = async_stream::stream! {
            while let Some(message) = source.next().await {
                match message {
                    Ok(WsMessage::Text(raw)) => {
                        match serde_json::from_str::<SttMessage>(&raw) {
                            Ok(msg) if !msg.text.is_empty() => {
                                yield Ok(TranscriptFragment {
                                    text: msg.text,
                                    is_final: msg.is_final,
                                });
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::debug!(error = %e, "unparseable transcript message");
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        yield Err(Error::Transcription(e.to_string()));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

fn host_of(url: &str) -> String {
    url.split("//")
        .nth(1)
        .unwrap_or(url)
        .split('/')
        .next()
        .unwrap_or(url)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_extraction() {
        assert_eq!(host_of("wss://stt.example.com/v1/listen"), "stt.example.com");
        assert_eq!(host_of("ws://127.0.0.1:9000"), "127.0.0.1:9000");
    }

    #[test]
    fn stt_message_defaults() {
        let msg: SttMessage = serde_json::from_str(r#"{"text":"hello"}"#).unwrap();
        assert_eq!(msg.text, "hello");
        assert!(!msg.is_final);
    }
}
