//! Voice-activity-detection model prewarm
//!
//! The pipeline worker loads the VAD model once at prewarm and hands it to
//! every session it accepts. The load is asynchronous and must be awaited;
//! turn detection itself runs inside the media plane's audio path.

use bytes::Bytes;

use tutor_agent_config::VadConfig;
use tutor_agent_core::{Error, Result};

/// Loaded VAD model weights.
#[derive(Debug, Clone)]
pub struct VadModel {
    path: String,
    weights: Bytes,
}

impl VadModel {
    /// Read the model from disk. Await this at prewarm; sessions must never
    /// pay the load on their first audio frame.
    pub async fn load(config: &VadConfig) -> Result<Self> {
        let weights = tokio::fs::read(&config.model_path)
            .await
            .map_err(|e| {
                Error::Config(format!(
                    "failed to load VAD model from {}: {e}",
                    config.model_path
                ))
            })?;
        if weights.is_empty() {
            return Err(Error::Config(format!(
                "VAD model at {} is empty",
                config.model_path
            )));
        }
        tracing::info!(
            path = %config.model_path,
            bytes = weights.len(),
            "VAD model loaded"
        );
        Ok(Self {
            path: config.model_path.clone(),
            weights: Bytes::from(weights),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn weights(&self) -> &Bytes {
        &self.weights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_reads_model_bytes() {
        let path = std::env::temp_dir().join("tutor-agent-vad-test.onnx");
        tokio::fs::write(&path, b"model-bytes").await.unwrap();

        let config = VadConfig {
            model_path: path.to_string_lossy().into_owned(),
        };
        let model = VadModel::load(&config).await.unwrap();
        assert_eq!(model.weights().as_ref(), b"model-bytes");

        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn missing_model_is_a_config_error() {
        let config = VadConfig {
            model_path: "/nonexistent/vad.onnx".to_string(),
        };
        assert!(VadModel::load(&config).await.is_err());
    }
}
