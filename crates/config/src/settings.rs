//! Main settings module

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which worker this process registers as.
///
/// Selected by the `AGENT_TYPE` environment variable. An unknown value is a
/// startup contract mismatch: the worker refuses to serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    /// Pipeline worker hosting the classifier and text-path specialists.
    #[default]
    Orchestrator,
    /// Realtime worker hosting the audio-native English specialist.
    English,
}

impl WorkerKind {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("AGENT_TYPE").unwrap_or_else(|_| "orchestrator".to_string());
        match raw.trim().to_ascii_lowercase().as_str() {
            "orchestrator" => Ok(WorkerKind::Orchestrator),
            "english" => Ok(WorkerKind::English),
            other => Err(ConfigError::Invalid(format!(
                "AGENT_TYPE must be 'orchestrator' or 'english', got '{other}'"
            ))),
        }
    }

    /// Registered name on the media-plane control service.
    pub fn worker_name(&self) -> &'static str {
        match self {
            WorkerKind::Orchestrator => crate::constants::workers::PIPELINE_WORKER_NAME,
            WorkerKind::English => crate::constants::workers::REALTIME_WORKER_NAME,
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Media-plane control service connection.
    #[serde(default)]
    pub media: MediaPlaneConfig,

    /// External inference/speech/moderation services.
    #[serde(default)]
    pub services: ServiceEndpoints,

    /// Transcript and audit persistence.
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Logging and tracing.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Voice-activity-detection prewarm.
    #[serde(default)]
    pub vad: VadConfig,

    /// Port for the worker's health/metrics listener.
    #[serde(default = "default_health_port")]
    pub health_port: u16,
}

fn default_health_port() -> u16 {
    8081
}

/// Media-plane control service connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaPlaneConfig {
    /// Control API base (dispatch, room admin).
    #[serde(default = "default_control_url")]
    pub control_url: String,
    /// Agent gateway (worker registration, room join) — ws:// or wss://.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
}

fn default_control_url() -> String {
    "http://127.0.0.1:7880".to_string()
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:7880/agent".to_string()
}

impl Default for MediaPlaneConfig {
    fn default() -> Self {
        Self {
            control_url: default_control_url(),
            gateway_url: default_gateway_url(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

/// External service endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoints {
    /// OpenAI-compatible API base used for chat, moderation, rewriting,
    /// and speech synthesis.
    #[serde(default = "default_inference_url")]
    pub inference_url: String,
    #[serde(default)]
    pub inference_api_key: String,

    /// Websocket endpoint for streaming speech recognition.
    #[serde(default = "default_stt_ws_url")]
    pub stt_ws_url: String,
    /// Websocket endpoint for the audio-native model.
    #[serde(default = "default_realtime_ws_url")]
    pub realtime_ws_url: String,

    /// Chat model for the classifier and text-path specialists.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    /// Small model used for age-appropriate rewrites.
    #[serde(default = "default_rewriter_model")]
    pub rewriter_model: String,
    /// Audio-native model for the realtime English specialist.
    #[serde(default = "default_realtime_model")]
    pub realtime_model: String,
    /// Moderation model over the fixed 13-category vocabulary.
    #[serde(default = "default_moderation_model")]
    pub moderation_model: String,
    /// Synthesis model for the text-path agents.
    #[serde(default = "default_tts_model")]
    pub tts_model: String,
}

fn default_inference_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_stt_ws_url() -> String {
    "wss://api.openai.com/v1/realtime?intent=transcription".to_string()
}

fn default_realtime_ws_url() -> String {
    "wss://api.openai.com/v1/realtime".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_rewriter_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_realtime_model() -> String {
    "gpt-4o-realtime-preview".to_string()
}

fn default_moderation_model() -> String {
    "omni-moderation-latest".to_string()
}

fn default_tts_model() -> String {
    "gpt-4o-mini-tts".to_string()
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            inference_url: default_inference_url(),
            inference_api_key: String::new(),
            stt_ws_url: default_stt_ws_url(),
            realtime_ws_url: default_realtime_ws_url(),
            chat_model: default_chat_model(),
            rewriter_model: default_rewriter_model(),
            realtime_model: default_realtime_model(),
            moderation_model: default_moderation_model(),
            tts_model: default_tts_model(),
        }
    }
}

/// Persistence configuration (relational store behind a REST surface with
/// row-level access control; the service key bypasses RLS)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Disabled persists nothing; sessions still run.
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_store_url")]
    pub rest_url: String,
    #[serde(default)]
    pub service_key: String,
}

fn default_true() -> bool {
    true
}

fn default_store_url() -> String {
    "http://127.0.0.1:54321/rest/v1".to_string()
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rest_url: default_store_url(),
            service_key: String::new(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_json: bool,
    /// Full OTLP/HTTP traces URL, e.g.
    /// `https://telemetry.example.com/api/public/otel/v1/traces`.
    /// The backend does not accept gRPC.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default)]
    pub otlp_auth_header: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_json: false,
            otlp_endpoint: None,
            otlp_auth_header: None,
        }
    }
}

/// Voice-activity-detection prewarm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    #[serde(default = "default_vad_path")]
    pub model_path: String,
}

fn default_vad_path() -> String {
    "models/silero_vad.onnx".to_string()
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            model_path: default_vad_path(),
        }
    }
}

impl Settings {
    /// Validate settings for the selected worker kind.
    ///
    /// Missing required endpoints are a startup contract mismatch.
    pub fn validate(&self, kind: WorkerKind) -> Result<(), ConfigError> {
        if self.media.control_url.is_empty() {
            return Err(ConfigError::Invalid(
                "media.control_url is required".to_string(),
            ));
        }
        if self.media.gateway_url.is_empty() {
            return Err(ConfigError::Invalid(
                "media.gateway_url is required".to_string(),
            ));
        }
        if self.services.inference_url.is_empty() {
            return Err(ConfigError::Invalid(
                "services.inference_url is required".to_string(),
            ));
        }
        if kind == WorkerKind::English && self.services.realtime_model.is_empty() {
            return Err(ConfigError::Invalid(
                "services.realtime_model is required for the english worker".to_string(),
            ));
        }
        if self.persistence.enabled && self.persistence.rest_url.is_empty() {
            return Err(ConfigError::Invalid(
                "persistence.rest_url is required when persistence is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load settings from files and environment.
///
/// Priority: env vars > config/{env}.yaml > config/default.yaml > defaults.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = Config::builder();

    builder = builder.add_source(File::with_name("config/default").required(false));

    if let Some(env_name) = env {
        builder =
            builder.add_source(File::with_name(&format!("config/{}", env_name)).required(false));
    }

    builder = builder.add_source(
        Environment::with_prefix("TUTOR")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;
    let settings: Settings = config.try_deserialize()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_validate_for_orchestrator() {
        let settings = Settings::default();
        assert!(settings.validate(WorkerKind::Orchestrator).is_ok());
    }

    #[test]
    fn missing_control_url_is_fatal() {
        let mut settings = Settings::default();
        settings.media.control_url.clear();
        assert!(settings.validate(WorkerKind::Orchestrator).is_err());
    }

    #[test]
    fn english_worker_requires_realtime_model() {
        let mut settings = Settings::default();
        settings.services.realtime_model.clear();
        assert!(settings.validate(WorkerKind::Orchestrator).is_ok());
        assert!(settings.validate(WorkerKind::English).is_err());
    }

    #[test]
    fn worker_names_match_registration_contract() {
        assert_eq!(
            WorkerKind::Orchestrator.worker_name(),
            "learning-orchestrator"
        );
        assert_eq!(WorkerKind::English.worker_name(), "learning-english");
    }
}
