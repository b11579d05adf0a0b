//! Configuration management for the tutoring agent workers
//!
//! Supports loading configuration from:
//! - YAML files (config/default.yaml, config/{env}.yaml)
//! - Environment variables (TUTOR_ prefix, `__` separator)
//!
//! Worker selection is by the single `AGENT_TYPE` environment variable;
//! everything else (service URLs, keys, telemetry endpoint, logging level)
//! comes through [`Settings`].

pub mod constants;
pub mod settings;

pub use settings::{
    load_settings, ConfigError, MediaPlaneConfig, ObservabilityConfig, PersistenceConfig,
    ServiceEndpoints, Settings, VadConfig, WorkerKind,
};
