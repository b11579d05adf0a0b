//! Typed agent dispatch against the control API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use tutor_agent_config::MediaPlaneConfig;
use tutor_agent_core::{AgentDispatchRequest, ControlPlane, DispatchAck, Error, Result};

/// HTTP client for the control service's agent-dispatch operation.
///
/// The request body is the typed [`AgentDispatchRequest`] object; recent
/// control-service versions reject loose key-value arguments.
pub struct HttpControlPlane {
    client: Client,
    control_url: String,
    api_key: String,
    api_secret: String,
}

impl HttpControlPlane {
    pub fn new(config: &MediaPlaneConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            control_url: config.control_url.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn dispatch_agent(&self, request: AgentDispatchRequest) -> Result<DispatchAck> {
        let url = format!(
            "{}/v1/agent-dispatch",
            self.control_url.trim_end_matches('/')
        );
        tracing::info!(
            agent_name = %request.agent_name,
            room = %request.room,
            "dispatching agent to room"
        );
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.api_key, Some(&self.api_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Dispatch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Dispatch(format!("HTTP {status}: {detail}")));
        }

        response
            .json::<DispatchAck>()
            .await
            .map_err(|e| Error::Dispatch(e.to_string()))
    }
}
