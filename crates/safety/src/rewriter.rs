//! Age-appropriate rewrite client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use tutor_agent_core::{Error, Result};

/// Fixed system directive for the rewriter model.
pub const REWRITE_DIRECTIVE: &str = "You rewrite text so it is appropriate for students aged 8 to 16. \
Use simple vocabulary and a warm, encouraging tone. Keep the educational \
content if there is any. Never mention that the text was changed and never \
mention the original problem with it. Reply with the rewritten text only.";

/// Spoken when the rewriter itself fails; conservative and always safe.
pub const FALLBACK_SENTENCE: &str =
    "Let's talk about something else. What would you like to learn about today?";

/// Rewriter boundary.
#[async_trait]
pub trait RewriteApi: Send + Sync {
    async fn rewrite(&self, text: &str) -> Result<String>;
}

/// HTTP client driving a small chat model with the fixed directive.
pub struct HttpRewriteClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl HttpRewriteClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl RewriteApi for HttpRewriteClient {
    async fn rewrite(&self, text: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "model": self.model,
                "temperature": 0.2,
                "messages": [
                    { "role": "system", "content": REWRITE_DIRECTIVE },
                    { "role": "user", "content": text },
                ],
            }))
            .send()
            .await
            .map_err(|e| Error::Rewrite(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Rewrite(format!(
                "rewriter endpoint returned {}",
                response.status()
            )));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| Error::Rewrite(e.to_string()))?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Rewrite("empty rewrite response".to_string()))
    }
}
