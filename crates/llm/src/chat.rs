//! Streaming chat-completion client with native tool calls

use std::collections::BTreeMap;
use std::time::Duration;

use async_stream::try_stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;

use tutor_agent_core::{
    ChatEvent, ChatModel, ChatRequest, ChatStream, Error, Message, Result, Role, ToolCall,
};

/// Configuration for the chat backend
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl ChatClientConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            max_tokens: 1024,
            timeout: Duration::from_secs(60),
        }
    }
}

/// OpenAI-compatible `/chat/completions` backend.
pub struct OpenAiChatClient {
    config: ChatClientConfig,
    client: Client,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    index: usize,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Deserialize, Default)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::LanguageModel(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn role_name(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn body(&self, request: &ChatRequest) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.instructions,
        })];
        for Message { role, content } in &request.messages {
            messages.push(serde_json::json!({
                "role": Self::role_name(*role),
                "content": content,
            }));
        }

        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": self.config.max_tokens,
            "stream": true,
        });
        if !request.tools.is_empty() {
            body["tools"] = request
                .tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        },
                    })
                })
                .collect();
            body["tool_choice"] = serde_json::json!("auto");
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn chat_stream(&self, request: ChatRequest) -> Result<ChatStream> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(|e| Error::LanguageModel(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::LanguageModel(format!("HTTP {status}: {detail}")));
        }

        let mut bytes = response.bytes_stream();
        let stream = try_stream! {
            let mut buffer = String::new();
            // Tool-call fragments accumulate per index until the stream ends.
            let mut pending: BTreeMap<usize, (String, String)> = BTreeMap::new();
            let mut done = false;

            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| Error::LanguageModel(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(newline) = buffer.find('\n') {
                    let line = buffer[..newline].trim().to_string();
                    buffer.drain(..=newline);

                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        done = true;
                        break 'outer;
                    }

                    let parsed: StreamChunk = match serde_json::from_str(data) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping unparseable SSE chunk");
                            continue;
                        }
                    };
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                yield ChatEvent::TextDelta(content);
                            }
                        }
                        for delta in choice.delta.tool_calls.unwrap_or_default() {
                            let entry = pending.entry(delta.index).or_default();
                            if let Some(function) = delta.function {
                                if let Some(name) = function.name {
                                    entry.0.push_str(&name);
                                }
                                if let Some(arguments) = function.arguments {
                                    entry.1.push_str(&arguments);
                                }
                            }
                        }
                        if choice.finish_reason.as_deref() == Some("tool_calls") {
                            done = true;
                            break 'outer;
                        }
                    }
                }
            }

            if !done {
                tracing::debug!("chat stream ended without terminator");
            }
            for (_, (name, arguments)) in std::mem::take(&mut pending) {
                let arguments =
                    serde_json::from_str(&arguments).unwrap_or_else(|_| serde_json::json!({}));
                yield ChatEvent::ToolCall(ToolCall { name, arguments });
            }
            yield ChatEvent::Done;
        };

        Ok(Box::pin(stream))
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_instructions_and_tools() {
        let client = OpenAiChatClient::new(ChatClientConfig::new(
            "https://api.example.com/v1",
            "key",
            "gpt-4o",
        ))
        .unwrap();

        let request = ChatRequest::new("You are a tutor.")
            .with_messages(vec![Message::user("What is an adjective?")])
            .with_tools(vec![tutor_agent_core::ToolDefinition {
                name: "route_to_english".to_string(),
                description: "Route to the English tutor".to_string(),
                parameters: serde_json::json!({ "type": "object" }),
            }]);

        let body = client.body(&request);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a tutor.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["tools"][0]["function"]["name"], "route_to_english");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn tool_call_delta_accumulation() {
        let chunk: StreamChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"route_to_math","arguments":"{\"question"}}]},"finish_reason":null}]}"#,
        )
        .unwrap();
        let delta = &chunk.choices[0].delta;
        let calls = delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, 0);
        assert_eq!(
            calls[0].function.as_ref().unwrap().name.as_deref(),
            Some("route_to_math")
        );
    }
}
