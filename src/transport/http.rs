//! OpenAI-compatible chat completions transport.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{ModelTransport, TransportError};

/// Connection settings for [`HttpTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTransportConfig {
    /// Full chat completions URL.
    pub endpoint: String,
    /// Bearer token. Empty means no Authorization header.
    pub api_key: String,
}

/// Chat completions client. Construct once per process and share it.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Pull the first choice's text out of a chat completions body.
fn extract_text(body: &str) -> Result<String, TransportError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        TransportError::invalid_response(format!("Failed to parse response: {}", e))
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| TransportError::invalid_response("No choices in response"))
}

#[async_trait]
impl ModelTransport for HttpTransport {
    async fn invoke(
        &self,
        system_directive: &str,
        user_content: &str,
        model_id: &str,
    ) -> Result<String, TransportError> {
        let request = ChatRequest {
            model: model_id,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_directive,
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
        };

        let mut builder = self.client.post(&self.config.endpoint).json(&request);
        if !self.config.api_key.is_empty() {
            builder = builder.bearer_auth(&self.config.api_key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::timeout(format!("Request timeout: {}", e))
            } else if e.is_connect() {
                TransportError::network(format!("Connection failed: {}", e))
            } else {
                TransportError::network(format!("Request failed: {}", e))
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::network(format!("Failed to read body: {}", e)))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "model provider returned an error status");
            return Err(TransportError::from_status(status.as_u16(), body));
        }

        extract_text(&body)
    }
}
