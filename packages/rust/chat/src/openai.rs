//! OpenAI-compatible streaming chat-completions client.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error};

use sitechat_shared::{ProviderConfig, Result, SiteChatError, Turn};

use crate::provider::{CompletionParams, CompletionProvider, FragmentStream};
use crate::sse::openai_sse_to_stream;

#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenAiProvider {
    pub fn new(api_key: String, mut base_url: String, connect_timeout: Duration) -> Result<Self> {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| SiteChatError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key,
            base_url,
        })
    }

    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        Self::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.connect_timeout,
        )
    }
}

impl CompletionProvider for OpenAiProvider {
    async fn stream_chat(&self, turns: &[Turn], params: &CompletionParams) -> Result<FragmentStream> {
        let messages: Vec<ApiMessage<'_>> = turns
            .iter()
            .map(|turn| ApiMessage {
                role: turn.role.as_str(),
                content: &turn.content,
            })
            .collect();

        let body = ChatRequest {
            model: &params.model,
            messages: &messages,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
            stream: true,
        };

        debug!(model = %params.model, turns = turns.len(), "sending completion request");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| SiteChatError::Provider(format!("completion request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(%status, body = %text, "completion request rejected");
            return Err(SiteChatError::Provider(format!(
                "completion request failed (status {status}): {text}"
            )));
        }

        Ok(openai_sse_to_stream(response))
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}
