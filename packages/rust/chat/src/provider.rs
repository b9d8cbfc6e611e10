//! Completion provider boundary.

use std::pin::Pin;

use futures::Stream;

use sitechat_shared::{ProviderConfig, Result, Turn};

#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::openai::OpenAiProvider;

/// Incremental text fragments from a provider. Errors after the stream has
/// been handed out are [`sitechat_shared::SiteChatError::StreamInterrupted`].
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Fixed generation settings applied to every request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            model: "gpt-4o".into(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

impl From<&ProviderConfig> for CompletionParams {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A streaming chat-completion service.
pub trait CompletionProvider: Send + Sync {
    /// Start a completion over `turns`.
    ///
    /// Fails with [`sitechat_shared::SiteChatError::Provider`] when the request
    /// is rejected before any output is produced.
    fn stream_chat(
        &self,
        turns: &[Turn],
        params: &CompletionParams,
    ) -> impl Future<Output = Result<FragmentStream>> + Send;

    fn name(&self) -> &'static str;
}

/// Provider selected at runtime.
#[derive(Debug, Clone)]
pub enum AnyProvider {
    OpenAi(OpenAiProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl AnyProvider {
    /// OpenAI-compatible provider built from runtime configuration.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        OpenAiProvider::from_config(config).map(Self::OpenAi)
    }
}

impl CompletionProvider for AnyProvider {
    async fn stream_chat(&self, turns: &[Turn], params: &CompletionParams) -> Result<FragmentStream> {
        match self {
            Self::OpenAi(p) => p.stream_chat(turns, params).await,
            #[cfg(feature = "mock")]
            Self::Mock(p) => p.stream_chat(turns, params).await,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::OpenAi(p) => p.name(),
            #[cfg(feature = "mock")]
            Self::Mock(p) => p.name(),
        }
    }
}
