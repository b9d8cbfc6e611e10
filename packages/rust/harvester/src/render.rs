//! Render provider capability: launch an engine, open isolated contexts,
//! navigate and serialize the rendered DOM.
//!
//! The harvester only talks to these traits, so any browser-automation backend
//! can be plugged in. [`AnyEngine`] dispatches to the built-in backends.

use url::Url;

use sitechat_shared::{EngineKind, HarvestConfig, Result};

use crate::chromium::{ChromiumBrowser, ChromiumContext, ChromiumEngine};
use crate::http::{HttpBrowser, HttpContext, HttpEngine};

/// Browser window size presented to the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// The identity an isolated context presents to a site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_agent: String,
    pub viewport: Viewport,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A render engine that can be launched once per harvest call.
pub trait RenderEngine: Send + Sync {
    type Browser: RenderBrowser;

    /// Start one engine instance.
    ///
    /// Errors are reported as [`sitechat_shared::SiteChatError::HarvesterUnavailable`].
    fn launch(&self) -> impl Future<Output = Result<Self::Browser>> + Send;

    /// Human-readable engine name for tracing.
    fn name(&self) -> &'static str;
}

/// A running engine instance. Shared by all per-URL tasks of one harvest.
pub trait RenderBrowser: Send + Sync + 'static {
    type Context: RenderContext;

    /// Open a fresh context with its own cookie/storage state.
    fn new_context(
        &self,
        identity: &Identity,
    ) -> impl Future<Output = Result<Self::Context>> + Send;

    /// Shut the instance down. Called after every context has been closed.
    fn close(&self) -> impl Future<Output = Result<()>> + Send;
}

/// One isolated, short-lived browsing context.
pub trait RenderContext: Send + 'static {
    /// Navigate to `url`, wait for the page to render, and return the serialized DOM.
    fn render(&mut self, url: &Url) -> impl Future<Output = Result<String>> + Send;

    /// Release the context.
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}

// ---------------------------------------------------------------------------
// Enum dispatch over built-in backends
// ---------------------------------------------------------------------------

/// Engine selected at runtime from configuration.
#[derive(Debug)]
pub enum AnyEngine {
    Chromium(ChromiumEngine),
    Http(HttpEngine),
}

impl AnyEngine {
    /// Build the engine named by `config.engine`.
    pub fn from_config(config: &HarvestConfig) -> Self {
        match config.engine {
            EngineKind::Chromium => Self::Chromium(ChromiumEngine::new(
                config.browser_path.clone(),
                config.launch_timeout,
            )),
            EngineKind::Http => Self::Http(HttpEngine::new()),
        }
    }
}

pub enum AnyBrowser {
    Chromium(ChromiumBrowser),
    Http(HttpBrowser),
}

pub enum AnyContext {
    Chromium(ChromiumContext),
    Http(HttpContext),
}

impl RenderEngine for AnyEngine {
    type Browser = AnyBrowser;

    async fn launch(&self) -> Result<AnyBrowser> {
        match self {
            Self::Chromium(engine) => engine.launch().await.map(AnyBrowser::Chromium),
            Self::Http(engine) => engine.launch().await.map(AnyBrowser::Http),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Chromium(engine) => engine.name(),
            Self::Http(engine) => engine.name(),
        }
    }
}

impl RenderBrowser for AnyBrowser {
    type Context = AnyContext;

    async fn new_context(&self, identity: &Identity) -> Result<AnyContext> {
        match self {
            Self::Chromium(browser) => browser.new_context(identity).await.map(AnyContext::Chromium),
            Self::Http(browser) => browser.new_context(identity).await.map(AnyContext::Http),
        }
    }

    async fn close(&self) -> Result<()> {
        match self {
            Self::Chromium(browser) => browser.close().await,
            Self::Http(browser) => browser.close().await,
        }
    }
}

impl RenderContext for AnyContext {
    async fn render(&mut self, url: &Url) -> Result<String> {
        match self {
            Self::Chromium(ctx) => ctx.render(url).await,
            Self::Http(ctx) => ctx.render(url).await,
        }
    }

    async fn close(self) -> Result<()> {
        match self {
            Self::Chromium(ctx) => ctx.close().await,
            Self::Http(ctx) => ctx.close().await,
        }
    }
}
