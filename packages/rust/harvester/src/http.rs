//! Plain-HTTP render backend.
//!
//! Returns the markup as served, without executing client-side script. Each
//! context is a fresh `reqwest::Client`, so no cookies leak between sites.

use reqwest::Client;
use tracing::debug;
use url::Url;

use sitechat_shared::{Result, SiteChatError};

use crate::render::{Identity, RenderBrowser, RenderContext, RenderEngine};

/// Engine that "renders" pages with a plain GET.
#[derive(Debug, Clone, Default)]
pub struct HttpEngine;

impl HttpEngine {
    pub fn new() -> Self {
        Self
    }
}

impl RenderEngine for HttpEngine {
    type Browser = HttpBrowser;

    async fn launch(&self) -> Result<HttpBrowser> {
        Ok(HttpBrowser)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Stateless "instance" of the HTTP engine.
#[derive(Debug)]
pub struct HttpBrowser;

impl RenderBrowser for HttpBrowser {
    type Context = HttpContext;

    async fn new_context(&self, identity: &Identity) -> Result<HttpContext> {
        let client = Client::builder()
            .user_agent(identity.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| SiteChatError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpContext { client })
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// One isolated HTTP client.
#[derive(Debug)]
pub struct HttpContext {
    client: Client,
}

impl RenderContext for HttpContext {
    async fn render(&mut self, url: &Url) -> Result<String> {
        debug!(%url, "fetching page");

        let response = self
            .client
            .get(url.as_str())
            .send()
            .await
            .map_err(|e| SiteChatError::fetch(url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SiteChatError::fetch(url.as_str(), format!("HTTP {status}")));
        }

        response
            .text()
            .await
            .map_err(|e| SiteChatError::fetch(url.as_str(), format!("body read failed: {e}")))
    }

    async fn close(self) -> Result<()> {
        Ok(())
    }
}
