//! Headless Chromium render backend over the DevTools protocol.
//!
//! One browser process per harvest; each URL gets its own browser context
//! (separate cookies and storage) with a single page attached in flat mode.

mod connection;
mod process;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, instrument, warn};
use url::Url;

use sitechat_shared::{Result, SiteChatError};

use crate::render::{Identity, RenderBrowser, RenderContext, RenderEngine};

use connection::{CdpConnection, CdpEvent};
use process::BrowserProcess;

const SERIALIZE_DOM: &str = "document.documentElement.outerHTML";

/// Upper bound on the `Browser.close` round-trip.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Launches a Chromium-family browser binary.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    browser_path: String,
    launch_timeout: Duration,
}

impl ChromiumEngine {
    pub fn new(browser_path: impl Into<String>, launch_timeout: Duration) -> Self {
        Self {
            browser_path: browser_path.into(),
            launch_timeout,
        }
    }
}

impl RenderEngine for ChromiumEngine {
    type Browser = ChromiumBrowser;

    async fn launch(&self) -> Result<ChromiumBrowser> {
        let process = BrowserProcess::spawn(&self.browser_path, self.launch_timeout).await?;

        let conn = match CdpConnection::connect(&process.ws_url).await {
            Ok(conn) => conn,
            Err(e) => {
                process.shutdown().await;
                return Err(e);
            }
        };

        Ok(ChromiumBrowser {
            conn: Arc::new(conn),
            process: Mutex::new(Some(process)),
        })
    }

    fn name(&self) -> &'static str {
        "chromium"
    }
}

/// A running browser process plus its DevTools connection.
pub struct ChromiumBrowser {
    conn: Arc<CdpConnection>,
    process: Mutex<Option<BrowserProcess>>,
}

impl ChromiumBrowser {
    async fn open_page(
        &self,
        browser_context_id: &str,
        identity: &Identity,
    ) -> Result<(String, mpsc::UnboundedReceiver<CdpEvent>)> {
        let target = self
            .conn
            .call(
                "Target.createTarget",
                json!({ "url": "about:blank", "browserContextId": browser_context_id }),
                None,
            )
            .await?;
        let target_id = str_field(&target, "targetId", "Target.createTarget")?;

        let attached = self
            .conn
            .call(
                "Target.attachToTarget",
                json!({ "targetId": target_id, "flatten": true }),
                None,
            )
            .await?;
        let session_id = str_field(&attached, "sessionId", "Target.attachToTarget")?;
        let events = self.conn.subscribe(&session_id).await;

        let session = Some(session_id.as_str());
        self.conn.call("Page.enable", json!({}), session).await?;
        self.conn
            .call("Page.setLifecycleEventsEnabled", json!({ "enabled": true }), session)
            .await?;
        self.conn
            .call(
                "Emulation.setUserAgentOverride",
                json!({ "userAgent": identity.user_agent }),
                session,
            )
            .await?;
        self.conn
            .call(
                "Emulation.setDeviceMetricsOverride",
                json!({
                    "width": identity.viewport.width,
                    "height": identity.viewport.height,
                    "deviceScaleFactor": 1,
                    "mobile": false,
                }),
                session,
            )
            .await?;

        Ok((session_id, events))
    }
}

impl RenderBrowser for ChromiumBrowser {
    type Context = ChromiumContext;

    async fn new_context(&self, identity: &Identity) -> Result<ChromiumContext> {
        let created = self
            .conn
            .call(
                "Target.createBrowserContext",
                json!({ "disposeOnDetach": true }),
                None,
            )
            .await?;
        let browser_context_id =
            str_field(&created, "browserContextId", "Target.createBrowserContext")?;

        match self.open_page(&browser_context_id, identity).await {
            Ok((session_id, events)) => Ok(ChromiumContext {
                conn: Arc::clone(&self.conn),
                browser_context_id,
                session_id,
                events,
            }),
            Err(e) => {
                dispose_context(&self.conn, &browser_context_id).await;
                Err(e)
            }
        }
    }

    async fn close(&self) -> Result<()> {
        // The browser usually drops the socket before answering.
        match tokio::time::timeout(CLOSE_TIMEOUT, self.conn.call("Browser.close", json!({}), None))
            .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!(error = %e, "Browser.close returned an error"),
            Err(_) => warn!("Browser.close got no reply"),
        }
        if let Some(process) = self.process.lock().await.take() {
            process.shutdown().await;
        }
        Ok(())
    }
}

/// One isolated browser context with one attached page.
pub struct ChromiumContext {
    conn: Arc<CdpConnection>,
    browser_context_id: String,
    session_id: String,
    events: mpsc::UnboundedReceiver<CdpEvent>,
}

/// Wait until the document started by `loader_id` fires its load event.
async fn wait_for_load(
    events: &mut mpsc::UnboundedReceiver<CdpEvent>,
    url: &Url,
    loader_id: Option<&str>,
) -> Result<()> {
    while let Some(event) = events.recv().await {
        match event.method.as_str() {
            "Page.lifecycleEvent" => {
                let name = event.params.get("name").and_then(Value::as_str);
                let loader = event.params.get("loaderId").and_then(Value::as_str);
                if name == Some("load") && (loader_id.is_none() || loader == loader_id) {
                    return Ok(());
                }
            }
            "Page.loadEventFired" if loader_id.is_none() => return Ok(()),
            "Inspector.detached" | "Inspector.targetCrashed" => {
                return Err(SiteChatError::fetch(
                    url.as_str(),
                    format!("page terminated ({})", event.method),
                ));
            }
            _ => {}
        }
    }
    Err(SiteChatError::fetch(url.as_str(), "browser connection closed"))
}

impl RenderContext for ChromiumContext {
    #[instrument(skip_all, fields(url = %url))]
    async fn render(&mut self, url: &Url) -> Result<String> {
        // Drop anything left over from about:blank.
        while self.events.try_recv().is_ok() {}

        let session = Some(self.session_id.as_str());
        let navigated = self
            .conn
            .call("Page.navigate", json!({ "url": url.as_str() }), session)
            .await
            .map_err(|e| SiteChatError::fetch(url.as_str(), e.to_string()))?;

        let error_text = navigated
            .get("errorText")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if !error_text.is_empty() {
            return Err(SiteChatError::fetch(url.as_str(), error_text));
        }

        let loader_id = navigated
            .get("loaderId")
            .and_then(Value::as_str)
            .map(str::to_owned);
        wait_for_load(&mut self.events, url, loader_id.as_deref()).await?;
        debug!("page loaded");

        let evaluated = self
            .conn
            .call(
                "Runtime.evaluate",
                json!({ "expression": SERIALIZE_DOM, "returnByValue": true }),
                session,
            )
            .await
            .map_err(|e| SiteChatError::fetch(url.as_str(), e.to_string()))?;

        if let Some(details) = evaluated.get("exceptionDetails") {
            return Err(SiteChatError::fetch(
                url.as_str(),
                format!("DOM serialization threw: {details}"),
            ));
        }

        evaluated
            .pointer("/result/value")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| SiteChatError::fetch(url.as_str(), "DOM serialization returned no markup"))
    }

    async fn close(self) -> Result<()> {
        self.conn.unsubscribe(&self.session_id).await;
        dispose_context(&self.conn, &self.browser_context_id).await;
        Ok(())
    }
}

async fn dispose_context(conn: &CdpConnection, browser_context_id: &str) {
    if let Err(e) = conn
        .call(
            "Target.disposeBrowserContext",
            json!({ "browserContextId": browser_context_id }),
            None,
        )
        .await
    {
        warn!(browser_context_id, error = %e, "failed to dispose browser context");
    }
}

fn str_field(value: &Value, key: &str, method: &str) -> Result<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| SiteChatError::parse(format!("{method}: reply missing `{key}`")))
}
