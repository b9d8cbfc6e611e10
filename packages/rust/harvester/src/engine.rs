//! Concurrent, order-preserving harvest of a URL batch.
//!
//! One render engine instance is launched per [`Harvester::harvest`] call.
//! Every URL gets its own isolated context, work is capped by a semaphore,
//! and results are written into a slot array indexed by input position.

use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use url::{Host, Url};
use uuid::Uuid;

use sitechat_shared::{
    Corpus, HarvestConfig, HarvestRecord, Result, SiteChatError, Source, SourceStatus,
};

use crate::identity::IdentityPool;
use crate::render::{AnyEngine, Identity, RenderBrowser, RenderContext, RenderEngine};
use crate::sanitize;

// ---------------------------------------------------------------------------
// HarvestReport
// ---------------------------------------------------------------------------

/// Outcome of one harvest call, in input order.
#[derive(Debug, Clone)]
pub struct HarvestReport {
    pub sources: Vec<Source>,
    /// Wall-clock duration of the whole batch.
    pub elapsed: Duration,
}

impl HarvestReport {
    /// Wire records (`{url, content, success, error?}`).
    pub fn records(&self) -> Vec<HarvestRecord> {
        self.sources.iter().map(HarvestRecord::from).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.sources.iter().filter(|s| s.is_fetched()).count()
    }

    pub fn failed(&self) -> usize {
        self.sources.len() - self.succeeded()
    }

    /// Corpus built from the fetched sources only.
    pub fn corpus(&self) -> Corpus {
        Corpus::from_sources(&self.sources)
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Receives per-source completion notifications, in completion order.
pub trait HarvestProgress: Send + Sync {
    /// Called once, after intake, with the number of sources in the batch.
    fn started(&self, _total: usize) {}

    /// Called as each source reaches its final status.
    fn source_finished(&self, source: &Source);
}

/// Progress sink that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl HarvestProgress for SilentProgress {
    fn source_finished(&self, _source: &Source) {}
}

// ---------------------------------------------------------------------------
// Harvester
// ---------------------------------------------------------------------------

/// Renders a batch of pages and extracts their sanitized text.
pub struct Harvester<E: RenderEngine = AnyEngine> {
    engine: E,
    config: HarvestConfig,
    identities: IdentityPool,
}

impl Harvester<AnyEngine> {
    /// Harvester backed by the engine named in `config`.
    pub fn from_config(config: HarvestConfig) -> Self {
        Self::new(AnyEngine::from_config(&config), config)
    }
}

impl<E: RenderEngine> Harvester<E> {
    pub fn new(engine: E, mut config: HarvestConfig) -> Self {
        config.concurrency = config.concurrency.max(1);
        let identities = IdentityPool::from_config(&config);
        Self {
            engine,
            config,
            identities,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// Harvest `urls` without progress reporting.
    pub async fn harvest(&self, urls: &[String]) -> Result<HarvestReport> {
        self.harvest_with_progress(urls, &SilentProgress).await
    }

    /// Harvest `urls`, returning one [`Source`] per unique URL in input order.
    ///
    /// Per-URL failures are recorded on the corresponding source. Only input
    /// validation ([`SiteChatError::InvalidInput`]) and engine start-up
    /// ([`SiteChatError::HarvesterUnavailable`]) fail the whole call.
    #[instrument(skip_all, fields(harvest_id = %Uuid::now_v7(), engine = self.engine.name()))]
    pub async fn harvest_with_progress(
        &self,
        urls: &[String],
        progress: &dyn HarvestProgress,
    ) -> Result<HarvestReport> {
        let start_time = Instant::now();
        let prepared = prepare_urls(urls, self.config.block_private_hosts)?;
        let total = prepared.len();
        progress.started(total);

        info!(
            urls = total,
            concurrency = self.config.concurrency,
            "starting harvest"
        );

        let browser = Arc::new(self.engine.launch().await?);
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency));

        let mut slots: Vec<Source> = prepared
            .iter()
            .map(|entry| Source::pending(entry.url.clone()))
            .collect();
        let mut index_of = HashMap::new();
        let mut tasks = JoinSet::new();

        for (index, entry) in prepared.into_iter().enumerate() {
            let target = match entry.target {
                Ok(target) => target,
                Err(reason) => {
                    debug!(url = %entry.url, %reason, "rejected at intake");
                    let source = Source::failed(entry.url, reason);
                    progress.source_finished(&source);
                    slots[index] = source;
                    continue;
                }
            };

            let browser = Arc::clone(&browser);
            let sem = Arc::clone(&semaphore);
            let identity = self.identities.pick();
            let timeout = self.config.navigation_timeout;
            let url = entry.url;

            let handle = tasks.spawn(async move {
                let Ok(_permit) = sem.acquire_owned().await else {
                    return Source::failed(url, "harvest cancelled");
                };
                harvest_one(browser.as_ref(), url, target, identity, timeout).await
            });
            index_of.insert(handle.id(), index);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (id, source) = match joined {
                Ok((id, source)) => (id, source),
                Err(e) => {
                    let id = e.id();
                    let url = index_of
                        .get(&id)
                        .map(|&i| slots[i].url.clone())
                        .unwrap_or_default();
                    warn!(%url, error = %e, "harvest task failed");
                    (id, Source::failed(url, format!("harvest task failed: {e}")))
                }
            };
            progress.source_finished(&source);
            if let Some(&index) = index_of.get(&id) {
                slots[index] = source;
            }
        }

        // Every context is closed by now; the engine goes last.
        if let Err(e) = browser.close().await {
            warn!(error = %e, "failed to close render engine");
        }

        let sources: Vec<Source> = slots
            .into_iter()
            .map(|source| match source.status {
                SourceStatus::Pending => Source::failed(source.url, "no result recorded"),
                _ => source,
            })
            .collect();

        let report = HarvestReport {
            sources,
            elapsed: start_time.elapsed(),
        };

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            duration_ms = report.elapsed.as_millis(),
            "harvest completed"
        );

        Ok(report)
    }
}

/// Open a context, render, close the context, sanitize. Never fails the batch.
async fn harvest_one<B: RenderBrowser>(
    browser: &B,
    url: String,
    target: Url,
    identity: Identity,
    timeout: Duration,
) -> Source {
    debug!(%url, user_agent = %identity.user_agent, "harvesting");

    let mut context = match tokio::time::timeout(timeout, browser.new_context(&identity)).await {
        Ok(Ok(context)) => context,
        Ok(Err(e)) => return Source::failed(url, failure_reason(e)),
        Err(_) => {
            warn!(%url, "opening render context timed out");
            return Source::failed(
                url,
                format!("opening a page timed out after {}s", timeout.as_secs_f32()),
            );
        }
    };

    let rendered = tokio::time::timeout(timeout, context.render(&target)).await;

    match tokio::time::timeout(timeout, context.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!(%url, error = %e, "failed to close render context"),
        Err(_) => warn!(%url, "closing render context timed out"),
    }

    match rendered {
        Ok(Ok(markup)) => {
            let text = sanitize::extract_text(&markup);
            debug!(%url, chars = text.chars().count(), "source fetched");
            Source::fetched(url, text)
        }
        Ok(Err(e)) => {
            warn!(%url, error = %e, "source failed");
            Source::failed(url, failure_reason(e))
        }
        Err(_) => {
            warn!(%url, "navigation timed out");
            Source::failed(
                url,
                format!("navigation timed out after {}s", timeout.as_secs_f32()),
            )
        }
    }
}

/// Per-source error text; the URL is already on the source.
fn failure_reason(error: SiteChatError) -> String {
    match error {
        SiteChatError::FetchFailure { message, .. } => message,
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// URL intake
// ---------------------------------------------------------------------------

/// One unique, trimmed input URL and whether it may be navigated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedUrl {
    /// The URL as submitted, trimmed.
    pub url: String,
    /// Parsed navigation target, or the reason it was rejected.
    pub target: std::result::Result<Url, String>,
}

/// Trim, drop blanks, deduplicate (keeping first occurrence) and validate.
///
/// Fails with [`SiteChatError::InvalidInput`] when no navigable URL remains.
pub fn prepare_urls(urls: &[String], block_private_hosts: bool) -> Result<Vec<PreparedUrl>> {
    let mut seen = HashSet::new();
    let mut prepared = Vec::new();

    for raw in urls {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }

        let target = parse_target(trimmed, block_private_hosts);
        let key = match &target {
            Ok(url) => url.as_str().to_string(),
            Err(_) => trimmed.to_string(),
        };
        if !seen.insert(key) {
            debug!(url = trimmed, "duplicate url dropped");
            continue;
        }

        prepared.push(PreparedUrl {
            url: trimmed.to_string(),
            target,
        });
    }

    if prepared.is_empty() {
        return Err(SiteChatError::invalid_input("no URLs provided"));
    }

    if prepared.iter().all(|p| p.target.is_err()) {
        let reasons: Vec<String> = prepared
            .iter()
            .filter_map(|p| p.target.as_ref().err().map(|e| format!("{}: {e}", p.url)))
            .collect();
        return Err(SiteChatError::invalid_input(format!(
            "no valid URLs provided ({})",
            reasons.join("; ")
        )));
    }

    Ok(prepared)
}

fn parse_target(raw: &str, block_private_hosts: bool) -> std::result::Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid URL: {e}"))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(format!("unsupported URL scheme `{other}`")),
    }

    if block_private_hosts && is_private_target(&url) {
        return Err("private or local network address blocked".to_string());
    }

    Ok(url)
}

// ---------------------------------------------------------------------------
// Private network guard
// ---------------------------------------------------------------------------

/// Check if a URL points at a loopback, private or local-only host.
fn is_private_target(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(v4)) => is_private_ip(&IpAddr::V4(v4)),
        Some(Host::Ipv6(v6)) => is_private_ip(&IpAddr::V6(v6)),
        Some(Host::Domain(host)) => {
            let host = host.to_ascii_lowercase();
            host == "localhost"
                || host.ends_with(".localhost")
                || host.ends_with(".local")
                || host.ends_with(".internal")
        }
        None => true,
    }
}

/// Check if an IP is in a private/reserved range.
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                // 100.64.0.0/10 (Carrier-grade NAT)
                || (v4.octets()[0] == 100 && (v4.octets()[1] & 0xC0) == 64)
                // 192.0.0.0/24
                || (v4.octets()[0] == 192 && v4.octets()[1] == 0 && v4.octets()[2] == 0)
        }
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_ip(&IpAddr::V4(v4));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 (unique local)
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 (link local)
                || (first & 0xffc0) == 0xfe80
        }
    }
}
