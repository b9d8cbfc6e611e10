//! Scripted completion provider for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sitechat_shared::{Result, SiteChatError, Turn};

use crate::provider::{CompletionParams, CompletionProvider, FragmentStream};

#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    fragments: Vec<String>,
    /// Milliseconds to sleep before each fragment.
    pub delay_ms: u64,
    /// Emit this many fragments, then fail the stream.
    pub interrupt_after: Option<usize>,
    /// Reject every request with this message.
    pub reject: Option<String>,
    received: Arc<Mutex<Vec<Vec<Turn>>>>,
    live_streams: Arc<AtomicUsize>,
    emitted: Arc<AtomicUsize>,
}

impl MockProvider {
    #[must_use]
    pub fn with_fragments<S: Into<String>>(fragments: impl IntoIterator<Item = S>) -> Self {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rejecting(message: impl Into<String>) -> Self {
        Self {
            reject: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    #[must_use]
    pub fn interrupt_after(mut self, fragments: usize) -> Self {
        self.interrupt_after = Some(fragments);
        self
    }

    /// Turn lists received so far, one per request.
    pub fn received(&self) -> Vec<Vec<Turn>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Streams handed out and not yet dropped.
    pub fn live_streams(&self) -> usize {
        self.live_streams.load(Ordering::SeqCst)
    }

    /// Fragments pulled from all streams so far.
    pub fn emitted(&self) -> usize {
        self.emitted.load(Ordering::SeqCst)
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl CompletionProvider for MockProvider {
    async fn stream_chat(&self, turns: &[Turn], _params: &CompletionParams) -> Result<FragmentStream> {
        if let Ok(mut received) = self.received.lock() {
            received.push(turns.to_vec());
        }
        if let Some(message) = &self.reject {
            return Err(SiteChatError::Provider(message.clone()));
        }

        let mut items: Vec<Result<String>> = match self.interrupt_after {
            Some(limit) => self.fragments.iter().take(limit).cloned().map(Ok).collect(),
            None => self.fragments.iter().cloned().map(Ok).collect(),
        };
        if self.interrupt_after.is_some() {
            items.push(Err(SiteChatError::StreamInterrupted(
                "mock connection reset".into(),
            )));
        }

        self.live_streams.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(Arc::clone(&self.live_streams));
        let delay = Duration::from_millis(self.delay_ms);
        let emitted = Arc::clone(&self.emitted);

        let stream = futures::stream::unfold(
            (guard, items.into_iter()),
            move |(guard, mut items)| {
                let emitted = Arc::clone(&emitted);
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let item = items.next()?;
                    if item.is_ok() {
                        emitted.fetch_add(1, Ordering::SeqCst);
                    }
                    Some((item, (guard, items)))
                }
            },
        );

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
