use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use sitechat_chat::{AnyProvider, StreamOptions};
use sitechat_harvester::Harvester;
use sitechat_shared::{Result, SiteChatError};

use crate::router::build_router;

#[derive(Clone)]
pub(crate) struct AppState {
    pub harvester: Arc<Harvester>,
    pub provider: Arc<AnyProvider>,
    pub stream: StreamOptions,
    pub started_at: Instant,
}

pub struct SiteChatServer {
    addr: SocketAddr,
    max_body_size: usize,
    harvester: Harvester,
    provider: AnyProvider,
    stream: StreamOptions,
}

impl SiteChatServer {
    #[must_use]
    pub fn new(bind: &str, port: u16, harvester: Harvester, provider: AnyProvider) -> Self {
        let addr: SocketAddr = format!("{bind}:{port}").parse().unwrap_or_else(|e| {
            tracing::warn!("invalid bind '{bind}': {e}, falling back to 127.0.0.1:{port}");
            SocketAddr::from(([127, 0, 0, 1], port))
        });

        if bind == "0.0.0.0" {
            tracing::warn!("server binding to 0.0.0.0, the API has no authentication");
        }

        Self {
            addr,
            max_body_size: 8 * 1024 * 1024,
            harvester,
            provider,
            stream: StreamOptions::default(),
        }
    }

    #[must_use]
    pub fn with_max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    #[must_use]
    pub fn with_stream_options(mut self, options: StreamOptions) -> Self {
        self.stream = options;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let state = AppState {
            harvester: Arc::new(self.harvester),
            provider: Arc::new(self.provider),
            stream: self.stream,
            started_at: Instant::now(),
        };
        let router = build_router(state, self.max_body_size);

        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| SiteChatError::Network(format!("failed to bind {}: {e}", self.addr)))?;
        tracing::info!("sitechat server listening on {}", self.addr);

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                tracing::info!("server shutting down");
            })
            .await
            .map_err(|e| SiteChatError::Network(format!("server error: {e}")))?;

        Ok(())
    }
}
