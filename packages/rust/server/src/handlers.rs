use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use sitechat_chat::stream_reply;
use sitechat_shared::{Corpus, HarvestRecord, Turn};

use crate::error::ApiError;
use crate::server::AppState;

#[derive(Deserialize)]
pub(crate) struct ScrapeRequest {
    pub urls: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct ScrapeResponse {
    pub results: Vec<HarvestRecord>,
}

#[derive(Deserialize)]
pub(crate) struct Website {
    pub url: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub websites: Vec<Website>,
    #[serde(default)]
    pub chat_history: Vec<Turn>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[instrument(skip_all, fields(urls = payload.urls.len()))]
pub(crate) async fn scrape_handler(
    State(state): State<AppState>,
    Json(payload): Json<ScrapeRequest>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    let report = state.harvester.harvest(&payload.urls).await?;
    Ok(Json(ScrapeResponse {
        results: report.records(),
    }))
}

#[instrument(skip_all, fields(websites = payload.websites.len(), history = payload.chat_history.len()))]
pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Response, ApiError> {
    let mut corpus = Corpus::new();
    for site in payload.websites {
        match site.content {
            Some(content) if !content.trim().is_empty() => corpus.insert(site.url, content),
            _ => tracing::debug!(url = %site.url, "skipping website without content"),
        }
    }

    let stream = stream_reply(
        state.provider.as_ref(),
        &corpus,
        &payload.user_name,
        &payload.chat_history,
        &payload.message,
        &state.stream,
    )
    .await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(stream),
    )
        .into_response())
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

#[cfg(test)]
mod tests {
    use sitechat_shared::Role;

    use super::*;

    #[test]
    fn chat_request_uses_camel_case_fields() {
        let json = r#"{
            "message": "hi",
            "userName": "Dana",
            "websites": [{"url": "https://a.example/", "content": "text"}, {"url": "https://b.example/", "content": null}],
            "chatHistory": [{"role": "user", "content": "earlier"}]
        }"#;
        let payload: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(payload.user_name, "Dana");
        assert_eq!(payload.websites.len(), 2);
        assert!(payload.websites[1].content.is_none());
        assert_eq!(payload.chat_history[0].role, Role::User);
    }

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
    }
}
