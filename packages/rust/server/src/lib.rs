//! HTTP surface for sitechat: harvest and grounded-chat endpoints plus health.
//!
//! - `POST /api/scrape` returns per-URL harvest records
//! - `POST /api/chat` streams the reply as chunked plain text
//! - `GET /health`

mod error;
mod handlers;
mod router;
mod server;

pub use server::SiteChatServer;
