//! Concurrent web page harvester for sitechat.
//!
//! Renders each URL of a batch in an isolated browser context, strips
//! non-content markup and returns the sanitized text or a per-URL failure,
//! in input order.
//!
//! Backends:
//! - [`ChromiumEngine`]: headless Chromium driven over the DevTools protocol
//! - [`HttpEngine`]: plain GET, for pages that need no client-side script

pub mod chromium;
pub mod engine;
pub mod http;
pub mod identity;
pub mod render;
pub mod sanitize;

pub use chromium::ChromiumEngine;
pub use engine::{
    HarvestProgress, HarvestReport, Harvester, PreparedUrl, SilentProgress, prepare_urls,
};
pub use http::HttpEngine;
pub use identity::IdentityPool;
pub use render::{AnyEngine, Identity, RenderBrowser, RenderContext, RenderEngine, Viewport};
pub use sanitize::extract_text;
