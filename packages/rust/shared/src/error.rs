//! Error types for sitechat.
//!
//! Library crates use [`SiteChatError`] via `thiserror`.
//! App crates (cli) wrap this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all sitechat operations.
#[derive(Debug, thiserror::Error)]
pub enum SiteChatError {
    /// Empty URL list, blank chat message, missing user name.
    /// Raised before any external call is made.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Navigation/render/network failure for a single source.
    ///
    /// Recorded on the failed source; never propagated past a harvest batch.
    #[error("failed to fetch {url}: {message}")]
    FetchFailure { url: String, message: String },

    /// The render engine itself could not be started.
    #[error("harvester unavailable: {0}")]
    HarvesterUnavailable(String),

    /// The completion provider rejected the request before streaming began.
    #[error("provider error: {0}")]
    Provider(String),

    /// The provider connection dropped after streaming began.
    #[error("stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Low-level network error outside a per-URL fetch.
    #[error("network error: {0}")]
    Network(String),

    /// Markup, JSON or protocol parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SiteChatError>;

impl SiteChatError {
    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a per-URL fetch failure.
    pub fn fetch(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::FetchFailure {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code for this error, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "invalid_input",
            Self::FetchFailure { .. } => "fetch_failure",
            Self::HarvesterUnavailable(_) => "harvester_unavailable",
            Self::Provider(_) => "provider_error",
            Self::StreamInterrupted(_) => "stream_interrupted",
            Self::Config { .. } => "config",
            Self::Network(_) => "network",
            Self::Parse { .. } => "parse",
            Self::Io { .. } => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SiteChatError::invalid_input("no URLs given");
        assert_eq!(err.to_string(), "invalid input: no URLs given");

        let err = SiteChatError::fetch("https://bad.invalid/", "net::ERR_NAME_NOT_RESOLVED");
        assert!(err.to_string().contains("bad.invalid"));
        assert!(err.to_string().contains("ERR_NAME_NOT_RESOLVED"));
    }

    #[test]
    fn error_kinds_are_stable() {
        assert_eq!(SiteChatError::invalid_input("x").kind(), "invalid_input");
        assert_eq!(
            SiteChatError::HarvesterUnavailable("x".into()).kind(),
            "harvester_unavailable"
        );
        assert_eq!(SiteChatError::Provider("x".into()).kind(), "provider_error");
        assert_eq!(
            SiteChatError::StreamInterrupted("x".into()).kind(),
            "stream_interrupted"
        );
    }
}
