//! Shared types, error model, and configuration for sitechat.
//!
//! This crate is the foundation depended on by all other sitechat crates.
//! It provides:
//! - [`SiteChatError`]: the unified error type
//! - Domain types ([`Source`], [`Corpus`], [`Turn`], [`HarvestRecord`])
//! - Configuration ([`AppConfig`], [`HarvestConfig`], [`ProviderConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DEFAULT_USER_AGENTS, DefaultsConfig, EngineKind, GroundingSection, HarvestConfig,
    HarvestSection, ProviderConfig, ProviderSection, ServerSection, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{Result, SiteChatError};
pub use types::{Corpus, CorpusEntry, HarvestRecord, Role, Source, SourceStatus, Turn};
