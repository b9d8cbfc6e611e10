//! Core domain types: harvested sources, the grounding corpus, and conversation turns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Extraction outcome of a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    Pending,
    Fetched,
    Failed,
}

/// One user-supplied URL and the outcome of harvesting it.
///
/// Built through [`Source::fetched`] / [`Source::failed`] so that `error` is
/// present exactly when the status is [`SourceStatus::Failed`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    /// The URL as submitted (trimmed).
    pub url: String,
    /// Current status.
    pub status: SourceStatus,
    /// Sanitized body text, possibly empty.
    pub rendered_text: String,
    /// Failure cause (present iff `status == Failed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the harvest of this source completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
}

impl Source {
    /// A source that has not been harvested yet.
    pub fn pending(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: SourceStatus::Pending,
            rendered_text: String::new(),
            error: None,
            fetched_at: None,
        }
    }

    /// A successfully harvested source.
    pub fn fetched(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: SourceStatus::Fetched,
            rendered_text: text.into(),
            error: None,
            fetched_at: Some(Utc::now()),
        }
    }

    /// A source whose harvest failed.
    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: SourceStatus::Failed,
            rendered_text: String::new(),
            error: Some(error.into()),
            fetched_at: Some(Utc::now()),
        }
    }

    pub fn is_fetched(&self) -> bool {
        self.status == SourceStatus::Fetched
    }
}

/// Wire shape of one harvest result: `{url, content, success, error?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestRecord {
    pub url: String,
    pub content: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Source> for HarvestRecord {
    fn from(source: &Source) -> Self {
        let success = source.is_fetched();
        Self {
            url: source.url.clone(),
            content: success.then(|| source.rendered_text.clone()),
            success,
            error: source.error.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Corpus
// ---------------------------------------------------------------------------

/// One labeled page text inside a [`Corpus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusEntry {
    pub url: String,
    pub content: String,
}

/// Ordered URL → text mapping used as the grounding context for a session.
///
/// Insertion order is preserved so the grounding instruction is deterministic.
/// URLs are unique; inserting an existing URL replaces its text in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a corpus from the fetched sources of a harvest, in harvest order.
    pub fn from_sources(sources: &[Source]) -> Self {
        let mut corpus = Self::new();
        for source in sources.iter().filter(|s| s.is_fetched()) {
            corpus.insert(&source.url, &source.rendered_text);
        }
        corpus
    }

    pub fn insert(&mut self, url: impl Into<String>, content: impl Into<String>) {
        let url = url.into();
        let content = content.into();
        match self.entries.iter_mut().find(|e| e.url == url) {
            Some(existing) => existing.content = content,
            None => self.entries.push(CorpusEntry { url, content }),
        }
    }

    pub fn get(&self, url: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.url == url)
            .map(|e| e.content.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorpusEntry> {
        self.entries.iter()
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.url.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of characters of page text across all entries.
    pub fn total_chars(&self) -> usize {
        self.entries.iter().map(|e| e.content.chars().count()).sum()
    }
}

impl FromIterator<CorpusEntry> for Corpus {
    fn from_iter<I: IntoIterator<Item = CorpusEntry>>(iter: I) -> Self {
        let mut corpus = Self::new();
        for entry in iter {
            corpus.insert(entry.url, entry.content);
        }
        corpus
    }
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// Role tag of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One role-tagged message in the conversation sent to the completion provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}
