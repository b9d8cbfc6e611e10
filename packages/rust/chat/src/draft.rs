//! Caller-side accumulator for an in-flight assistant turn.

use sitechat_shared::Turn;

/// Assistant reply under construction.
///
/// `content` always equals the concatenation of every fragment pushed so far.
/// Once finalized (normally or by interruption) the draft ignores further
/// fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssistantDraft {
    content: String,
    finalized: bool,
    interrupted: bool,
}

impl AssistantDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns `false` if the draft is already finalized.
    pub fn push(&mut self, fragment: &str) -> bool {
        if self.finalized {
            return false;
        }
        self.content.push_str(fragment);
        true
    }

    /// Mark the reply complete.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Mark the reply as cut short; the content is a partial answer.
    pub fn interrupt(&mut self) {
        self.finalized = true;
        self.interrupted = true;
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Convert into an assistant [`Turn`] for the conversation history.
    pub fn into_turn(self) -> Turn {
        Turn::assistant(self.content)
    }
}
