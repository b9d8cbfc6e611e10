//! Session orchestration for sitechat.
//!
//! A [`ChatSession`] owns the harvested corpus and the conversation history
//! and threads both into every reply. Nothing is held as process state.

pub mod session;

pub use session::{ChatSession, ReplyOutcome, SessionOptions, SessionTurn};
