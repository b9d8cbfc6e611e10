//! Grounded chat for sitechat.
//!
//! - [`build_system_turn`]: the instruction turn that confines the assistant
//!   to the harvested corpus
//! - [`CompletionProvider`]: the streaming completion boundary, with an
//!   OpenAI-compatible client
//! - [`stream_reply`]: relays reply fragments as they arrive, with
//!   cancellation on consumer drop
//! - [`AssistantDraft`]: caller-side accumulator for the in-flight reply

pub mod draft;
pub mod grounding;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod provider;
mod sse;
pub mod streamer;

pub use draft::AssistantDraft;
pub use grounding::{
    build_system_turn, build_system_turn_with_budget, off_topic_refusal, unanswerable_refusal,
};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockProvider;
pub use openai::OpenAiProvider;
pub use provider::{AnyProvider, CompletionParams, CompletionProvider, FragmentStream};
pub use streamer::{ReplyStream, StreamOptions, assemble_turns, stream_reply};
