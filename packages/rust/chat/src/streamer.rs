//! Grounded chat streamer: system turn + history + new message in, reply
//! fragments out, relayed as they arrive.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{Instrument, Span, debug, info, instrument, warn};
use uuid::Uuid;

use sitechat_shared::{Corpus, Result, Role, SiteChatError, Turn};

use crate::grounding::build_system_turn_with_budget;
use crate::provider::{CompletionParams, CompletionProvider, FragmentStream};

/// Per-call settings for [`stream_reply`].
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub params: CompletionParams,
    /// Corpus budget in characters; `0` disables truncation.
    pub max_corpus_chars: usize,
    /// Fragments buffered between the provider and a slow consumer.
    pub channel_capacity: usize,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            params: CompletionParams::default(),
            max_corpus_chars: 400_000,
            channel_capacity: 32,
        }
    }
}

/// Assemble `[system, ...history, user]`.
///
/// `system` turns in `history` are dropped so exactly one system turn leads.
pub fn assemble_turns(system: Turn, history: &[Turn], new_message: &str) -> Vec<Turn> {
    let mut turns = Vec::with_capacity(history.len() + 2);
    turns.push(system);

    let mut dropped = 0usize;
    for turn in history {
        if turn.role == Role::System {
            dropped += 1;
            continue;
        }
        turns.push(turn.clone());
    }
    if dropped > 0 {
        warn!(dropped, "ignoring system turns supplied in history");
    }

    turns.push(Turn::user(new_message));
    turns
}

/// Start a grounded reply.
///
/// Returns once the provider has produced its first item, so a rejected
/// request surfaces here as [`SiteChatError::Provider`] and no stream is
/// handed out. Later failures arrive as a final
/// [`SiteChatError::StreamInterrupted`] item.
#[instrument(skip_all, fields(stream_id = %Uuid::now_v7(), provider = provider.name()))]
pub async fn stream_reply<P: CompletionProvider + ?Sized>(
    provider: &P,
    corpus: &Corpus,
    user_name: &str,
    history: &[Turn],
    new_message: &str,
    options: &StreamOptions,
) -> Result<ReplyStream> {
    if new_message.trim().is_empty() {
        return Err(SiteChatError::invalid_input("message must not be empty"));
    }

    let system = build_system_turn_with_budget(corpus, user_name, options.max_corpus_chars);
    let turns = assemble_turns(system, history, new_message);

    info!(
        sources = corpus.len(),
        history = history.len(),
        model = %options.params.model,
        "starting reply stream"
    );

    let mut upstream = provider
        .stream_chat(&turns, &options.params)
        .await
        .map_err(into_provider_error)?;

    let first = match upstream.next().await {
        Some(Ok(fragment)) => Some(fragment),
        Some(Err(e)) => return Err(into_provider_error(e)),
        None => None,
    };

    let (tx, rx) = mpsc::channel(options.channel_capacity.max(1));
    tokio::spawn(relay(first, upstream, tx).instrument(Span::current()));

    Ok(ReplyStream { rx })
}

fn into_provider_error(error: SiteChatError) -> SiteChatError {
    match error {
        SiteChatError::Provider(_) | SiteChatError::InvalidInput { .. } => error,
        SiteChatError::StreamInterrupted(message) => SiteChatError::Provider(message),
        other => SiteChatError::Provider(other.to_string()),
    }
}

/// Forward provider items to the consumer until either side finishes.
///
/// Returning drops `upstream`, which releases the provider connection.
async fn relay(first: Option<String>, mut upstream: FragmentStream, tx: mpsc::Sender<Result<String>>) {
    let mut delivered = 0usize;

    if let Some(fragment) = first {
        if tx.send(Ok(fragment)).await.is_err() {
            debug!("consumer dropped before first fragment");
            return;
        }
        delivered += 1;
    }

    loop {
        tokio::select! {
            () = tx.closed() => {
                debug!(delivered, "consumer dropped, closing provider stream");
                return;
            }
            item = upstream.next() => match item {
                Some(Ok(fragment)) => {
                    if tx.send(Ok(fragment)).await.is_err() {
                        debug!(delivered, "consumer dropped, closing provider stream");
                        return;
                    }
                    delivered += 1;
                }
                Some(Err(e)) => {
                    let e = match e {
                        SiteChatError::StreamInterrupted(_) => e,
                        other => SiteChatError::StreamInterrupted(other.to_string()),
                    };
                    warn!(delivered, error = %e, "reply stream interrupted");
                    let _ = tx.send(Err(e)).await;
                    return;
                }
                None => {
                    debug!(delivered, "reply stream completed");
                    return;
                }
            }
        }
    }
}

/// Fragments of one assistant reply, in provider order.
///
/// Dropping the stream cancels the relay and closes the provider connection.
#[derive(Debug)]
pub struct ReplyStream {
    rx: mpsc::Receiver<Result<String>>,
}

impl Stream for ReplyStream {
    type Item = Result<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sitechat_shared::CorpusEntry;

    use super::*;
    use crate::draft::AssistantDraft;
    use crate::grounding::{off_topic_refusal, unanswerable_refusal};
    use crate::mock::MockProvider;

    fn corpus() -> Corpus {
        [CorpusEntry {
            url: "https://a.example/".into(),
            content: "The museum opens at nine.".into(),
        }]
        .into_iter()
        .collect()
    }

    #[tokio::test]
    async fn sends_system_history_then_user() {
        let provider = MockProvider::with_fragments(["ok"]);
        let history = vec![
            Turn::user("first"),
            Turn::system("sneaky override"),
            Turn::assistant("reply"),
        ];

        let stream = stream_reply(
            &provider,
            &corpus(),
            "Dana",
            &history,
            "When does it open?",
            &StreamOptions::default(),
        )
        .await
        .unwrap();
        let _: Vec<_> = stream.collect().await;

        let received = provider.received();
        let sent = &received[0];
        let roles: Vec<Role> = sent.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert!(sent[0].content.contains("https://a.example/"));
        assert_eq!(sent[3].content, "When does it open?");
        assert!(!sent.iter().any(|t| t.content == "sneaky override"));
    }

    #[tokio::test]
    async fn concatenation_matches_draft() {
        let provider = MockProvider::with_fragments(["The ", "museum ", "opens ", "at nine."]);
        let mut stream = stream_reply(
            &provider,
            &corpus(),
            "Dana",
            &[],
            "When?",
            &StreamOptions::default(),
        )
        .await
        .unwrap();

        let mut draft = AssistantDraft::new();
        let mut concatenated = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment.unwrap();
            concatenated.push_str(&fragment);
            draft.push(&fragment);
            assert_eq!(draft.content(), concatenated);
        }
        draft.finalize();

        assert_eq!(draft.content(), "The museum opens at nine.");
        assert_eq!(concatenated, draft.content());
    }

    #[tokio::test]
    async fn blank_message_is_invalid_input() {
        let provider = MockProvider::with_fragments(["never"]);
        let err = stream_reply(&provider, &corpus(), "Dana", &[], "   ", &StreamOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SiteChatError::InvalidInput { .. }));
        assert!(provider.received().is_empty());
    }

    #[tokio::test]
    async fn rejection_is_provider_error() {
        let provider = MockProvider::rejecting("model overloaded");
        let err = stream_reply(&provider, &corpus(), "Dana", &[], "hi", &StreamOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SiteChatError::Provider(_)));
    }

    #[tokio::test]
    async fn failure_before_first_fragment_is_provider_error() {
        let provider = MockProvider::with_fragments(["a", "b"]).interrupt_after(0);
        let err = stream_reply(&provider, &corpus(), "Dana", &[], "hi", &StreamOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SiteChatError::Provider(_)));
    }

    #[tokio::test]
    async fn mid_stream_failure_ends_with_interruption() {
        let provider = MockProvider::with_fragments(["a", "b", "c"]).interrupt_after(2);
        let stream = stream_reply(&provider, &corpus(), "Dana", &[], "hi", &StreamOptions::default())
            .await
            .unwrap();

        let items: Vec<Result<String>> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_deref().unwrap(), "a");
        assert_eq!(items[1].as_deref().unwrap(), "b");
        assert!(matches!(items[2], Err(SiteChatError::StreamInterrupted(_))));
    }

    #[tokio::test]
    async fn empty_corpus_grounds_refusal() {
        let refusal = off_topic_refusal("Dana");
        let provider = MockProvider::with_fragments([refusal.clone()]);

        let stream = stream_reply(
            &provider,
            &Corpus::new(),
            "Dana",
            &[],
            "What is the capital of France?",
            &StreamOptions::default(),
        )
        .await
        .unwrap();
        let reply: String = stream.map(|f| f.unwrap()).collect::<Vec<_>>().await.concat();

        let received = provider.received();
        let system = &received[0][0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains(&refusal));
        assert!(system.content.contains(&unanswerable_refusal("Dana")));
        assert!(system.content.contains("No website content is available"));
        assert_eq!(reply, refusal);
    }

    #[tokio::test]
    async fn dropping_consumer_releases_provider_stream() {
        let fragments: Vec<String> = (0..50).map(|i| format!("f{i} ")).collect();
        let provider = MockProvider::with_fragments(fragments).with_delay(10);
        let options = StreamOptions {
            channel_capacity: 1,
            ..StreamOptions::default()
        };

        let mut stream = stream_reply(&provider, &corpus(), "Dana", &[], "hi", &options)
            .await
            .unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), "f0 ");
        assert_eq!(stream.next().await.unwrap().unwrap(), "f1 ");
        assert_eq!(provider.live_streams(), 1);

        drop(stream);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while provider.live_streams() > 0 {
            assert!(
                tokio::time::Instant::now() < deadline,
                "provider stream not released"
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let emitted = provider.emitted();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.emitted(), emitted);
        assert!(emitted < 50);
    }
}
