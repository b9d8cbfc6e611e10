//! Caller-owned chat session: harvest once, then reply turn by turn over
//! the same corpus and a growing history.

use futures::StreamExt;
use tracing::{info, instrument, warn};

use sitechat_chat::{AssistantDraft, CompletionProvider, StreamOptions, stream_reply};
use sitechat_harvester::{HarvestProgress, Harvester, RenderEngine, SilentProgress};
use sitechat_shared::{AppConfig, Corpus, Result, SiteChatError, Source, Turn};

/// Session-level settings.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Fail [`ChatSession::start`] unless every source was fetched.
    pub require_all_sources: bool,
    pub stream: StreamOptions,
}

impl From<&AppConfig> for SessionOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            require_all_sources: config.harvest.require_all_sources,
            stream: StreamOptions {
                max_corpus_chars: config.grounding.max_corpus_chars,
                ..StreamOptions::default()
            },
        }
    }
}

/// One entry of the session history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTurn {
    pub turn: Turn,
    /// The assistant reply was cut short by a dropped stream.
    pub interrupted: bool,
}

/// Result of one [`ChatSession::reply`] call that got a stream going.
#[derive(Debug)]
pub struct ReplyOutcome {
    /// Everything received, complete or partial.
    pub content: String,
    /// Set when the stream ended early.
    pub error: Option<SiteChatError>,
}

impl ReplyOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// A chat over one fixed corpus.
#[derive(Debug)]
pub struct ChatSession {
    user_name: String,
    sources: Vec<Source>,
    corpus: Corpus,
    history: Vec<SessionTurn>,
    options: SessionOptions,
}

impl ChatSession {
    /// Harvest `urls` and open a session over whatever was fetched.
    pub async fn start<E: RenderEngine>(
        harvester: &Harvester<E>,
        urls: &[String],
        user_name: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        Self::start_with_progress(harvester, urls, user_name, options, &SilentProgress).await
    }

    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn start_with_progress<E: RenderEngine>(
        harvester: &Harvester<E>,
        urls: &[String],
        user_name: &str,
        options: SessionOptions,
        progress: &dyn HarvestProgress,
    ) -> Result<Self> {
        let user_name = validate_user_name(user_name)?;
        let report = harvester.harvest_with_progress(urls, progress).await?;
        Self::from_sources(user_name, report.sources, options)
    }

    /// Open a session over already-harvested sources.
    pub fn from_sources(
        user_name: &str,
        sources: Vec<Source>,
        options: SessionOptions,
    ) -> Result<Self> {
        let user_name = validate_user_name(user_name)?;

        let failed: Vec<String> = sources
            .iter()
            .filter(|s| !s.is_fetched())
            .map(|s| match &s.error {
                Some(error) => format!("{} ({error})", s.url),
                None => s.url.clone(),
            })
            .collect();

        if options.require_all_sources && !failed.is_empty() {
            return Err(SiteChatError::invalid_input(format!(
                "failed to harvest: {}",
                failed.join(", ")
            )));
        }
        if !failed.is_empty() {
            warn!(failed = failed.len(), "starting session without some sources");
        }

        let corpus = Corpus::from_sources(&sources);
        let greeting = SessionTurn {
            turn: Turn::assistant(greeting(user_name, &corpus)),
            interrupted: false,
        };

        info!(
            sources = sources.len(),
            fetched = corpus.len(),
            corpus_chars = corpus.total_chars(),
            "session started"
        );

        Ok(Self {
            user_name: user_name.to_string(),
            sources,
            corpus,
            history: vec![greeting],
            options,
        })
    }

    /// Send `message` and stream the reply, calling `on_fragment` per fragment.
    ///
    /// A blank message is rejected without touching history. Otherwise the
    /// user turn is recorded first; if the provider rejects the request the
    /// error is returned and no assistant turn is added. An interrupted reply
    /// is kept, marked as interrupted, and its error returned in the outcome.
    #[instrument(skip_all, fields(turns = self.history.len()))]
    pub async fn reply<P, F>(
        &mut self,
        provider: &P,
        message: &str,
        mut on_fragment: F,
    ) -> Result<ReplyOutcome>
    where
        P: CompletionProvider + ?Sized,
        F: FnMut(&str),
    {
        if message.trim().is_empty() {
            return Err(SiteChatError::invalid_input("message must not be empty"));
        }

        let history = self.turns();
        self.history.push(SessionTurn {
            turn: Turn::user(message),
            interrupted: false,
        });

        let mut stream = stream_reply(
            provider,
            &self.corpus,
            &self.user_name,
            &history,
            message,
            &self.options.stream,
        )
        .await?;

        let mut draft = AssistantDraft::new();
        let mut error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    draft.push(&fragment);
                    on_fragment(&fragment);
                }
                Err(e) => {
                    draft.interrupt();
                    error = Some(e);
                    break;
                }
            }
        }
        if !draft.is_finalized() {
            draft.finalize();
        }

        let interrupted = draft.is_interrupted();
        let content = draft.content().to_string();
        self.history.push(SessionTurn {
            turn: draft.into_turn(),
            interrupted,
        });

        Ok(ReplyOutcome { content, error })
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// Per-source outcomes, in input order.
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn history(&self) -> &[SessionTurn] {
        &self.history
    }

    /// Plain turns, oldest first, as sent to the provider.
    pub fn turns(&self) -> Vec<Turn> {
        self.history.iter().map(|t| t.turn.clone()).collect()
    }
}

fn validate_user_name(user_name: &str) -> Result<&str> {
    let trimmed = user_name.trim();
    if trimmed.is_empty() {
        return Err(SiteChatError::invalid_input("user name must not be empty"));
    }
    Ok(trimmed)
}

fn greeting(user_name: &str, corpus: &Corpus) -> String {
    if corpus.is_empty() {
        return format!(
            "👋 Hi {user_name}! I wasn't able to ingest any of the websites you provided, \
             so I have no content to answer questions from."
        );
    }

    let list: Vec<String> = corpus.urls().map(|url| format!("• {url}")).collect();
    format!(
        "👋 Hi {user_name}! I've successfully ingested the content from your provided \
         websites. You can now ask me questions about:\n\n{}\n\nWhat would you like to know?",
        list.join("\n")
    )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sitechat_chat::MockProvider;
    use sitechat_harvester::HttpEngine;
    use sitechat_shared::{HarvestConfig, Role};

    use super::*;

    fn sources() -> Vec<Source> {
        vec![
            Source::fetched("https://a.example/", "Alpha opens at nine."),
            Source::failed("https://bad.invalid/", "net::ERR_NAME_NOT_RESOLVED"),
            Source::fetched("https://b.example/", "Beta closes at five."),
        ]
    }

    fn session() -> ChatSession {
        ChatSession::from_sources("Dana", sources(), SessionOptions::default()).unwrap()
    }

    #[test]
    fn greeting_lists_fetched_sources_only() {
        let session = session();

        assert_eq!(session.corpus().len(), 2);
        assert_eq!(session.sources().len(), 3);

        let greeting = &session.history()[0].turn;
        assert_eq!(greeting.role, Role::Assistant);
        assert!(greeting.content.contains("Hi Dana!"));
        assert!(greeting.content.contains("• https://a.example/\n• https://b.example/"));
        assert!(!greeting.content.contains("bad.invalid"));
    }

    #[test]
    fn blank_user_name_is_rejected() {
        let err = ChatSession::from_sources("  ", sources(), SessionOptions::default()).unwrap_err();
        assert!(matches!(err, SiteChatError::InvalidInput { .. }));
    }

    #[test]
    fn require_all_sources_names_failures() {
        let options = SessionOptions {
            require_all_sources: true,
            ..SessionOptions::default()
        };
        let err = ChatSession::from_sources("Dana", sources(), options).unwrap_err();
        assert!(matches!(err, SiteChatError::InvalidInput { .. }));
        assert!(err.to_string().contains("https://bad.invalid/"));
    }

    #[test]
    fn all_failed_still_opens_a_session() {
        let session = ChatSession::from_sources(
            "Dana",
            vec![Source::failed("https://bad.invalid/", "boom")],
            SessionOptions::default(),
        )
        .unwrap();
        assert!(session.corpus().is_empty());
        assert!(session.history()[0].turn.content.contains("wasn't able"));
    }

    #[tokio::test]
    async fn reply_appends_user_and_assistant_turns() {
        let mut session = session();
        let provider = MockProvider::with_fragments(["Alpha ", "opens ", "at nine."]);

        let mut seen = Vec::new();
        let outcome = session
            .reply(&provider, "When does Alpha open?", |f| seen.push(f.to_string()))
            .await
            .unwrap();

        assert!(outcome.is_complete());
        assert_eq!(outcome.content, "Alpha opens at nine.");
        assert_eq!(seen.concat(), outcome.content);

        let history = session.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[1].turn, Turn::user("When does Alpha open?"));
        assert_eq!(history[2].turn, Turn::assistant("Alpha opens at nine."));
        assert!(!history[2].interrupted);

        // The provider saw the greeting as prior history.
        let received = provider.received();
        let sent = &received[0];
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[1].role, Role::Assistant);
        assert_eq!(sent.last().unwrap(), &Turn::user("When does Alpha open?"));
    }

    #[tokio::test]
    async fn interrupted_reply_is_kept_and_marked() {
        let mut session = session();
        let provider = MockProvider::with_fragments(["Alpha ", "opens ", "at nine."]).interrupt_after(2);

        let outcome = session.reply(&provider, "When?", |_| {}).await.unwrap();

        assert!(!outcome.is_complete());
        assert_eq!(outcome.content, "Alpha opens ");
        assert!(matches!(outcome.error, Some(SiteChatError::StreamInterrupted(_))));

        let last = session.history().last().unwrap();
        assert_eq!(last.turn, Turn::assistant("Alpha opens "));
        assert!(last.interrupted);
    }

    #[tokio::test]
    async fn rejected_reply_keeps_only_the_user_turn() {
        let mut session = session();
        let provider = MockProvider::rejecting("quota exceeded");

        let err = session.reply(&provider, "Hello?", |_| {}).await.unwrap_err();

        assert!(matches!(err, SiteChatError::Provider(_)));
        assert_eq!(session.history().len(), 2);
        assert_eq!(session.history()[1].turn, Turn::user("Hello?"));
    }

    #[tokio::test]
    async fn blank_message_leaves_history_untouched() {
        let mut session = session();
        let provider = MockProvider::with_fragments(["x"]);

        let err = session.reply(&provider, " \n ", |_| {}).await.unwrap_err();
        assert!(matches!(err, SiteChatError::InvalidInput { .. }));
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn start_harvests_then_greets() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/"))
            .respond_with(
                wiremock::ResponseTemplate::new(200)
                    .set_body_string("<body><p>Gallery hours: 10 to 6.</p></body>"),
            )
            .mount(&server)
            .await;

        let harvester = Harvester::new(
            HttpEngine::new(),
            HarvestConfig {
                block_private_hosts: false,
                navigation_timeout: Duration::from_secs(5),
                ..HarvestConfig::default()
            },
        );
        let url = format!("{}/", server.uri());

        let session = ChatSession::start(&harvester, &[url.clone()], "Lee", SessionOptions::default())
            .await
            .unwrap();

        assert_eq!(session.user_name(), "Lee");
        assert_eq!(session.corpus().get(&url), Some("Gallery hours: 10 to 6."));
        assert!(session.history()[0].turn.content.contains(&url));
    }

    #[tokio::test]
    async fn start_rejects_blank_name_before_harvesting() {
        let harvester = Harvester::new(HttpEngine::new(), HarvestConfig::default());
        let err = ChatSession::start(
            &harvester,
            &["https://a.example/".to_string()],
            "",
            SessionOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SiteChatError::InvalidInput { .. }));
    }
}
