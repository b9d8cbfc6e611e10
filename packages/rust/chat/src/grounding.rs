//! Grounding instruction: the synthesized system turn that confines the
//! assistant to the harvested corpus.

use tracing::warn;

use sitechat_shared::{Corpus, Turn};

const TRUNCATION_MARKER: &str = " [truncated]";

/// Reply for questions unrelated to the corpus.
pub fn off_topic_refusal(user_name: &str) -> String {
    format!(
        "I apologize {user_name}, but I can only provide information from the specified \
         websites. This question appears to be outside the scope of the website content I \
         have access to."
    )
}

/// Reply for questions whose answer is not explicitly in the corpus.
pub fn unanswerable_refusal(user_name: &str) -> String {
    format!(
        "I apologize {user_name}, but I cannot definitively answer this as it's not \
         explicitly stated in the website content I have access to."
    )
}

/// Build the system turn for `corpus` with no size limit.
pub fn build_system_turn(corpus: &Corpus, user_name: &str) -> Turn {
    build_system_turn_with_budget(corpus, user_name, 0)
}

/// Build the system turn, capping the embedded page text at `max_corpus_chars`
/// characters in total (`0` means unbounded).
///
/// Over budget, every source gets an equal share; texts longer than their
/// share are cut and marked. The URL list is never shortened.
pub fn build_system_turn_with_budget(
    corpus: &Corpus,
    user_name: &str,
    max_corpus_chars: usize,
) -> Turn {
    let per_source = per_source_budget(corpus, max_corpus_chars);
    let mut prompt = String::new();

    prompt.push_str(
        "You are an AI assistant strictly limited to discussing ONLY the content from the \
         following websites:\n",
    );
    if corpus.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        let urls: Vec<String> = corpus.urls().map(|url| format!("- {url}")).collect();
        prompt.push_str(&urls.join("\n"));
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\nYou are chatting with {user_name}. Address them by name in your responses.\n\n\
         IMPORTANT INSTRUCTIONS:\n\
         1. ONLY provide information that is explicitly present in the website contents below\n\
         2. If a question is not related to these websites, respond with: \"{off_topic}\"\n\
         3. If you're unsure whether something is explicitly stated in the content, respond \
         with: \"{unanswerable}\"\n\
         4. Do not make assumptions or provide information beyond what is directly stated in \
         these websites.\n",
        off_topic = off_topic_refusal(user_name),
        unanswerable = unanswerable_refusal(user_name),
    ));
    if corpus.is_empty() {
        prompt.push_str(
            "5. No website content is available. Answer every question with one of the two \
             responses above and nothing else.\n",
        );
    }

    prompt.push_str("\nWebsite contents:\n");
    if corpus.is_empty() {
        prompt.push_str("(none)");
    } else {
        let blocks: Vec<String> = corpus
            .iter()
            .map(|entry| {
                let content = match per_source {
                    Some(limit) => truncate_chars(&entry.content, limit),
                    None => entry.content.clone(),
                };
                format!("\nURL: {}\nContent: {content}\n---", entry.url)
            })
            .collect();
        prompt.push_str(&blocks.join("\n"));
    }

    Turn::system(prompt)
}

/// Per-source character share when the corpus exceeds the budget.
fn per_source_budget(corpus: &Corpus, max_corpus_chars: usize) -> Option<usize> {
    if max_corpus_chars == 0 || corpus.is_empty() {
        return None;
    }
    let total = corpus.total_chars();
    if total <= max_corpus_chars {
        return None;
    }

    let share = max_corpus_chars / corpus.len();
    warn!(
        total_chars = total,
        max_corpus_chars,
        sources = corpus.len(),
        per_source = share,
        "corpus exceeds budget, truncating page texts"
    );
    Some(share)
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => format!("{}{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}
