//! Intent classification
//!
//! The external classifier answers with a comma-separated list of
//! `"<category> <argument>"` entries. [`Classifier`] filters that list
//! against the fixed vocabulary, retries a bounded number of times when the
//! model echoes its prompt placeholder, and always yields at least one
//! entry by falling back to `general <text>`.

mod llm;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

pub use llm::LlmClassifier;

use crate::Result;

/// Placeholder a confused model copies from its instructions
const QUERY_PLACEHOLDER: &str = "(query)";

/// Intent category of a classified utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    General,
    Realtime,
    Open,
    Close,
    Play,
    System,
    Content,
    GoogleSearch,
    YoutubeSearch,
    Exit,
}

impl Category {
    /// Every category, in vocabulary order
    pub const ALL: [Self; 10] = [
        Self::Exit,
        Self::General,
        Self::Realtime,
        Self::Open,
        Self::Close,
        Self::Play,
        Self::System,
        Self::Content,
        Self::GoogleSearch,
        Self::YoutubeSearch,
    ];

    /// Keyword the classifier emits for this category
    #[must_use]
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Realtime => "realtime",
            Self::Open => "open",
            Self::Close => "close",
            Self::Play => "play",
            Self::System => "system",
            Self::Content => "content",
            Self::GoogleSearch => "google search",
            Self::YoutubeSearch => "youtube search",
            Self::Exit => "exit",
        }
    }

    /// Category for an exact keyword
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let keyword = keyword.trim().to_lowercase();
        Self::ALL.into_iter().find(|c| c.keyword() == keyword)
    }

    /// `snake_case` name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GoogleSearch => "google_search",
            Self::YoutubeSearch => "youtube_search",
            other => other.keyword(),
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified utterance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Command {
    /// The utterance as captured
    pub raw_text: String,
    pub category: Category,
    /// Category argument (app name, question, ...); may be empty
    pub query: String,
}

impl Command {
    #[must_use]
    pub fn new(raw_text: impl Into<String>, category: Category, query: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            category,
            query: query.into(),
        }
    }

    /// The deterministic fallback: a `general` question for the whole text
    #[must_use]
    pub fn general(raw_text: &str) -> Self {
        Self::new(raw_text, Category::General, raw_text)
    }

    /// Split one filtered classifier entry into category and argument
    ///
    /// Two-word keywords are matched first; otherwise the category is the
    /// first token and the argument is the remaining tokens joined by
    /// single spaces.
    #[must_use]
    pub fn from_entry(raw_text: &str, entry: &str) -> Option<Self> {
        let tokens: Vec<&str> = entry.split_whitespace().collect();

        if tokens.len() >= 2 {
            let pair = format!("{} {}", tokens[0], tokens[1]);
            if let Some(category) = Category::from_keyword(&pair) {
                return Some(Self::new(raw_text, category, tokens[2..].join(" ")));
            }
        }

        let category = Category::from_keyword(tokens.first()?)?;
        Some(Self::new(raw_text, category, tokens[1..].join(" ")))
    }
}

/// Fixed classifier vocabulary
pub const VOCABULARY: [&str; 10] = [
    "exit",
    "general",
    "realtime",
    "open",
    "close",
    "play",
    "system",
    "content",
    "google search",
    "youtube search",
];

/// Whether `entry` starts with `keyword` as a whole word, ignoring case
fn starts_with_keyword(entry: &str, keyword: &str) -> bool {
    let Some(head) = entry.get(..keyword.len()) else {
        return false;
    };
    head.eq_ignore_ascii_case(keyword)
        && entry[keyword.len()..]
            .chars()
            .next()
            .is_none_or(char::is_whitespace)
}

/// Normalize a raw classifier reply into vocabulary-prefixed entries
#[must_use]
pub fn filter_response(raw: &str) -> Vec<String> {
    raw.replace('\n', "")
        .split(',')
        .map(str::trim)
        .filter(|entry| VOCABULARY.iter().any(|kw| starts_with_keyword(entry, kw)))
        .map(str::to_string)
        .collect()
}

/// Literal exit phrases that stop the agent without classification
#[must_use]
pub fn is_exit_phrase(text: &str) -> bool {
    let text = text
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation())
        .to_lowercase();
    matches!(text.as_str(), "exit" | "quit" | "stop")
}

/// External intent classifier
#[async_trait]
pub trait ClassifierService: Send + Sync {
    /// Raw comma-separated classification of `text`
    async fn classify(&self, text: &str) -> Result<String>;
}

/// Vocabulary filter, bounded retry and fallback over a [`ClassifierService`]
#[derive(Clone)]
pub struct Classifier {
    service: Arc<dyn ClassifierService>,
    max_attempts: u32,
}

impl Classifier {
    pub fn new(service: Arc<dyn ClassifierService>, max_attempts: u32) -> Self {
        Self {
            service,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Ordered, never-empty list of `"<category> <argument>"` entries
    pub async fn categorize(&self, text: &str) -> Vec<String> {
        let fallback = || vec![format!("general {text}")];

        for attempt in 1..=self.max_attempts {
            let raw = match self.service.classify(text).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "classifier call failed, using fallback");
                    return fallback();
                }
            };

            let entries = filter_response(&raw);
            if entries.iter().any(|e| e.contains(QUERY_PLACEHOLDER)) {
                tracing::debug!(attempt, raw = %raw, "classifier echoed placeholder, retrying");
                continue;
            }

            if entries.is_empty() {
                tracing::debug!(raw = %raw, "no recognized categories, using fallback");
                return fallback();
            }

            tracing::debug!(?entries, "classified");
            return entries;
        }

        tracing::warn!(attempts = self.max_attempts, "classifier kept echoing placeholder");
        fallback()
    }

    /// Classify `text` into a single command
    ///
    /// Only the first entry is acted upon; further intents in the same
    /// utterance are logged and dropped.
    pub async fn classify(&self, text: &str) -> Command {
        let entries = self.categorize(text).await;
        if entries.len() > 1 {
            tracing::info!(dropped = ?&entries[1..], "ignoring additional intents");
        }

        entries
            .first()
            .and_then(|entry| Command::from_entry(text, entry))
            .unwrap_or_else(|| Command::general(text))
    }
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_against_vocabulary() {
        let entries = filter_response("open chrome, banana split,\n general who was akbar?");
        assert_eq!(entries, ["open chrome", "general who was akbar?"]);
    }

    #[test]
    fn keyword_match_is_whole_word_and_case_insensitive() {
        assert_eq!(filter_response("Open camera"), ["Open camera"]);
        assert_eq!(filter_response("exit"), ["exit"]);
        assert!(filter_response("opener things").is_empty());
        assert!(filter_response("generalize this").is_empty());
        // multibyte text must not panic on the prefix slice
        assert!(filter_response("ééé").is_empty());
    }

    #[test]
    fn reminder_is_not_in_vocabulary() {
        assert!(filter_response("reminder 11pm dance").is_empty());
    }

    #[test]
    fn splits_single_word_categories() {
        let cmd = Command::from_entry("open the camera", "open   camera  app").unwrap();
        assert_eq!(cmd.category, Category::Open);
        assert_eq!(cmd.query, "camera app");
        assert_eq!(cmd.raw_text, "open the camera");
    }

    #[test]
    fn two_word_categories_are_recognized() {
        let cmd = Command::from_entry("x", "google search rust lifetimes").unwrap();
        assert_eq!(cmd.category, Category::GoogleSearch);
        assert_eq!(cmd.query, "rust lifetimes");

        let cmd = Command::from_entry("x", "YouTube Search lofi").unwrap();
        assert_eq!(cmd.category, Category::YoutubeSearch);
        assert_eq!(cmd.query, "lofi");
    }

    #[test]
    fn bare_keyword_has_empty_query() {
        let cmd = Command::from_entry("bye", "exit").unwrap();
        assert_eq!(cmd.category, Category::Exit);
        assert!(cmd.query.is_empty());
    }

    #[test]
    fn unknown_entry_is_rejected() {
        assert!(Command::from_entry("x", "reminder tomorrow").is_none());
        assert!(Command::from_entry("x", "").is_none());
    }

    #[test]
    fn exit_phrases() {
        assert!(is_exit_phrase("exit"));
        assert!(is_exit_phrase(" Quit. "));
        assert!(is_exit_phrase("stop!"));
        assert!(!is_exit_phrase("stop the music"));
    }

    #[test]
    fn category_names() {
        assert_eq!(Category::GoogleSearch.to_string(), "google_search");
        assert_eq!(Category::Open.to_string(), "open");
        assert_eq!(
            serde_json::to_value(Category::YoutubeSearch).unwrap(),
            "youtube_search"
        );
        for category in Category::ALL {
            assert_eq!(Category::from_keyword(category.keyword()), Some(category));
        }
    }
}
