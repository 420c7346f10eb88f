//! Keyword intent classification for chat messages.

const GREETINGS: &[&str] = &["hi", "hello", "hey", "hiya", "howdy", "greetings", "good morning", "good afternoon", "good evening"];
const THANKS: &[&str] = &["thanks", "thank you", "thx", "ty", "cheers", "much appreciated"];
const FAREWELLS: &[&str] = &["bye", "goodbye", "good bye", "see you", "see ya", "good night", "later", "farewell"];
const SUMMARY_MARKERS: &[&str] = &["summarize", "summarise", "summary", "tl;dr", "tldr", "key points", "main points", "overview", "the gist"];
const QUESTION_LEADS: &[&str] = &[
    "what", "why", "how", "when", "where", "who", "whom", "whose", "which", "is", "are", "was", "were", "can", "could",
    "do", "does", "did", "should", "would", "will", "has", "have",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Greeting,
    Thanks,
    Farewell,
    Summary,
    Question,
    Unknown,
}

impl Intent {
    /// Deterministic and offline. Small talk only matches short messages, so
    /// "hello, what is this post about?" is a question.
    pub fn classify(message: &str) -> Self {
        let lower = message.trim().to_lowercase();
        let bare = lower.trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
        let word_count = bare.split_whitespace().count();
        if bare.is_empty() {
            return Self::Unknown;
        }

        let is_question = lower.ends_with('?');
        if !is_question && word_count <= 4 {
            if matches_phrase(bare, GREETINGS) {
                return Self::Greeting;
            }
            if matches_phrase(bare, THANKS) || bare.starts_with("thank") {
                return Self::Thanks;
            }
            if matches_phrase(bare, FAREWELLS) {
                return Self::Farewell;
            }
        }

        if SUMMARY_MARKERS.iter().any(|m| lower.contains(m)) {
            return Self::Summary;
        }

        let first = bare.split(|c: char| c.is_whitespace() || c == ',').next().unwrap_or_default();
        if is_question
            || QUESTION_LEADS.contains(&first)
            || bare.starts_with("tell me")
            || bare.starts_with("explain")
        {
            return Self::Question;
        }

        Self::Unknown
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Thanks => "thanks",
            Self::Farewell => "farewell",
            Self::Summary => "summary",
            Self::Question => "question",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_small_talk(&self) -> bool {
        matches!(self, Self::Greeting | Self::Thanks | Self::Farewell)
    }

    /// Reply used when small talk skips retrieval and generation.
    pub fn canned_reply(&self) -> Option<&'static str> {
        match self {
            Self::Greeting => Some("Hello! Ask me anything about this post."),
            Self::Thanks => Some("You're welcome!"),
            Self::Farewell => Some("Goodbye!"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Exact phrase, or the phrase followed by more words ("hey there").
fn matches_phrase(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| {
        text == *p || text.strip_prefix(p).map_or(false, |rest| rest.starts_with(|c: char| c.is_whitespace() || c == ','))
    })
}
