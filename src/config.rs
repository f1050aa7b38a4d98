//! Dispatch configuration

pub const DEFAULT_UNKNOWN_ANSWER: &str = "Sorry, I didn't understand :(";
pub const DEFAULT_RAG_EXCLUDED_ANSWER: &str = "Sorry, I can't answer your question (Topic not covered)";

/// Settings of the RAG fallback story
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RagConfig {
    /// Route unmatched intents to the RAG story instead of the unknown story
    pub enabled: bool,
}

/// Configuration of a bot definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    pub bot_id: String,
    pub namespace: String,
    pub rag: RagConfig,
    pub unknown_answer: String,
    pub rag_excluded_answer: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            bot_id: "bot".to_string(),
            namespace: "app".to_string(),
            rag: RagConfig::default(),
            unknown_answer: DEFAULT_UNKNOWN_ANSWER.to_string(),
            rag_excluded_answer: DEFAULT_RAG_EXCLUDED_ANSWER.to_string(),
        }
    }
}

impl DispatchConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the settings through `lookup`; missing keys keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bot_id: lookup("STORYLINE_BOT_ID").unwrap_or(defaults.bot_id),
            namespace: lookup("STORYLINE_NAMESPACE").unwrap_or(defaults.namespace),
            rag: RagConfig {
                enabled: lookup("STORYLINE_RAG_ENABLED").is_some_and(|v| parse_flag(&v)),
            },
            unknown_answer: lookup("STORYLINE_UNKNOWN_ANSWER").unwrap_or(defaults.unknown_answer),
            rag_excluded_answer: lookup("STORYLINE_RAG_EXCLUDED_ANSWER")
                .unwrap_or(defaults.rag_excluded_answer),
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
