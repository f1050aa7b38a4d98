//! Built-in fallback stories, used when a bot does not declare its own

use super::handler::{Handler, HandlerResult};
use super::intent::RESERVED_NAMESPACE;
use super::{Intent, StoryDefinition};
use crate::bus::Bus;
use std::collections::HashMap;
use std::sync::Arc;

/// Answers a keyword sent in place of a sentence
pub type KeywordListener = Arc<dyn Fn(&mut dyn Bus) -> HandlerResult + Send + Sync>;

/// Marks the sentence as not understood and apologizes.
pub(crate) fn unknown_story(answer: String) -> StoryDefinition {
    StoryDefinition::simple(
        Intent::unknown(),
        Handler::from_fn(move |bus| {
            bus.mark_as_unknown();
            bus.end(&answer);
            Ok(())
        }),
    )
}

/// Runs the listener registered for the user text.
pub(crate) fn keyword_story(listeners: HashMap<String, KeywordListener>) -> StoryDefinition {
    StoryDefinition::simple(
        Intent::keyword(),
        Handler::from_fn(move |bus| {
            let text = bus.user_text().unwrap_or_default().to_string();
            match listeners.get(&text) {
                Some(listener) => listener(bus),
                None => {
                    tracing::debug!(keyword = %text, "no keyword listener");
                    bus.end(&format!("unknown keyword : {text}"));
                    Ok(())
                }
            }
        }),
    )
}

pub(crate) fn rag_excluded_story(answer: String) -> StoryDefinition {
    StoryDefinition::simple(
        Intent::rag_excluded(),
        Handler::from_fn(move |bus| {
            bus.end(&answer);
            Ok(())
        }),
    )
}

/// Placeholder RAG story: behaves like the unknown story until a real one is supplied.
pub(crate) fn rag_story(answer: String) -> StoryDefinition {
    StoryDefinition::simple(
        Intent::new(format!("{RESERVED_NAMESPACE}:rag")),
        Handler::from_fn(move |bus| {
            bus.mark_as_unknown();
            bus.end(&answer);
            Ok(())
        }),
    )
}
