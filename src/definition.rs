//! Bot definition model
//!
//! Intents, stories and their steps, story handlers, and the registry
//! resolving an intent name to the story that handles it.

mod fallback;
pub mod handler;
mod intent;
mod registry;
mod step;
mod story;

#[cfg(test)]
mod proptests;

pub use fallback::KeywordListener;
pub use handler::{
    AsyncHandlerDefinition, AsyncStoryHandler, ConfigurableStoryHandler, DefinitionContext, Handler,
    HandlerDefinition, HandlerError, HandlerResult, SimpleStoryHandler, StoryHandler, TurnData,
};
pub use intent::{Intent, RESERVED_NAMESPACE};
pub use registry::{resolve_intent, resolve_story, BotDefinition, BotDefinitionBuilder, Fallbacks};
pub use step::{AsyncStepBody, EntityStepSelection, StepDefinition, StepSelector};
pub use story::{StoryBuilder, StoryDefinition, StoryTag};

use thiserror::Error;

/// Errors detected while building a bot definition
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DefinitionError {
    #[error("story {story} has no starter intent")]
    MissingMainIntent { story: String },
    #[error("story id {0} is declared twice")]
    DuplicateStoryId(String),
}
