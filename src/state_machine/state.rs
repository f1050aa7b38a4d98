//! Turn state types

use serde::{Deserialize, Serialize};

/// Where a dispatch turn stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnState {
    /// Nothing ran yet
    #[default]
    Idle,

    /// Story preconditions are running
    CheckingPreconditions,

    /// The handler definition is being built from the bus and the data
    Instantiating,

    /// Looking for the step of the turn
    SelectingStep,

    /// The selected data step refines the precondition data
    RefiningStepData { step: String },

    /// The selected step body is running
    RunningStep { step: String },

    /// The handler default answer is running
    RunningDefault,

    /// The story does not support the interface; the unknown story takes over
    Redirected { to: String },

    /// Preconditions ended the turn; nothing else runs
    EndedEarly,

    /// Dispatch is over. `answered` tells whether a final answer exists.
    Finished { answered: bool },
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Redirected { .. } | TurnState::EndedEarly | TurnState::Finished { .. }
        )
    }
}

/// Immutable facts about the turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnContext {
    /// Dispatched story. `None` for a handler owned by no story.
    pub story_id: Option<String>,
    pub unknown_story_id: String,
}

impl TurnContext {
    pub fn new(story_id: Option<String>, unknown_story_id: impl Into<String>) -> Self {
        Self {
            story_id,
            unknown_story_id: unknown_story_id.into(),
        }
    }

    /// The unknown story is the redirect target and is never redirected itself.
    pub fn is_unknown_story(&self) -> bool {
        self.story_id.as_deref() == Some(self.unknown_story_id.as_str())
    }
}
