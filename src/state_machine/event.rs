//! Events reported by the dispatchers

use crate::bus::Bus;

/// Bus flags read after each collaborator call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompletionProbe {
    /// A final answer closes the turn
    pub completed: bool,
    pub skip_answer: bool,
    pub story_switched: bool,
}

impl CompletionProbe {
    /// Reads the flags; completion is re-derived from the log on every call.
    pub fn of(bus: &dyn Bus) -> Self {
        Self {
            completed: bus.is_completed(),
            skip_answer: bus.answer_skipped(),
            story_switched: bus.story_switched(),
        }
    }

    pub fn completed() -> Self {
        Self {
            completed: true,
            ..Self::default()
        }
    }
}

/// A step picked by the selector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedStep {
    pub name: String,
    /// The step runs its own preconditions before the body
    pub refines: bool,
}

/// Events that trigger turn transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    TurnStarted { interface_supported: bool },
    PreconditionsChecked { probe: CompletionProbe },
    HandlerInstantiated,
    StepSelected { step: Option<SelectedStep> },
    StepDataRefined { probe: CompletionProbe },
    StepCompleted { probe: CompletionProbe },
    DefaultCompleted { probe: CompletionProbe },
}
