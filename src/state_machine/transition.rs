//! Pure turn transition function
//!
//! Given the same state, context and event it always yields the same next
//! state and effects. The order of a turn is fixed: interface check,
//! preconditions, handler instantiation, step selection, step, default
//! answer, completion diagnostic.

use super::{CompletionProbe, Effect, Event, SelectedStep, TurnContext, TurnState};
use thiserror::Error;

/// Result of a turn transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: TurnState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: TurnState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Turn already over in state {0:?}")]
    TurnOver(TurnState),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

pub fn transition(
    state: &TurnState,
    context: &TurnContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // Interface check. The unknown story is exempt, it is the redirect target.
        (TurnState::Idle, Event::TurnStarted { interface_supported }) => {
            if interface_supported || context.is_unknown_story() {
                Ok(TransitionResult::new(TurnState::CheckingPreconditions)
                    .with_effect(Effect::CheckPreconditions))
            } else {
                Ok(TransitionResult::new(TurnState::Redirected {
                    to: context.unknown_story_id.clone(),
                })
                .with_effect(Effect::RedirectToUnknown))
            }
        }

        (TurnState::CheckingPreconditions, Event::PreconditionsChecked { probe }) => {
            if probe.completed {
                Ok(TransitionResult::new(TurnState::EndedEarly))
            } else {
                Ok(TransitionResult::new(TurnState::Instantiating).with_effect(Effect::InstantiateHandler))
            }
        }

        (TurnState::Instantiating, Event::HandlerInstantiated) => {
            Ok(TransitionResult::new(TurnState::SelectingStep).with_effect(Effect::SelectStep))
        }

        (TurnState::SelectingStep, Event::StepSelected { step: None }) => {
            Ok(TransitionResult::new(TurnState::RunningDefault).with_effect(Effect::RunDefault))
        }

        (TurnState::SelectingStep, Event::StepSelected { step: Some(SelectedStep { name, refines }) }) => {
            let result = TransitionResult::new(if refines {
                TurnState::RefiningStepData { step: name.clone() }
            } else {
                TurnState::RunningStep { step: name.clone() }
            })
            .with_effect(Effect::SetCurrentStep { step: name.clone() });
            Ok(if refines {
                result.with_effect(Effect::RefineStepData { step: name })
            } else {
                result.with_effect(Effect::RunStep { step: name })
            })
        }

        (TurnState::RefiningStepData { step }, Event::StepDataRefined { probe }) => {
            if probe.completed {
                Ok(TransitionResult::new(TurnState::EndedEarly))
            } else {
                Ok(TransitionResult::new(TurnState::RunningStep { step: step.clone() })
                    .with_effect(Effect::RunStep { step: step.clone() }))
            }
        }

        (TurnState::RunningStep { .. }, Event::StepCompleted { probe }) => {
            if probe.completed {
                Ok(TransitionResult::new(TurnState::Finished { answered: true }))
            } else {
                Ok(TransitionResult::new(TurnState::RunningDefault).with_effect(Effect::RunDefault))
            }
        }

        (TurnState::RunningDefault, Event::DefaultCompleted { probe }) => Ok(finish(probe)),

        (state, _) if state.is_terminal() => Err(TransitionError::TurnOver(state.clone())),

        (state, event) => Err(TransitionError::InvalidTransition(format!(
            "{state:?} does not accept {event:?}"
        ))),
    }
}

/// Completion diagnostic: an unanswered turn is only worth a warning when
/// nobody skipped the answer or switched story.
fn finish(probe: CompletionProbe) -> TransitionResult {
    let result = TransitionResult::new(TurnState::Finished {
        answered: probe.completed,
    });
    if probe.completed || probe.skip_answer || probe.story_switched {
        result
    } else {
        result.with_effect(Effect::WarnUnanswered)
    }
}
