//! Dispatch runtimes
//!
//! A turn is driven by the pure [`transition`] function. Each dispatcher
//! executes the effects it returns and feeds back the resulting events:
//! [`DirectDispatcher`] on the calling thread, [`SuspendingDispatcher`] as a
//! future that yields whenever a handler or step suspends. Everything but the
//! collaborator calls lives in [`TurnScope`], shared by both.

mod direct;
mod suspending;

#[cfg(test)]
mod testing;

pub use direct::DirectDispatcher;
pub use suspending::SuspendingDispatcher;

use crate::bus::Bus;
use crate::definition::handler::HandlerInstance;
use crate::definition::{
    BotDefinition, DefinitionContext, Handler, HandlerError, Intent, StepDefinition, StoryDefinition,
    TurnData,
};
use crate::state_machine::{
    transition, CompletionProbe, Effect, Event, SelectedStep, TransitionError, TurnContext, TurnState,
};
use std::sync::Arc;
use thiserror::Error;

/// Errors escaping a dispatch
///
/// Handler errors are passed through unchanged; the runtime does not retry.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Step {0} is not declared by the dispatched story")]
    UnknownStep(String),
    #[error("No handler definition was built for the turn")]
    MissingInstance,
    #[error("The {part} of story {story} may suspend, dispatch it with the suspending dispatcher")]
    Suspending { story: String, part: String },
}

/// What happened during one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub story_id: Option<String>,
    /// States entered, in order
    pub states: Vec<TurnState>,
    /// Step that ran, if any
    pub step: Option<String>,
    /// Dispatch of the unknown story when the interface was not supported
    pub redirect: Option<Box<TurnOutcome>>,
}

impl TurnOutcome {
    pub fn final_state(&self) -> Option<&TurnState> {
        self.states.last()
    }

    /// The dispatch that actually answered, following redirects
    pub fn answering(&self) -> &TurnOutcome {
        self.redirect.as_deref().map_or(self, TurnOutcome::answering)
    }
}

/// Picks the step of the turn.
///
/// Root steps are scanned in declaration order and the first one triggered
/// wins. A step is triggered by its selector, or by its entity rule when the
/// current intent is compatible with the step. When no step is triggered, the
/// step already on the bus stays in effect.
pub fn select_step<'s>(story: &'s StoryDefinition, bus: &dyn Bus, data: &TurnData) -> Option<&'s StepDefinition> {
    story
        .steps()
        .iter()
        .find(|step| is_triggered(story, step, bus, data))
        .or_else(|| bus.step().and_then(|name| story.find_step(name)))
}

fn is_triggered(story: &StoryDefinition, step: &StepDefinition, bus: &dyn Bus, data: &TurnData) -> bool {
    step.selector().is_some_and(|selector| selector.evaluate(bus, data))
        || step
            .entity_selection()
            .is_some_and(|rule| rule.matches(bus) && intent_compatible(story, step, bus.intent()))
}

fn intent_compatible(story: &StoryDefinition, step: &StepDefinition, intent: Option<&Intent>) -> bool {
    intent.map_or(true, |intent| {
        !step.has_starter_intents() || step.is_starter_intent(intent) || story.supports_intent(intent)
    })
}

/// Effect split between the shared scope and the dispatcher binding
pub(crate) enum Work {
    /// Handled by the scope, with the event to feed back
    Done(Option<Event>),
    CheckPreconditions,
    RefineStepData(String),
    RunStep(String),
    RunDefault,
    Redirect,
}

/// Per-turn state shared by the dispatcher bindings
pub(crate) struct TurnScope<'d> {
    definition: &'d BotDefinition,
    story: Option<Arc<StoryDefinition>>,
    handler: Handler,
    context: TurnContext,
    state: TurnState,
    states: Vec<TurnState>,
    data: TurnData,
    step_data: TurnData,
    no_data: TurnData,
    instance: Option<HandlerInstance>,
    step: Option<String>,
}

impl<'d> TurnScope<'d> {
    pub(crate) fn new(definition: &'d BotDefinition, story: Option<Arc<StoryDefinition>>, handler: Handler) -> Self {
        let context = TurnContext::new(
            story.as_ref().map(|s| s.id().to_string()),
            definition.unknown_story().id(),
        );
        Self {
            definition,
            story,
            handler,
            context,
            state: TurnState::Idle,
            states: Vec::new(),
            data: TurnData::none(),
            step_data: TurnData::none(),
            no_data: TurnData::none(),
            instance: None,
            step: None,
        }
    }

    pub(crate) fn story_id(&self) -> Option<&str> {
        self.context.story_id.as_deref()
    }

    pub(crate) fn handler(&self) -> &Handler {
        &self.handler
    }

    /// Interface check
    pub(crate) fn start(&mut self, bus: &dyn Bus) -> Result<Vec<Effect>, DispatchError> {
        tracing::info!(
            story = ?self.story_id(),
            intent = ?bus.intent().map(Intent::name),
            interface = ?bus.user_interface_type(),
            "dispatching turn"
        );
        let interface_supported = self
            .story
            .as_ref()
            .map_or(true, |story| story.supports_interface(bus.user_interface_type()));
        self.apply(Event::TurnStarted { interface_supported })
    }

    pub(crate) fn apply(&mut self, event: Event) -> Result<Vec<Effect>, DispatchError> {
        let result = transition(&self.state, &self.context, event)?;
        tracing::debug!(story = ?self.story_id(), from = ?self.state, to = ?result.new_state, "turn transition");
        self.state = result.new_state.clone();
        self.states.push(result.new_state);
        Ok(result.effects)
    }

    /// Runs the effects needing no collaborator call.
    pub(crate) fn prepare(&mut self, effect: Effect, bus: &mut dyn Bus) -> Result<Work, DispatchError> {
        Ok(match effect {
            Effect::RedirectToUnknown => {
                tracing::info!(
                    story = ?self.story_id(),
                    interface = ?bus.user_interface_type(),
                    "interface not supported, redirecting to the unknown story"
                );
                Work::Redirect
            }
            Effect::CheckPreconditions => Work::CheckPreconditions,
            Effect::InstantiateHandler => {
                let ctx = DefinitionContext {
                    bus: &*bus,
                    data: &self.data,
                    connectors: self.definition.connectors(),
                };
                self.instance = Some(self.handler.instantiate(&ctx)?);
                Work::Done(Some(Event::HandlerInstantiated))
            }
            Effect::SelectStep => {
                let step = self
                    .story
                    .as_deref()
                    .and_then(|story| select_step(story, &*bus, &self.data))
                    .map(|step| SelectedStep {
                        name: step.name().to_string(),
                        refines: step.refines_data(),
                    });
                Work::Done(Some(Event::StepSelected { step }))
            }
            Effect::SetCurrentStep { step } => {
                bus.set_step(Some(step.clone()));
                self.step = Some(step);
                Work::Done(None)
            }
            Effect::RefineStepData { step } => Work::RefineStepData(step),
            Effect::RunStep { step } => Work::RunStep(step),
            Effect::RunDefault => Work::RunDefault,
            Effect::WarnUnanswered => {
                tracing::warn!(
                    story = ?self.story_id(),
                    step = ?self.step,
                    intent = ?bus.intent().map(Intent::name),
                    "no answer produced for the turn"
                );
                Work::Done(None)
            }
        })
    }

    pub(crate) fn preconditions_checked(&mut self, data: TurnData, bus: &dyn Bus) -> Event {
        self.step_data = data.clone();
        self.data = data;
        Event::PreconditionsChecked {
            probe: CompletionProbe::of(bus),
        }
    }

    pub(crate) fn step_data_refined(&mut self, refined: Option<TurnData>, bus: &dyn Bus) -> Event {
        if let Some(refined) = refined {
            self.step_data = refined;
        }
        Event::StepDataRefined {
            probe: CompletionProbe::of(bus),
        }
    }

    /// The story declaring the step, kept alive independently of the scope
    pub(crate) fn story_of_step(&self, name: &str) -> Result<Arc<StoryDefinition>, DispatchError> {
        self.story
            .as_ref()
            .filter(|story| story.find_step(name).is_some())
            .map(Arc::clone)
            .ok_or_else(|| DispatchError::UnknownStep(name.to_string()))
    }

    /// Data seen by a step body: the step data for data steps, nothing otherwise
    pub(crate) fn step_input(&self, step: &StepDefinition) -> &TurnData {
        if step.is_data_step() {
            &self.step_data
        } else {
            &self.no_data
        }
    }

    pub(crate) fn instance(&mut self) -> Result<&mut HandlerInstance, DispatchError> {
        self.instance.as_mut().ok_or(DispatchError::MissingInstance)
    }

    pub(crate) fn finish(self, redirect: Option<TurnOutcome>) -> TurnOutcome {
        tracing::info!(story = ?self.story_id(), state = ?self.state, step = ?self.step, "turn dispatched");
        TurnOutcome {
            story_id: self.context.story_id,
            states: self.states,
            step: self.step,
            redirect: redirect.map(Box::new),
        }
    }
}
