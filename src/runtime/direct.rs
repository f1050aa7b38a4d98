//! Direct-call dispatcher
//!
//! Every collaborator call completes on the calling thread. A story whose
//! handler or steps may suspend is refused before anything runs: those need
//! the executor of the [`SuspendingDispatcher`](super::SuspendingDispatcher).

use super::{DispatchError, TurnOutcome, TurnScope, Work};
use crate::bus::Bus;
use crate::definition::{BotDefinition, Handler, StoryDefinition};
use crate::state_machine::{CompletionProbe, Event};
use std::collections::VecDeque;
use std::sync::Arc;

/// Dispatcher running a turn on the calling thread
#[derive(Debug, Clone)]
pub struct DirectDispatcher {
    definition: Arc<BotDefinition>,
}

impl DirectDispatcher {
    pub fn new(definition: Arc<BotDefinition>) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &Arc<BotDefinition> {
        &self.definition
    }

    /// Runs the story handler for this turn.
    pub fn dispatch(&self, story: &Arc<StoryDefinition>, bus: &mut dyn Bus) -> Result<TurnOutcome, DispatchError> {
        self.run(Some(Arc::clone(story)), story.handler().clone(), bus)
    }

    /// Runs a handler; steps are selected from the story owning it, if any.
    pub fn dispatch_handler(&self, handler: &Handler, bus: &mut dyn Bus) -> Result<TurnOutcome, DispatchError> {
        let story = self.definition.find_story_by_handler(handler).cloned();
        self.run(story, handler.clone(), bus)
    }

    fn run(
        &self,
        story: Option<Arc<StoryDefinition>>,
        handler: Handler,
        bus: &mut dyn Bus,
    ) -> Result<TurnOutcome, DispatchError> {
        if let Some(part) = suspending_part(story.as_deref(), &handler) {
            let story = story.as_ref().map_or("<none>", |s| s.id()).to_string();
            tracing::warn!(%story, %part, "refusing a suspending story on the direct dispatcher");
            return Err(DispatchError::Suspending { story, part });
        }

        let mut scope = TurnScope::new(&self.definition, story, handler);
        let mut pending: VecDeque<_> = scope.start(&*bus)?.into();
        let mut redirect = None;

        while let Some(effect) = pending.pop_front() {
            let event = match scope.prepare(effect, bus)? {
                Work::Done(event) => event,
                Work::CheckPreconditions => {
                    let data = scope.handler().check_preconditions_now(bus)?;
                    Some(scope.preconditions_checked(data, &*bus))
                }
                Work::RefineStepData(name) => {
                    let story = scope.story_of_step(&name)?;
                    let step = story.find_step(&name).ok_or(DispatchError::UnknownStep(name.clone()))?;
                    let refined = step.refine_now(bus, scope.step_input(step))?;
                    Some(scope.step_data_refined(refined, &*bus))
                }
                Work::RunStep(name) => {
                    let story = scope.story_of_step(&name)?;
                    let step = story.find_step(&name).ok_or(DispatchError::UnknownStep(name.clone()))?;
                    step.answer_now(bus, scope.step_input(step))?;
                    Some(Event::StepCompleted {
                        probe: CompletionProbe::of(&*bus),
                    })
                }
                Work::RunDefault => {
                    scope.instance()?.answer_now(bus)?;
                    Some(Event::DefaultCompleted {
                        probe: CompletionProbe::of(&*bus),
                    })
                }
                Work::Redirect => {
                    let unknown = Arc::clone(self.definition.unknown_story());
                    let handler = unknown.handler().clone();
                    redirect = Some(self.run(Some(unknown), handler, bus)?);
                    None
                }
            };
            if let Some(event) = event {
                pending.extend(scope.apply(event)?);
            }
        }

        Ok(scope.finish(redirect))
    }
}

/// First part of the turn that may suspend: the handler, then the steps
fn suspending_part(story: Option<&StoryDefinition>, handler: &Handler) -> Option<String> {
    if handler.is_suspending() {
        return Some("handler".to_string());
    }
    story?
        .all_steps()
        .into_iter()
        .find(|step| step.is_suspending())
        .map(|step| format!("step {}", step.name()))
}
