//! Suspending dispatcher
//!
//! Same transitions as the direct dispatcher; preconditions, step bodies and
//! default answers are awaited, so a turn yields instead of blocking while a
//! collaborator is busy. Steps of one turn still run one after the other.

use super::{DispatchError, TurnOutcome, TurnScope, Work};
use crate::bus::Bus;
use crate::definition::{BotDefinition, Handler, StoryDefinition};
use crate::state_machine::{CompletionProbe, Event};
use futures::future::{BoxFuture, FutureExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::Instrument;

/// Dispatcher running a turn as a future
#[derive(Debug, Clone)]
pub struct SuspendingDispatcher {
    definition: Arc<BotDefinition>,
}

impl SuspendingDispatcher {
    pub fn new(definition: Arc<BotDefinition>) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &Arc<BotDefinition> {
        &self.definition
    }

    pub async fn dispatch(&self, story: &Arc<StoryDefinition>, bus: &mut dyn Bus) -> Result<TurnOutcome, DispatchError> {
        self.run(Some(Arc::clone(story)), story.handler().clone(), bus).await
    }

    pub async fn dispatch_handler(&self, handler: &Handler, bus: &mut dyn Bus) -> Result<TurnOutcome, DispatchError> {
        let story = self.definition.find_story_by_handler(handler).cloned();
        self.run(story, handler.clone(), bus).await
    }

    // Boxed so the redirect to the unknown story can recurse
    fn run<'a>(
        &'a self,
        story: Option<Arc<StoryDefinition>>,
        handler: Handler,
        bus: &'a mut dyn Bus,
    ) -> BoxFuture<'a, Result<TurnOutcome, DispatchError>> {
        let span = tracing::info_span!(
            "turn",
            story = story.as_ref().map_or("<none>", |s| s.id()),
            connector = bus.connector_id(),
        );
        async move {
            let mut scope = TurnScope::new(&self.definition, story, handler);
            let mut pending: VecDeque<_> = scope.start(&*bus)?.into();
            let mut redirect = None;

            while let Some(effect) = pending.pop_front() {
                let event = match scope.prepare(effect, bus)? {
                    Work::Done(event) => event,
                    Work::CheckPreconditions => {
                        let data = scope.handler().check_preconditions(bus).await?;
                        Some(scope.preconditions_checked(data, &*bus))
                    }
                    Work::RefineStepData(name) => {
                        let story = scope.story_of_step(&name)?;
                        let step = story.find_step(&name).ok_or(DispatchError::UnknownStep(name.clone()))?;
                        let refined = step.run_refine(bus, scope.step_input(step)).await?;
                        Some(scope.step_data_refined(refined, &*bus))
                    }
                    Work::RunStep(name) => {
                        let story = scope.story_of_step(&name)?;
                        let step = story.find_step(&name).ok_or(DispatchError::UnknownStep(name.clone()))?;
                        step.run_answer(bus, scope.step_input(step)).await?;
                        Some(Event::StepCompleted {
                            probe: CompletionProbe::of(&*bus),
                        })
                    }
                    Work::RunDefault => {
                        scope.instance()?.answer(bus).await?;
                        Some(Event::DefaultCompleted {
                            probe: CompletionProbe::of(&*bus),
                        })
                    }
                    Work::Redirect => {
                        let unknown = Arc::clone(self.definition.unknown_story());
                        let handler = unknown.handler().clone();
                        redirect = Some(self.run(Some(unknown), handler, &mut *bus).await?);
                        None
                    }
                };
                if let Some(event) = event {
                    pending.extend(scope.apply(event)?);
                }
            }

            Ok(scope.finish(redirect))
        }
        .instrument(span)
        .boxed()
    }
}
