//! Bot front: routes an incoming turn to a story and dispatches it
//!
//! Routing keeps the dialog in its current story while the story supports the
//! new intent, so secondary intents ("yes", "the blue one") reach the story
//! that asked the question.

use crate::bus::Bus;
use crate::definition::{BotDefinition, Intent, StoryDefinition};
use crate::runtime::{DirectDispatcher, DispatchError, SuspendingDispatcher, TurnOutcome};
use std::sync::Arc;

/// A bot ready to handle turns
#[derive(Debug, Clone)]
pub struct Bot {
    definition: Arc<BotDefinition>,
    direct: DirectDispatcher,
    suspending: SuspendingDispatcher,
}

impl Bot {
    pub fn new(definition: Arc<BotDefinition>) -> Self {
        Self {
            direct: DirectDispatcher::new(Arc::clone(&definition)),
            suspending: SuspendingDispatcher::new(Arc::clone(&definition)),
            definition,
        }
    }

    pub fn definition(&self) -> &Arc<BotDefinition> {
        &self.definition
    }

    /// Picks the story of the turn and records it on the bus, with the
    /// resolved intent and the step the intent starts, if any.
    pub fn route(&self, bus: &mut dyn Bus) -> Arc<StoryDefinition> {
        let intent = bus.intent().map(|intent| self.definition.resolve_intent(intent.name()));
        let current = bus
            .current_story_id()
            .map(|id| Arc::clone(self.definition.find_story_by_id(id)));

        let story = match (&intent, current) {
            (Some(intent), Some(current)) if current.supports_intent(intent) => current,
            (Some(intent), _) => self.definition.resolve_story(Some(intent.name())),
            (None, Some(current)) => current,
            (None, None) if bus.has_history() => self.definition.resolve_story(None),
            (None, None) => Arc::clone(self.definition.default_story()),
        };

        let changed = bus.current_story_id() != Some(story.id());
        let stale_step = bus.step().is_some_and(|step| !self.owns_step(&story, step));
        if changed && stale_step {
            tracing::debug!(story = story.id(), step = ?bus.step(), "clearing step of the previous story");
            bus.set_step(None);
        }

        if let Some(step) = intent.as_ref().and_then(|intent| starting_step(&story, intent)) {
            bus.set_step(Some(step.to_string()));
        }

        tracing::debug!(
            story = story.id(),
            intent = ?intent.as_ref().map(Intent::name),
            step = ?bus.step(),
            changed,
            "turn routed"
        );
        bus.set_current_story_id(Some(story.id().to_string()));
        bus.set_intent(intent);
        story
    }

    /// Routes the turn, then dispatches it on the calling thread.
    ///
    /// Stories that may suspend are refused with [`DispatchError::Suspending`];
    /// they go through [`Bot::handle_async`].
    pub fn handle(&self, bus: &mut dyn Bus) -> Result<TurnOutcome, DispatchError> {
        let story = self.route(bus);
        self.direct.dispatch(&story, bus)
    }

    /// Routes the turn, then dispatches it as a future.
    pub async fn handle_async(&self, bus: &mut dyn Bus) -> Result<TurnOutcome, DispatchError> {
        let story = self.route(bus);
        self.suspending.dispatch(&story, bus).await
    }

    fn owns_step(&self, story: &StoryDefinition, step: &str) -> bool {
        self.definition
            .story_for_step(step)
            .is_some_and(|owner| owner.id() == story.id())
    }
}

fn starting_step<'s>(story: &'s StoryDefinition, intent: &Intent) -> Option<&'s str> {
    story
        .all_steps()
        .into_iter()
        .find(|step| step.is_starter_intent(intent))
        .map(|step| step.name())
}
