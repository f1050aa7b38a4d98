//! Story steps
//!
//! A step is an optional sub-unit of a story. It can be reached three ways:
//! its selection predicate returns true, the incoming action carries the
//! entity named by its entity rule, or the router pre-seeds it on the bus
//! because the resolved intent is one of the step's starter intents.

use super::handler::{HandlerError, HandlerResult, TurnData};
use super::Intent;
use crate::bus::Bus;
use async_trait::async_trait;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Auto-selects a step when the action carries an entity with this role,
/// optionally with a predefined value.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStepSelection {
    pub entity_role: String,
    pub value: Option<Value>,
}

impl EntityStepSelection {
    pub fn matches(&self, bus: &dyn Bus) -> bool {
        bus.entity(&self.entity_role)
            .is_some_and(|entity| self.value.as_ref().map_or(true, |v| *v == entity.value))
    }
}

type ContextPredicate = Arc<dyn Fn(&dyn Bus) -> bool + Send + Sync>;
type DataPredicate = Arc<dyn Fn(&dyn Bus, &TurnData) -> bool + Send + Sync>;

/// The should-select predicate of a step
#[derive(Clone)]
pub enum StepSelector {
    /// Inspects the live bus only
    Context(ContextPredicate),
    /// Also receives the precondition data of the turn
    Data(DataPredicate),
}

impl StepSelector {
    pub fn evaluate(&self, bus: &dyn Bus, data: &TurnData) -> bool {
        match self {
            Self::Context(predicate) => predicate(bus),
            Self::Data(predicate) => predicate(bus, data),
        }
    }
}

/// Step body that may suspend
#[async_trait]
pub trait AsyncStepBody: Send + Sync {
    /// Refines the turn data before the body runs. `None` keeps the data.
    async fn refine(&self, _bus: &mut dyn Bus, _data: &TurnData) -> HandlerResult<Option<TurnData>> {
        Ok(None)
    }

    async fn answer(&self, bus: &mut dyn Bus, data: &TurnData) -> HandlerResult;
}

type DirectAnswer = Arc<dyn Fn(&mut dyn Bus, &TurnData) -> HandlerResult + Send + Sync>;
type DirectRefine = Arc<dyn Fn(&mut dyn Bus, &TurnData) -> HandlerResult<TurnData> + Send + Sync>;

#[derive(Clone)]
enum Refine {
    Direct(DirectRefine),
    Suspending(Arc<dyn AsyncStepBody>),
}

#[derive(Clone)]
enum Answer {
    Direct(DirectAnswer),
    Suspending(Arc<dyn AsyncStepBody>),
}

/// Refine and answer are set independently, whatever their flavour
#[derive(Clone, Default)]
struct StepBody {
    refine: Option<Refine>,
    answer: Option<Answer>,
}

/// A named step of a story
#[derive(Clone, Default)]
pub struct StepDefinition {
    name: String,
    intent: Option<Intent>,
    other_starter_intents: Vec<Intent>,
    secondary_intents: Vec<Intent>,
    entity_selection: Option<EntityStepSelection>,
    children: Vec<StepDefinition>,
    selector: Option<StepSelector>,
    body: StepBody,
    data_step: bool,
}

impl StepDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn intent(mut self, intent: impl Into<Intent>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    #[must_use]
    pub fn other_starter_intent(mut self, intent: impl Into<Intent>) -> Self {
        self.other_starter_intents.push(intent.into());
        self
    }

    #[must_use]
    pub fn secondary_intent(mut self, intent: impl Into<Intent>) -> Self {
        self.secondary_intents.push(intent.into());
        self
    }

    /// Selects the step when the action carries an entity with this role.
    #[must_use]
    pub fn select_on_entity(mut self, role: impl Into<String>) -> Self {
        self.entity_selection = Some(EntityStepSelection {
            entity_role: role.into(),
            value: None,
        });
        self
    }

    /// Selects the step when the action carries this exact entity value.
    #[must_use]
    pub fn select_on_entity_value(mut self, role: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entity_selection = Some(EntityStepSelection {
            entity_role: role.into(),
            value: Some(value.into()),
        });
        self
    }

    #[must_use]
    pub fn select_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&dyn Bus) -> bool + Send + Sync + 'static,
    {
        self.selector = Some(StepSelector::Context(Arc::new(predicate)));
        self
    }

    /// Selects the step from the precondition data. Makes this a data step.
    ///
    /// The predicate is false when the turn data is not a `D`.
    #[must_use]
    pub fn select_with_data<D, F>(mut self, predicate: F) -> Self
    where
        D: Any,
        F: Fn(&dyn Bus, &D) -> bool + Send + Sync + 'static,
    {
        self.selector = Some(StepSelector::Data(Arc::new(
            move |bus: &dyn Bus, data: &TurnData| data.get::<D>().is_some_and(|d| predicate(bus, d)),
        )));
        self.data_step = true;
        self
    }

    #[must_use]
    pub fn answer<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut dyn Bus) -> HandlerResult + Send + Sync + 'static,
    {
        let answer: DirectAnswer = Arc::new(move |bus: &mut dyn Bus, _: &TurnData| body(bus));
        self.set_direct_answer(answer);
        self
    }

    /// Answers with the step data. Makes this a data step.
    #[must_use]
    pub fn answer_with_data<D, F>(mut self, body: F) -> Self
    where
        D: Any,
        F: Fn(&mut dyn Bus, &D) -> HandlerResult + Send + Sync + 'static,
    {
        let answer: DirectAnswer = Arc::new(move |bus: &mut dyn Bus, data: &TurnData| {
            let data = data.get::<D>().ok_or_else(HandlerError::data_mismatch::<D>)?;
            body(bus, data)
        });
        self.set_direct_answer(answer);
        self.data_step = true;
        self
    }

    /// Step preconditions: turn the precondition data `D` into the step data `E`.
    /// May end the turn, in which case the body does not run.
    #[must_use]
    pub fn refine_data<D, E, F>(mut self, refine: F) -> Self
    where
        D: Any,
        E: Any + Send + Sync,
        F: Fn(&mut dyn Bus, &D) -> HandlerResult<E> + Send + Sync + 'static,
    {
        let refiner: DirectRefine = Arc::new(move |bus: &mut dyn Bus, data: &TurnData| {
            let data = data.get::<D>().ok_or_else(HandlerError::data_mismatch::<D>)?;
            refine(bus, data).map(TurnData::new)
        });
        self.body.refine = Some(Refine::Direct(refiner));
        self.data_step = true;
        self
    }

    /// Answers with a body that may suspend.
    ///
    /// The body's own refine is used unless `refine_data` sets one, before or
    /// after this call.
    #[must_use]
    pub fn answer_async(mut self, body: impl AsyncStepBody + 'static) -> Self {
        let body: Arc<dyn AsyncStepBody> = Arc::new(body);
        if !matches!(self.body.refine, Some(Refine::Direct(_))) {
            self.body.refine = Some(Refine::Suspending(Arc::clone(&body)));
        }
        self.body.answer = Some(Answer::Suspending(body));
        self
    }

    /// Marks the step as receiving the precondition data.
    #[must_use]
    pub fn data_step(mut self) -> Self {
        self.data_step = true;
        self
    }

    #[must_use]
    pub fn child(mut self, step: StepDefinition) -> Self {
        self.children.push(step);
        self
    }

    fn set_direct_answer(&mut self, answer: DirectAnswer) {
        // A suspending refine belongs to the suspending body being replaced
        if matches!(self.body.refine, Some(Refine::Suspending(_))) {
            self.body.refine = None;
        }
        self.body.answer = Some(Answer::Direct(answer));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Own intent of the step. A step without one belongs to its story's main intent.
    pub fn own_intent(&self) -> Option<&Intent> {
        self.intent.as_ref()
    }

    pub fn starter_intents(&self) -> impl Iterator<Item = &Intent> {
        self.intent.iter().chain(&self.other_starter_intents)
    }

    pub fn has_starter_intents(&self) -> bool {
        self.intent.is_some() || !self.other_starter_intents.is_empty()
    }

    pub fn is_starter_intent(&self, intent: &Intent) -> bool {
        self.starter_intents().any(|i| i == intent)
    }

    /// Starter or secondary intent of the step
    pub fn supports_intent(&self, intent: &Intent) -> bool {
        self.is_starter_intent(intent) || self.secondary_intents.contains(intent)
    }

    /// Starter and secondary intents of this step
    pub fn intents(&self) -> impl Iterator<Item = &Intent> {
        self.starter_intents().chain(&self.secondary_intents)
    }

    pub fn entity_selection(&self) -> Option<&EntityStepSelection> {
        self.entity_selection.as_ref()
    }

    pub fn selector(&self) -> Option<&StepSelector> {
        self.selector.as_ref()
    }

    pub fn children(&self) -> &[StepDefinition] {
        &self.children
    }

    /// Does the step body receive the precondition data?
    pub fn is_data_step(&self) -> bool {
        self.data_step
    }

    /// Does the step run its own preconditions before the body?
    pub fn refines_data(&self) -> bool {
        self.data_step && self.body.refine.is_some()
    }

    /// Does the refine or the answer of this step suspend?
    pub fn is_suspending(&self) -> bool {
        matches!(self.body.refine, Some(Refine::Suspending(_)))
            || matches!(self.body.answer, Some(Answer::Suspending(_)))
    }

    /// This step and its descendants, depth first
    pub fn walk<'a>(&'a self, out: &mut Vec<&'a StepDefinition>) {
        out.push(self);
        for child in &self.children {
            child.walk(out);
        }
    }

    pub(crate) fn refine_now(&self, bus: &mut dyn Bus, data: &TurnData) -> HandlerResult<Option<TurnData>> {
        match &self.body.refine {
            None => Ok(None),
            Some(Refine::Direct(refine)) => refine(bus, data).map(Some),
            Some(Refine::Suspending(_)) => Err(HandlerError::must_suspend(&self.name)),
        }
    }

    pub(crate) async fn run_refine(&self, bus: &mut dyn Bus, data: &TurnData) -> HandlerResult<Option<TurnData>> {
        match &self.body.refine {
            None => Ok(None),
            Some(Refine::Direct(refine)) => refine(bus, data).map(Some),
            Some(Refine::Suspending(body)) => body.refine(bus, data).await,
        }
    }

    pub(crate) fn answer_now(&self, bus: &mut dyn Bus, data: &TurnData) -> HandlerResult {
        match &self.body.answer {
            None => Ok(()),
            Some(Answer::Direct(answer)) => answer(bus, data),
            Some(Answer::Suspending(_)) => Err(HandlerError::must_suspend(&self.name)),
        }
    }

    pub(crate) async fn run_answer(&self, bus: &mut dyn Bus, data: &TurnData) -> HandlerResult {
        match &self.body.answer {
            None => Ok(()),
            Some(Answer::Direct(answer)) => answer(bus, data),
            Some(Answer::Suspending(body)) => body.answer(bus, data).await,
        }
    }
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("name", &self.name)
            .field("intent", &self.intent)
            .field("entity_selection", &self.entity_selection)
            .field("children", &self.children)
            .field("data_step", &self.data_step)
            .finish_non_exhaustive()
    }
}
