//! Story handlers
//!
//! A story handler runs in two phases. Preconditions are checked first and
//! produce the turn data; then a handler definition is built for the turn
//! from the bus and that data, and answers when no step did.
//!
//! Handlers come in two flavours with identical semantics:
//! [`StoryHandler`] answers on the calling thread, [`AsyncStoryHandler`]
//! may suspend at any collaborator call. Suspending handlers only run on the
//! suspending dispatcher.

use crate::bus::Bus;
use crate::connector::ConnectorResolver;
use async_trait::async_trait;
use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by preconditions, steps or handler bodies.
///
/// The dispatcher does not recover from these; they reach the caller as is.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),
    #[error("turn data is not a {expected}")]
    DataMismatch { expected: &'static str },
    #[error("{0} may suspend and needs the suspending dispatcher")]
    MustSuspend(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn data_mismatch<D>() -> Self {
        Self::DataMismatch {
            expected: type_name::<D>(),
        }
    }

    pub fn must_suspend(what: impl Into<String>) -> Self {
        Self::MustSuspend(what.into())
    }
}

pub type HandlerResult<T = ()> = Result<T, HandlerError>;

/// Opaque data produced by the precondition checker, valid for one turn
#[derive(Clone, Default)]
pub struct TurnData(Option<Arc<dyn Any + Send + Sync>>);

impl TurnData {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new<D: Any + Send + Sync>(data: D) -> Self {
        Self(Some(Arc::new(data)))
    }

    pub fn get<D: Any>(&self) -> Option<&D> {
        self.0.as_deref().and_then(|d| d.downcast_ref::<D>())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for TurnData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_some() {
            f.write_str("TurnData(..)")
        } else {
            f.write_str("TurnData(None)")
        }
    }
}

/// What a handler sees when its per-turn definition is built
pub struct DefinitionContext<'a> {
    pub bus: &'a dyn Bus,
    pub data: &'a TurnData,
    pub connectors: &'a Arc<ConnectorResolver>,
}

/// Per-turn handler instance answering on the calling thread
pub trait HandlerDefinition: Any + Send {
    /// Default answer of the story, called when no step completed the turn
    fn handle(&mut self, bus: &mut dyn Bus) -> HandlerResult;
}

/// Story handler answering on the calling thread
pub trait StoryHandler: Send + Sync {
    /// Checks the preconditions of the story.
    ///
    /// Ending the turn on the bus here stops the dispatch: no step and no
    /// default answer run afterwards.
    fn check_preconditions(&self, _bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        Ok(TurnData::none())
    }

    /// Builds the handler instance for this turn.
    fn new_definition(&self, ctx: &DefinitionContext<'_>) -> HandlerResult<Box<dyn HandlerDefinition>>;
}

/// Per-turn handler instance that may suspend
#[async_trait]
pub trait AsyncHandlerDefinition: Any + Send {
    async fn answer(&mut self, bus: &mut dyn Bus) -> HandlerResult;
}

/// Story handler that may suspend at collaborator calls
#[async_trait]
pub trait AsyncStoryHandler: Send + Sync {
    async fn check_preconditions(&self, _bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        Ok(TurnData::none())
    }

    fn new_definition(
        &self,
        ctx: &DefinitionContext<'_>,
    ) -> HandlerResult<Box<dyn AsyncHandlerDefinition>>;
}

/// The handler attached to a story
#[derive(Clone)]
pub enum Handler {
    Direct(Arc<dyn StoryHandler>),
    Suspending(Arc<dyn AsyncStoryHandler>),
}

impl Handler {
    pub fn direct(handler: impl StoryHandler + 'static) -> Self {
        Self::Direct(Arc::new(handler))
    }

    pub fn suspending(handler: impl AsyncStoryHandler + 'static) -> Self {
        Self::Suspending(Arc::new(handler))
    }

    /// Handler answering with a plain function, no preconditions
    pub fn from_fn<F>(action: F) -> Self
    where
        F: Fn(&mut dyn Bus) -> HandlerResult + Send + Sync + 'static,
    {
        Self::direct(SimpleStoryHandler::new(action))
    }

    /// Do both values point to the same handler?
    pub fn is_same(&self, other: &Handler) -> bool {
        std::ptr::eq(self.address(), other.address())
    }

    fn address(&self) -> *const () {
        match self {
            Self::Direct(h) => Arc::as_ptr(h).cast::<()>(),
            Self::Suspending(h) => Arc::as_ptr(h).cast::<()>(),
        }
    }

    pub fn is_suspending(&self) -> bool {
        matches!(self, Self::Suspending(_))
    }

    pub(crate) fn check_preconditions_now(&self, bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        match self {
            Self::Direct(h) => h.check_preconditions(bus),
            Self::Suspending(_) => Err(HandlerError::must_suspend("story handler")),
        }
    }

    pub(crate) async fn check_preconditions(&self, bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        match self {
            Self::Direct(h) => h.check_preconditions(bus),
            Self::Suspending(h) => h.check_preconditions(bus).await,
        }
    }

    pub(crate) fn instantiate(&self, ctx: &DefinitionContext<'_>) -> HandlerResult<HandlerInstance> {
        match self {
            Self::Direct(h) => h.new_definition(ctx).map(HandlerInstance::Direct),
            Self::Suspending(h) => h.new_definition(ctx).map(HandlerInstance::Suspending),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => write!(f, "Handler::Direct({:p})", self.address()),
            Self::Suspending(_) => write!(f, "Handler::Suspending({:p})", self.address()),
        }
    }
}

/// Handler instance built for the current turn
pub(crate) enum HandlerInstance {
    Direct(Box<dyn HandlerDefinition>),
    Suspending(Box<dyn AsyncHandlerDefinition>),
}

impl HandlerInstance {
    pub(crate) fn answer_now(&mut self, bus: &mut dyn Bus) -> HandlerResult {
        match self {
            Self::Direct(d) => d.handle(bus),
            Self::Suspending(_) => Err(HandlerError::must_suspend("handler definition")),
        }
    }

    pub(crate) async fn answer(&mut self, bus: &mut dyn Bus) -> HandlerResult {
        match self {
            Self::Direct(d) => d.handle(bus),
            Self::Suspending(d) => d.answer(bus).await,
        }
    }
}

type ActionFn = Arc<dyn Fn(&mut dyn Bus) -> HandlerResult + Send + Sync>;

/// Story handler made of a single answering function
pub struct SimpleStoryHandler {
    action: ActionFn,
}

impl SimpleStoryHandler {
    pub fn new<F>(action: F) -> Self
    where
        F: Fn(&mut dyn Bus) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            action: Arc::new(action),
        }
    }
}

struct FnDefinition(ActionFn);

impl HandlerDefinition for FnDefinition {
    fn handle(&mut self, bus: &mut dyn Bus) -> HandlerResult {
        (self.0)(bus)
    }
}

impl StoryHandler for SimpleStoryHandler {
    fn new_definition(&self, _ctx: &DefinitionContext<'_>) -> HandlerResult<Box<dyn HandlerDefinition>> {
        Ok(Box::new(FnDefinition(Arc::clone(&self.action))))
    }
}

type PreconditionsFn<D> = Box<dyn Fn(&mut dyn Bus) -> HandlerResult<D> + Send + Sync>;
type CreatorFn<D, T> = Box<dyn Fn(&DefinitionContext<'_>, &D) -> T + Send + Sync>;

/// Story handler with typed precondition data and a typed handler definition
pub struct ConfigurableStoryHandler<D, T> {
    preconditions: PreconditionsFn<D>,
    creator: CreatorFn<D, T>,
}

impl<D, T> ConfigurableStoryHandler<D, T>
where
    D: Any + Send + Sync,
    T: HandlerDefinition,
{
    pub fn new<P, C>(preconditions: P, creator: C) -> Self
    where
        P: Fn(&mut dyn Bus) -> HandlerResult<D> + Send + Sync + 'static,
        C: Fn(&DefinitionContext<'_>, &D) -> T + Send + Sync + 'static,
    {
        Self {
            preconditions: Box::new(preconditions),
            creator: Box::new(creator),
        }
    }
}

impl<D, T> StoryHandler for ConfigurableStoryHandler<D, T>
where
    D: Any + Send + Sync,
    T: HandlerDefinition,
{
    fn check_preconditions(&self, bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        (self.preconditions)(bus).map(TurnData::new)
    }

    fn new_definition(&self, ctx: &DefinitionContext<'_>) -> HandlerResult<Box<dyn HandlerDefinition>> {
        let data = ctx.data.get::<D>().ok_or_else(HandlerError::data_mismatch::<D>)?;
        Ok(Box::new((self.creator)(ctx, data)))
    }
}
