//! Effects produced by turn transitions

/// Work the dispatcher performs after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Hand the whole turn to the unknown story
    RedirectToUnknown,

    /// Run the story preconditions
    CheckPreconditions,

    /// Build the handler definition of the turn
    InstantiateHandler,

    /// Run the step selector
    SelectStep,

    /// Record the step as the current step on the bus
    SetCurrentStep { step: String },

    /// Run the step preconditions
    RefineStepData { step: String },

    /// Run the step body
    RunStep { step: String },

    /// Run the handler default answer
    RunDefault,

    /// Log that the turn produced no answer
    WarnUnanswered,
}
