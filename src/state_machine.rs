//! Turn state machine
//!
//! One dispatch turn as pure state transitions. The dispatchers execute the
//! effects and feed the resulting events back; both bindings share this
//! function, so their ordering guarantees are the same.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::{CompletionProbe, Event, SelectedStep};
pub use state::{TurnContext, TurnState};
pub use transition::{transition, TransitionError, TransitionResult};
