//! Storyline - story dispatch for conversational bots
//!
//! A bot is a registry of stories. Each incoming turn carries an intent and
//! entities on a [`bus::Bus`]; the [`bot::Bot`] front routes it to a story,
//! and a dispatcher runs the story handler: preconditions, step selection,
//! the selected step, then the default answer when nothing answered yet.
//!
//! Two dispatchers share one pure turn state machine: a direct-call one and
//! a suspending one for handlers that await their collaborators.

pub mod bot;
pub mod bus;
pub mod config;
pub mod connector;
pub mod definition;
pub mod runtime;
pub mod state_machine;

pub use bot::Bot;
pub use bus::{Bus, TurnBus};
pub use config::DispatchConfig;
pub use definition::{BotDefinition, Handler, Intent, StepDefinition, StoryDefinition};
pub use runtime::{DirectDispatcher, DispatchError, SuspendingDispatcher, TurnOutcome};
