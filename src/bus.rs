//! The per-turn bus: conversation state handed to handlers
//!
//! The dispatcher never builds messages itself. Handler and step bodies
//! answer through the bus, and the dispatcher only asks the bus whether the
//! turn has produced its final answer yet.

mod dialog;
mod turn;

pub use dialog::{Action, Dialog, Speaker};
pub use turn::TurnBus;

use crate::definition::Intent;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Kind of user interface the conversation runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UserInterfaceType {
    #[default]
    TextChat,
    VoiceAssistant,
    TextAndVoiceAssistant,
}

impl FromStr for UserInterfaceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" | "text-chat" => Ok(Self::TextChat),
            "voice" | "voice-assistant" => Ok(Self::VoiceAssistant),
            "text-and-voice" | "text-and-voice-assistant" => Ok(Self::TextAndVoiceAssistant),
            other => Err(format!("unknown user interface type: {other}")),
        }
    }
}

/// A connector family (messenger, web, alexa...) and the interface it renders to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectorType {
    pub id: String,
    pub user_interface_type: UserInterfaceType,
}

impl ConnectorType {
    pub fn new(id: impl Into<String>, user_interface_type: UserInterfaceType) -> Self {
        Self {
            id: id.into(),
            user_interface_type,
        }
    }

    pub fn text(id: impl Into<String>) -> Self {
        Self::new(id, UserInterfaceType::TextChat)
    }
}

impl fmt::Display for ConnectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// An entity extracted from the incoming action, keyed by role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityValue {
    pub role: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl EntityValue {
    pub fn new(role: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            role: role.into(),
            value: value.into(),
            content: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }
}

/// Lazily built final message
pub type MessageSupplier = Box<dyn FnOnce(&dyn Bus) -> String + Send>;

/// Conversation state for one turn, consumed and mutated by the dispatcher
/// and by handler bodies.
pub trait Bus: Send {
    /// Intent of the incoming action, once resolved
    fn intent(&self) -> Option<&Intent>;

    fn set_intent(&mut self, intent: Option<Intent>);

    /// Id of the story currently handling the dialog
    fn current_story_id(&self) -> Option<&str>;

    fn set_current_story_id(&mut self, story_id: Option<String>);

    /// Name of the current step, if any
    fn step(&self) -> Option<&str>;

    fn set_step(&mut self, step: Option<String>);

    /// Configured connector instance the action came from
    fn connector_id(&self) -> &str;

    /// Connector type the answer targets
    fn target_connector_type(&self) -> &ConnectorType;

    fn user_interface_type(&self) -> UserInterfaceType;

    /// Text sent by the user, if the action is a sentence
    fn user_text(&self) -> Option<&str>;

    fn entity(&self, role: &str) -> Option<&EntityValue>;

    fn has_entity(&self, role: &str) -> bool {
        self.entity(role).is_some()
    }

    /// Is there any earlier action in the dialog before this turn?
    fn has_history(&self) -> bool;

    /// Sends an intermediate message. The turn goes on.
    fn send(&mut self, text: &str);

    /// Sends the final answer of the turn.
    fn end(&mut self, text: &str);

    /// Sends the final answer, built from the bus state at the time of the call.
    fn end_with(&mut self, supplier: MessageSupplier);

    /// Has the turn already produced its final answer?
    ///
    /// Derived from the conversation log on every call.
    fn is_completed(&self) -> bool;

    /// Tells the connector not to expect an answer for this turn.
    fn skip_answer(&mut self);

    fn answer_skipped(&self) -> bool;

    /// Switches the dialog to another story mid-turn.
    fn switch_story(&mut self, story_id: &str, main_intent: Intent);

    fn story_switched(&self) -> bool;

    /// Flags the incoming sentence as not understood.
    fn mark_as_unknown(&mut self);
}
