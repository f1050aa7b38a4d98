//! Conversation log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    User,
    Bot,
}

/// A recorded user or bot action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: Option<String>,
    /// Set on the bot action that closes a turn
    pub last_answer: bool,
    pub created_at: DateTime<Utc>,
}

impl Action {
    pub fn user(text: Option<String>) -> Self {
        Self::new(Speaker::User, text, false)
    }

    pub fn bot(text: impl Into<String>, last_answer: bool) -> Self {
        Self::new(Speaker::Bot, Some(text.into()), last_answer)
    }

    fn new(speaker: Speaker, text: Option<String>, last_answer: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text,
            last_answer,
            created_at: Utc::now(),
        }
    }
}

/// Ordered actions of one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialog {
    pub id: Uuid,
    actions: Vec<Action>,
}

impl Dialog {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            actions: Vec::new(),
        }
    }

    pub fn record(&mut self, action: Action) {
        self.actions.push(action);
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn last_action(&self) -> Option<&Action> {
        self.actions.last()
    }

    pub fn position(&self, id: Uuid) -> Option<usize> {
        self.actions.iter().position(|a| a.id == id)
    }

    /// Bot answers recorded after the given action
    pub fn answers_after(&self, id: Uuid) -> impl Iterator<Item = &Action> {
        let start = self.position(id).map_or(self.actions.len(), |p| p + 1);
        self.actions
            .iter()
            .skip(start)
            .filter(|a| a.speaker == Speaker::Bot)
    }
}

impl Default for Dialog {
    fn default() -> Self {
        Self::new()
    }
}
