//! Story definitions

use super::handler::Handler;
use super::step::StepDefinition;
use super::{DefinitionError, Intent};
use crate::bus::UserInterfaceType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Administrative tags of a story
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryTag {
    /// The story switches the bot off for the user
    Disable,
    /// The story switches the bot back on
    Enable,
    /// A checkpoint the dialog can come back to
    Checkpoint,
}

/// A named conversational unit: starter intents, steps and a handler.
///
/// Immutable once built. The first starter intent is the main intent.
#[derive(Debug, Clone)]
pub struct StoryDefinition {
    id: String,
    starter_intents: Vec<Intent>,
    intents: Vec<Intent>,
    steps: Vec<StepDefinition>,
    handler: Handler,
    unsupported_interfaces: HashSet<UserInterfaceType>,
    tags: HashSet<StoryTag>,
}

impl StoryDefinition {
    pub fn builder(id: impl Into<String>, handler: Handler) -> StoryBuilder {
        StoryBuilder {
            id: id.into(),
            handler,
            starter_intents: Vec::new(),
            secondary_intents: Vec::new(),
            steps: Vec::new(),
            unsupported_interfaces: HashSet::new(),
            tags: HashSet::new(),
        }
    }

    /// Story whose id is its single starter intent, without steps
    pub fn simple(intent: impl Into<Intent>, handler: Handler) -> Self {
        let intent = intent.into();
        Self {
            id: intent.name().to_string(),
            starter_intents: vec![intent.clone()],
            intents: vec![intent],
            steps: Vec::new(),
            handler,
            unsupported_interfaces: HashSet::new(),
            tags: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn main_intent(&self) -> &Intent {
        &self.starter_intents[0]
    }

    pub fn starter_intents(&self) -> &[Intent] {
        &self.starter_intents
    }

    /// Starter and secondary intents of the story itself
    pub fn intents(&self) -> &[Intent] {
        &self.intents
    }

    pub fn is_starter_intent(&self, intent: &Intent) -> bool {
        self.starter_intents.contains(intent)
    }

    /// Does the story declare the intent, itself or in any step?
    pub fn supports_intent(&self, intent: &Intent) -> bool {
        self.intents.contains(intent) || self.all_steps().iter().any(|s| s.supports_intent(intent))
    }

    /// Root steps in declaration order
    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// Every step of the tree, depth first
    pub fn all_steps(&self) -> Vec<&StepDefinition> {
        let mut out = Vec::new();
        for step in &self.steps {
            step.walk(&mut out);
        }
        out
    }

    pub fn find_step(&self, name: &str) -> Option<&StepDefinition> {
        self.all_steps().into_iter().find(|s| s.name() == name)
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn supports_interface(&self, interface: UserInterfaceType) -> bool {
        !self.unsupported_interfaces.contains(&interface)
    }

    pub fn has_tag(&self, tag: StoryTag) -> bool {
        self.tags.contains(&tag)
    }
}

/// Builder for [`StoryDefinition`]
#[derive(Debug)]
pub struct StoryBuilder {
    id: String,
    handler: Handler,
    starter_intents: Vec<Intent>,
    secondary_intents: Vec<Intent>,
    steps: Vec<StepDefinition>,
    unsupported_interfaces: HashSet<UserInterfaceType>,
    tags: HashSet<StoryTag>,
}

impl StoryBuilder {
    /// Adds a starter intent. The first one becomes the main intent.
    #[must_use]
    pub fn starter_intent(mut self, intent: impl Into<Intent>) -> Self {
        self.starter_intents.push(intent.into());
        self
    }

    /// Adds an intent that keeps the dialog in this story without starting it.
    #[must_use]
    pub fn secondary_intent(mut self, intent: impl Into<Intent>) -> Self {
        self.secondary_intents.push(intent.into());
        self
    }

    #[must_use]
    pub fn step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn unsupported_interface(mut self, interface: UserInterfaceType) -> Self {
        self.unsupported_interfaces.insert(interface);
        self
    }

    #[must_use]
    pub fn tag(mut self, tag: StoryTag) -> Self {
        self.tags.insert(tag);
        self
    }

    pub fn build(self) -> Result<StoryDefinition, DefinitionError> {
        if self.starter_intents.is_empty() {
            return Err(DefinitionError::MissingMainIntent { story: self.id });
        }
        let mut intents = self.starter_intents.clone();
        for intent in self.secondary_intents {
            if !intents.contains(&intent) {
                intents.push(intent);
            }
        }
        Ok(StoryDefinition {
            id: self.id,
            starter_intents: self.starter_intents,
            intents,
            steps: self.steps,
            handler: self.handler,
            unsupported_interfaces: self.unsupported_interfaces,
            tags: self.tags,
        })
    }
}
