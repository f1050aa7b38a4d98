//! In-memory bus for a single turn

use super::{Action, Bus, ConnectorType, Dialog, EntityValue, MessageSupplier, Speaker, UserInterfaceType};
use crate::definition::Intent;
use std::collections::HashMap;
use uuid::Uuid;

/// Bus backed by an in-memory [`Dialog`].
///
/// Creating the bus records the incoming user action in the dialog; every
/// bot message sent afterwards is appended to the same log.
#[derive(Debug)]
pub struct TurnBus {
    dialog: Dialog,
    incoming: Uuid,
    intent: Option<Intent>,
    entities: HashMap<String, EntityValue>,
    story_id: Option<String>,
    step: Option<String>,
    connector_id: String,
    connector_type: ConnectorType,
    user_interface_type: UserInterfaceType,
    skip_answer: bool,
    switched_to: Option<String>,
    unknown: bool,
}

impl TurnBus {
    /// Starts a turn in a fresh dialog.
    pub fn new(intent: Option<&str>, user_text: Option<&str>) -> Self {
        Self::in_dialog(Dialog::new(), intent, user_text)
    }

    /// Starts a turn in an existing dialog.
    pub fn in_dialog(mut dialog: Dialog, intent: Option<&str>, user_text: Option<&str>) -> Self {
        let action = Action::user(user_text.map(str::to_string));
        let incoming = action.id;
        dialog.record(action);
        let connector_type = ConnectorType::text("web");
        Self {
            dialog,
            incoming,
            intent: intent.map(Intent::new),
            entities: HashMap::new(),
            story_id: None,
            step: None,
            connector_id: connector_type.id.clone(),
            user_interface_type: connector_type.user_interface_type,
            connector_type,
            skip_answer: false,
            switched_to: None,
            unknown: false,
        }
    }

    #[must_use]
    pub fn with_entity(mut self, entity: EntityValue) -> Self {
        self.entities.insert(entity.role.clone(), entity);
        self
    }

    /// Targets a connector; the interface type follows the connector type.
    #[must_use]
    pub fn with_connector(mut self, connector_id: impl Into<String>, connector_type: ConnectorType) -> Self {
        self.connector_id = connector_id.into();
        self.user_interface_type = connector_type.user_interface_type;
        self.connector_type = connector_type;
        self
    }

    #[must_use]
    pub fn with_user_interface(mut self, user_interface_type: UserInterfaceType) -> Self {
        self.user_interface_type = user_interface_type;
        self
    }

    #[must_use]
    pub fn with_story(mut self, story_id: impl Into<String>) -> Self {
        self.story_id = Some(story_id.into());
        self
    }

    #[must_use]
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(step.into());
        self
    }

    pub fn dialog(&self) -> &Dialog {
        &self.dialog
    }

    /// Gives the dialog back, to be reused by the next turn.
    pub fn into_dialog(self) -> Dialog {
        self.dialog
    }

    /// Records an action directly in the log.
    pub fn record(&mut self, action: Action) {
        self.dialog.record(action);
    }

    /// Bot messages produced during this turn
    pub fn answers(&self) -> Vec<&str> {
        self.dialog
            .answers_after(self.incoming)
            .filter_map(|a| a.text.as_deref())
            .collect()
    }

    /// Number of final answers produced during this turn
    pub fn final_answer_count(&self) -> usize {
        self.dialog
            .answers_after(self.incoming)
            .filter(|a| a.last_answer)
            .count()
    }

    pub fn is_marked_unknown(&self) -> bool {
        self.unknown
    }

    pub fn switched_to(&self) -> Option<&str> {
        self.switched_to.as_deref()
    }
}

impl Bus for TurnBus {
    fn intent(&self) -> Option<&Intent> {
        self.intent.as_ref()
    }

    fn set_intent(&mut self, intent: Option<Intent>) {
        self.intent = intent;
    }

    fn current_story_id(&self) -> Option<&str> {
        self.story_id.as_deref()
    }

    fn set_current_story_id(&mut self, story_id: Option<String>) {
        self.story_id = story_id;
    }

    fn step(&self) -> Option<&str> {
        self.step.as_deref()
    }

    fn set_step(&mut self, step: Option<String>) {
        self.step = step;
    }

    fn connector_id(&self) -> &str {
        &self.connector_id
    }

    fn target_connector_type(&self) -> &ConnectorType {
        &self.connector_type
    }

    fn user_interface_type(&self) -> UserInterfaceType {
        self.user_interface_type
    }

    fn user_text(&self) -> Option<&str> {
        self.dialog
            .position(self.incoming)
            .and_then(|p| self.dialog.actions()[p].text.as_deref())
            .map(str::trim)
    }

    fn entity(&self, role: &str) -> Option<&EntityValue> {
        self.entities.get(role)
    }

    fn has_history(&self) -> bool {
        self.dialog.position(self.incoming).is_some_and(|p| p > 0)
    }

    fn send(&mut self, text: &str) {
        self.dialog.record(Action::bot(text, false));
    }

    fn end(&mut self, text: &str) {
        self.dialog.record(Action::bot(text, true));
    }

    fn end_with(&mut self, supplier: MessageSupplier) {
        let text = supplier(&*self);
        self.end(&text);
    }

    fn is_completed(&self) -> bool {
        let Some(last) = self.dialog.last_action() else {
            return false;
        };
        last.speaker == Speaker::Bot
            && last.last_answer
            && self
                .dialog
                .position(self.incoming)
                .is_some_and(|p| p + 1 < self.dialog.actions().len())
    }

    fn skip_answer(&mut self) {
        self.skip_answer = true;
    }

    fn answer_skipped(&self) -> bool {
        self.skip_answer
    }

    fn switch_story(&mut self, story_id: &str, main_intent: Intent) {
        tracing::debug!(from = ?self.story_id, to = %story_id, "switching story");
        self.story_id = Some(story_id.to_string());
        self.intent = Some(main_intent);
        self.switched_to = Some(story_id.to_string());
    }

    fn story_switched(&self) -> bool {
        self.switched_to.is_some()
    }

    fn mark_as_unknown(&mut self) {
        self.unknown = true;
    }
}
