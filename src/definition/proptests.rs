//! Property-based tests for intent and story resolution

use super::*;
use proptest::prelude::*;
use std::sync::Arc;

fn noop() -> Handler {
    Handler::from_fn(|_| Ok(()))
}

fn arb_intent_name() -> impl Strategy<Value = String> {
    "[a-z]{3,8}".prop_map(String::from)
}

/// Stories with distinct ids, one to three starter intents and a few steps
fn arb_stories() -> impl Strategy<Value = Vec<StoryDefinition>> {
    proptest::collection::vec(
        (
            proptest::collection::vec(arb_intent_name(), 1..4),
            proptest::collection::vec(arb_intent_name(), 0..3),
        ),
        0..6,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (starters, step_intents))| {
                let mut builder = StoryDefinition::builder(format!("story-{i}"), noop());
                for starter in starters {
                    builder = builder.starter_intent(starter);
                }
                for (j, intent) in step_intents.into_iter().enumerate() {
                    builder = builder.step(StepDefinition::new(format!("step-{i}-{j}")).intent(intent));
                }
                builder.build().unwrap()
            })
            .collect()
    })
}

fn build(stories: Vec<StoryDefinition>) -> BotDefinition {
    BotDefinition::builder("prop").stories(stories).build().unwrap()
}

proptest! {
    #[test]
    fn unclaimed_intents_resolve_to_unknown(stories in arb_stories(), name in "[A-Z]{3,8}") {
        // Upper case names are never generated as story intents
        let bot = build(stories);
        prop_assert!(Arc::ptr_eq(&bot.resolve_story(Some(&name)), bot.unknown_story()));
        prop_assert_eq!(bot.resolve_intent(&name), Intent::unknown());
    }

    #[test]
    fn starter_intents_resolve_to_first_claiming_story(stories in arb_stories()) {
        let bot = build(stories);
        for story in bot.stories() {
            for intent in story.starter_intents() {
                let resolved = bot.resolve_story(Some(intent.name()));
                let first = bot
                    .stories()
                    .iter()
                    .find(|s| s.is_starter_intent(intent))
                    .unwrap();
                prop_assert!(Arc::ptr_eq(&resolved, first));
            }
        }
    }

    #[test]
    fn main_intent_is_first_starter(stories in arb_stories()) {
        for story in &stories {
            prop_assert_eq!(story.main_intent(), &story.starter_intents()[0]);
        }
    }

    #[test]
    fn step_intents_are_kept_by_resolution(stories in arb_stories()) {
        let bot = build(stories);
        for story in bot.stories() {
            for step in story.all_steps() {
                if let Some(intent) = step.own_intent() {
                    prop_assert_eq!(&bot.resolve_intent(intent.name()), intent);
                }
            }
        }
    }

    #[test]
    fn resolution_is_deterministic(stories in arb_stories(), name in arb_intent_name()) {
        let bot = build(stories);
        let first = bot.resolve_story(Some(&name));
        let second = bot.resolve_story(Some(&name));
        prop_assert!(Arc::ptr_eq(&first, &second));
    }
}
