//! Mock handlers and end-to-end dispatch tests
//!
//! Every scenario runs with direct handlers through both dispatchers, and
//! with suspending handlers through the suspending one. The suspending mocks
//! go through the tokio scheduler or timer before each call, so the turn
//! really is suspended and resumed by the runtime.

use super::*;
use crate::bus::{EntityValue, TurnBus, UserInterfaceType};
use crate::definition::{
    AsyncHandlerDefinition, AsyncStepBody, AsyncStoryHandler, HandlerDefinition, HandlerResult, StoryHandler,
};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Recording
// ============================================================================

/// Ordered log of the calls made into the mocks
#[derive(Default)]
pub struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == entry).count()
    }
}

// ============================================================================
// Mock handlers
// ============================================================================

/// Scripted behavior of a mock story handler
#[derive(Clone, Copy, Default)]
pub struct Script {
    pub end_in_preconditions: bool,
    pub fail_in_preconditions: bool,
    pub answer: Option<&'static str>,
}

impl Script {
    pub fn answering(answer: &'static str) -> Self {
        Self {
            answer: Some(answer),
            ..Self::default()
        }
    }
}

struct Mock {
    name: &'static str,
    script: Script,
    recorder: Arc<Recorder>,
}

impl Mock {
    fn preconditions(&self, bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        self.recorder.record(format!("{}:preconditions", self.name));
        if self.script.fail_in_preconditions {
            return Err(HandlerError::failed("backend unavailable"));
        }
        if self.script.end_in_preconditions {
            bus.end("closed");
        }
        Ok(TurnData::new(self.name))
    }

    fn definition(&self) -> MockDefinition {
        self.recorder.record(format!("{}:instantiate", self.name));
        MockDefinition {
            name: self.name,
            answer: self.script.answer,
            recorder: Arc::clone(&self.recorder),
        }
    }
}

struct MockDefinition {
    name: &'static str,
    answer: Option<&'static str>,
    recorder: Arc<Recorder>,
}

impl MockDefinition {
    fn answer_now(&self, bus: &mut dyn Bus) {
        self.recorder.record(format!("{}:handle", self.name));
        if let Some(answer) = self.answer {
            bus.end(answer);
        }
    }
}

impl StoryHandler for Mock {
    fn check_preconditions(&self, bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        self.preconditions(bus)
    }

    fn new_definition(&self, _ctx: &DefinitionContext<'_>) -> HandlerResult<Box<dyn HandlerDefinition>> {
        Ok(Box::new(self.definition()))
    }
}

impl HandlerDefinition for MockDefinition {
    fn handle(&mut self, bus: &mut dyn Bus) -> HandlerResult {
        self.answer_now(bus);
        Ok(())
    }
}

struct AsyncMock(Mock);

#[async_trait]
impl AsyncStoryHandler for AsyncMock {
    async fn check_preconditions(&self, bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.0.preconditions(bus)
    }

    fn new_definition(&self, _ctx: &DefinitionContext<'_>) -> HandlerResult<Box<dyn AsyncHandlerDefinition>> {
        Ok(Box::new(AsyncMockDefinition(self.0.definition())))
    }
}

struct AsyncMockDefinition(MockDefinition);

#[async_trait]
impl AsyncHandlerDefinition for AsyncMockDefinition {
    async fn answer(&mut self, bus: &mut dyn Bus) -> HandlerResult {
        tokio::task::yield_now().await;
        self.0.answer_now(bus);
        Ok(())
    }
}

struct AsyncStep {
    name: &'static str,
    recorder: Arc<Recorder>,
}

#[async_trait]
impl AsyncStepBody for AsyncStep {
    async fn answer(&self, bus: &mut dyn Bus, _data: &TurnData) -> HandlerResult {
        tokio::time::sleep(Duration::from_millis(1)).await;
        self.recorder.record(format!("step:{}", self.name));
        bus.end(self.name);
        Ok(())
    }
}

/// How the mock handlers and steps run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Direct,
    Suspending,
}

/// Which dispatcher drives the turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Direct,
    Suspending,
}

/// Handler flavours paired with the dispatchers able to run them
const COMBINATIONS: [(Flavor, Mode); 3] = [
    (Flavor::Direct, Mode::Direct),
    (Flavor::Direct, Mode::Suspending),
    (Flavor::Suspending, Mode::Suspending),
];

fn mock_handler(flavor: Flavor, name: &'static str, script: Script, recorder: &Arc<Recorder>) -> Handler {
    let mock = Mock {
        name,
        script,
        recorder: Arc::clone(recorder),
    };
    match flavor {
        Flavor::Direct => Handler::direct(mock),
        Flavor::Suspending => Handler::suspending(AsyncMock(mock)),
    }
}

fn recording_step(flavor: Flavor, name: &'static str, recorder: &Arc<Recorder>) -> StepDefinition {
    let step = StepDefinition::new(name);
    match flavor {
        Flavor::Direct => {
            let recorder = Arc::clone(recorder);
            step.answer(move |bus| {
                recorder.record(format!("step:{name}"));
                bus.end(name);
                Ok(())
            })
        }
        Flavor::Suspending => step.answer_async(AsyncStep {
            name,
            recorder: Arc::clone(recorder),
        }),
    }
}

/// Stories of the end-to-end scenarios
pub fn scenario_bot(flavor: Flavor, recorder: &Arc<Recorder>) -> Arc<BotDefinition> {
    let handler = |name, script| mock_handler(flavor, name, script, recorder);
    let definition = BotDefinition::builder("scenarios")
        .story(StoryDefinition::simple("greet", handler("greet", Script::answering("Hello"))))
        .story(
            StoryDefinition::builder("order", handler("order", Script::answering("What would you like?")))
                .starter_intent("order")
                .step(recording_step(flavor, "pick-item", recorder).select_on_entity("item"))
                .step(recording_step(flavor, "confirm", recorder).select_on_entity("confirm"))
                .build()
                .unwrap(),
        )
        .story(StoryDefinition::simple(
            "closed",
            handler(
                "closed",
                Script {
                    end_in_preconditions: true,
                    answer: Some("never sent"),
                    ..Script::default()
                },
            ),
        ))
        .story(
            StoryDefinition::builder("map", handler("map", Script::answering("Here is the map")))
                .starter_intent("map")
                .unsupported_interface(UserInterfaceType::VoiceAssistant)
                .build()
                .unwrap(),
        )
        .story(StoryDefinition::simple("silent", handler("silent", Script::default())))
        .story(StoryDefinition::simple(
            "broken",
            handler(
                "broken",
                Script {
                    fail_in_preconditions: true,
                    ..Script::default()
                },
            ),
        ))
        .unknown_story(StoryDefinition::simple(
            Intent::unknown(),
            handler("unknown", Script::answering("Sorry")),
        ))
        .build()
        .unwrap();
    Arc::new(definition)
}

pub async fn dispatch(
    mode: Mode,
    definition: &Arc<BotDefinition>,
    bus: &mut TurnBus,
) -> Result<TurnOutcome, DispatchError> {
    let story = definition.resolve_story(bus.intent().map(Intent::name));
    let outcome = match mode {
        Mode::Direct => DirectDispatcher::new(Arc::clone(definition)).dispatch(&story, bus),
        Mode::Suspending => {
            let dispatcher = SuspendingDispatcher::new(Arc::clone(definition));
            dispatcher.dispatch(&story, bus).await
        }
    };
    outcome
}

fn turn(intent: &str) -> TurnBus {
    TurnBus::new(Some(intent), None)
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

mod tests {
    use super::*;

    #[tokio::test]
    async fn test_story_without_steps_answers_once() {
        for (flavor, mode) in COMBINATIONS {
            let recorder = Arc::new(Recorder::default());
            let bot = scenario_bot(flavor, &recorder);
            let mut bus = turn("greet");

            let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();

            assert_eq!(recorder.count("greet:handle"), 1, "{flavor:?}/{mode:?}");
            assert_eq!(bus.final_answer_count(), 1);
            assert_eq!(bus.answers(), vec!["Hello"]);
            assert_eq!(outcome.final_state(), Some(&TurnState::Finished { answered: true }));
        }
    }

    #[tokio::test]
    async fn test_entity_selects_matching_step_only() {
        for (flavor, mode) in COMBINATIONS {
            let recorder = Arc::new(Recorder::default());
            let bot = scenario_bot(flavor, &recorder);
            let mut bus = turn("order").with_entity(EntityValue::new("item", "pizza"));

            let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();

            assert_eq!(outcome.step.as_deref(), Some("pick-item"), "{flavor:?}/{mode:?}");
            assert_eq!(bus.step(), Some("pick-item"));
            assert_eq!(recorder.count("step:pick-item"), 1);
            assert_eq!(recorder.count("step:confirm"), 0);
            // The step answered, so the default answer did not run
            assert_eq!(recorder.count("order:handle"), 0);
            assert_eq!(bus.answers(), vec!["pick-item"]);
        }
    }

    #[tokio::test]
    async fn test_unregistered_intent_runs_unknown_story() {
        for (flavor, mode) in COMBINATIONS {
            let recorder = Arc::new(Recorder::default());
            let bot = scenario_bot(flavor, &recorder);
            let mut bus = turn("bogus-intent-xyz");

            let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();

            assert_eq!(outcome.story_id.as_deref(), Some(bot.unknown_story().id()));
            assert_eq!(recorder.count("unknown:handle"), 1, "{flavor:?}/{mode:?}");
            assert_eq!(bus.answers(), vec!["Sorry"]);
        }
    }

    #[tokio::test]
    async fn test_preconditions_ending_turn_skip_everything_else() {
        for (flavor, mode) in COMBINATIONS {
            let recorder = Arc::new(Recorder::default());
            let bot = scenario_bot(flavor, &recorder);
            let mut bus = turn("closed");

            let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();

            assert_eq!(recorder.entries(), vec!["closed:preconditions"], "{flavor:?}/{mode:?}");
            assert_eq!(outcome.final_state(), Some(&TurnState::EndedEarly));
            assert!(outcome.step.is_none());
            assert_eq!(bus.final_answer_count(), 1);
            assert_eq!(bus.answers(), vec!["closed"]);
        }
    }

    #[tokio::test]
    async fn test_unsupported_interface_redirects_to_unknown() {
        for (flavor, mode) in COMBINATIONS {
            let recorder = Arc::new(Recorder::default());
            let bot = scenario_bot(flavor, &recorder);
            let mut bus = turn("map").with_user_interface(UserInterfaceType::VoiceAssistant);

            let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();

            assert_eq!(
                outcome.states,
                vec![TurnState::Redirected {
                    to: bot.unknown_story().id().to_string()
                }]
            );
            assert_eq!(outcome.answering().story_id.as_deref(), Some(bot.unknown_story().id()));
            assert_eq!(recorder.count("map:preconditions"), 0, "{flavor:?}/{mode:?}");
            assert_eq!(recorder.count("map:handle"), 0);
            assert_eq!(recorder.count("unknown:handle"), 1);
            assert_eq!(bus.answers(), vec!["Sorry"]);
        }
    }

    #[tokio::test]
    async fn test_supported_interface_is_not_redirected() {
        let recorder = Arc::new(Recorder::default());
        let bot = scenario_bot(Flavor::Direct, &recorder);
        let mut bus = turn("map");
        let outcome = dispatch(Mode::Direct, &bot, &mut bus).await.unwrap();
        assert!(outcome.redirect.is_none());
        assert_eq!(bus.answers(), vec!["Here is the map"]);
    }

    #[tokio::test]
    async fn test_unanswered_turn_finishes_without_error() {
        for (flavor, mode) in COMBINATIONS {
            let recorder = Arc::new(Recorder::default());
            let bot = scenario_bot(flavor, &recorder);
            let mut bus = turn("silent");

            let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();

            assert_eq!(outcome.final_state(), Some(&TurnState::Finished { answered: false }));
            assert_eq!(recorder.count("silent:handle"), 1);
            assert!(bus.answers().is_empty());
        }
    }

    #[tokio::test]
    async fn test_precondition_error_reaches_caller() {
        for (flavor, mode) in COMBINATIONS {
            let recorder = Arc::new(Recorder::default());
            let bot = scenario_bot(flavor, &recorder);
            let mut bus = turn("broken");

            let err = dispatch(mode, &bot, &mut bus).await.unwrap_err();

            assert!(
                matches!(err, DispatchError::Handler(HandlerError::Failed(ref m)) if m == "backend unavailable"),
                "{flavor:?}/{mode:?}: {err}"
            );
            assert_eq!(recorder.count("broken:instantiate"), 0);
        }
    }

    #[tokio::test]
    async fn test_preseeded_step_runs_when_nothing_selects() {
        let recorder = Arc::new(Recorder::default());
        let bot = scenario_bot(Flavor::Direct, &recorder);
        let mut bus = turn("order").with_step("confirm");

        let outcome = dispatch(Mode::Suspending, &bot, &mut bus).await.unwrap();

        assert_eq!(outcome.step.as_deref(), Some("confirm"));
        assert_eq!(recorder.count("step:confirm"), 1);
    }

    #[tokio::test]
    async fn test_dispatch_by_handler() {
        let recorder = Arc::new(Recorder::default());
        let bot = scenario_bot(Flavor::Direct, &recorder);
        let order = bot.find_story_by_id("order");

        let mut bus = turn("order").with_entity(EntityValue::new("confirm", true));
        let outcome = SuspendingDispatcher::new(Arc::clone(&bot))
            .dispatch_handler(order.handler(), &mut bus)
            .await
            .unwrap();
        assert_eq!(outcome.story_id.as_deref(), Some("order"));
        assert_eq!(outcome.step.as_deref(), Some("confirm"));

        // A handler owned by no story runs without step selection
        let loose = Handler::from_fn(|bus| {
            bus.end("loose");
            Ok(())
        });
        let mut bus = turn("order").with_entity(EntityValue::new("confirm", true));
        let outcome = DirectDispatcher::new(Arc::clone(&bot))
            .dispatch_handler(&loose, &mut bus)
            .unwrap();
        assert!(outcome.story_id.is_none());
        assert!(outcome.step.is_none());
        assert_eq!(bus.answers(), vec!["loose"]);
    }

    #[tokio::test]
    async fn test_data_step_refines_before_body() {
        let story = StoryDefinition::builder(
            "quote",
            Handler::direct(crate::definition::ConfigurableStoryHandler::new(
                |_bus: &mut dyn Bus| Ok(120u32),
                |_ctx: &DefinitionContext<'_>, _: &u32| MockDefinition {
                    name: "quote",
                    answer: Some("default"),
                    recorder: Arc::new(Recorder::default()),
                },
            )),
        )
        .starter_intent("quote")
        .step(
            StepDefinition::new("discount")
                .select_with_data(|_bus, price: &u32| *price > 100)
                .refine_data(|_bus, price: &u32| Ok(price / 10))
                .answer_with_data(|bus, discount: &u32| {
                    bus.end(&format!("discount {discount}"));
                    Ok(())
                }),
        )
        .build()
        .unwrap();
        let bot = Arc::new(BotDefinition::builder("quotes").story(story).build().unwrap());

        for mode in [Mode::Direct, Mode::Suspending] {
            let mut bus = turn("quote");
            let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();
            assert_eq!(
                outcome.states,
                vec![
                    TurnState::CheckingPreconditions,
                    TurnState::Instantiating,
                    TurnState::SelectingStep,
                    TurnState::RefiningStepData {
                        step: "discount".to_string()
                    },
                    TurnState::RunningStep {
                        step: "discount".to_string()
                    },
                    TurnState::Finished { answered: true },
                ]
            );
            assert_eq!(bus.answers(), vec!["discount 12"]);
        }
    }

    #[tokio::test]
    async fn test_step_preconditions_can_end_turn() {
        let recorder = Arc::new(Recorder::default());
        let creator_recorder = Arc::clone(&recorder);
        let body_recorder = Arc::clone(&recorder);
        let story = StoryDefinition::builder(
            "quote",
            Handler::direct(crate::definition::ConfigurableStoryHandler::new(
                |_bus: &mut dyn Bus| Ok(0u32),
                move |_ctx: &DefinitionContext<'_>, _: &u32| MockDefinition {
                    name: "quote",
                    answer: Some("default"),
                    recorder: Arc::clone(&creator_recorder),
                },
            )),
        )
        .starter_intent("quote")
        .step(
            StepDefinition::new("check")
                .select_when(|_| true)
                .refine_data(|bus, stock: &u32| {
                    if *stock == 0 {
                        bus.end("out of stock");
                    }
                    Ok(*stock)
                })
                .answer(move |bus| {
                    body_recorder.record("step:check");
                    bus.end("in stock");
                    Ok(())
                }),
        )
        .build()
        .unwrap();
        let bot = Arc::new(BotDefinition::builder("quotes").story(story).build().unwrap());

        for mode in [Mode::Direct, Mode::Suspending] {
            let mut bus = turn("quote");
            let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();
            assert_eq!(outcome.final_state(), Some(&TurnState::EndedEarly));
            assert_eq!(outcome.step.as_deref(), Some("check"));
            assert_eq!(bus.answers(), vec!["out of stock"]);
        }
        assert_eq!(recorder.count("step:check"), 0);
        assert_eq!(recorder.count("quote:handle"), 0);
    }

    #[tokio::test]
    async fn test_data_step_without_data_fails() {
        let story = StoryDefinition::builder("quote", Handler::from_fn(|_| Ok(())))
            .starter_intent("quote")
            .step(
                StepDefinition::new("check")
                    .select_when(|_| true)
                    .refine_data(|_bus, stock: &u32| Ok(*stock)),
            )
            .build()
            .unwrap();
        let bot = Arc::new(BotDefinition::builder("quotes").story(story).build().unwrap());

        let mut bus = turn("quote");
        let err = dispatch(Mode::Direct, &bot, &mut bus).await.unwrap_err();
        assert!(matches!(err, DispatchError::Handler(HandlerError::DataMismatch { .. })));
    }

    // ========================================================================
    // Conformance: both dispatchers walk the same transitions
    // ========================================================================

    fn conformance_inputs() -> Vec<TurnBus> {
        vec![
            turn("greet"),
            turn("order"),
            turn("order").with_entity(EntityValue::new("item", "pizza")),
            turn("order").with_entity(EntityValue::new("confirm", true)),
            turn("order").with_step("confirm"),
            turn("closed"),
            turn("map"),
            turn("map").with_user_interface(UserInterfaceType::VoiceAssistant),
            turn("silent"),
            turn("bogus-intent-xyz"),
            TurnBus::new(None, None),
        ]
    }

    #[tokio::test]
    async fn test_dispatchers_are_interchangeable() {
        for input in 0..conformance_inputs().len() {
            let mut runs = Vec::new();
            for (flavor, mode) in COMBINATIONS {
                let recorder = Arc::new(Recorder::default());
                let bot = scenario_bot(flavor, &recorder);
                let mut bus = conformance_inputs().swap_remove(input);
                let outcome = dispatch(mode, &bot, &mut bus).await.unwrap();
                let answers: Vec<String> = bus.answers().into_iter().map(str::to_string).collect();
                runs.push((outcome, recorder.entries(), answers));
            }

            let (reference, rest) = runs.split_first().unwrap();
            for (run, (flavor, mode)) in rest.iter().zip(&COMBINATIONS[1..]) {
                assert_eq!(run, reference, "input {input}, {flavor:?}/{mode:?}");
            }
        }
    }

    // ========================================================================
    // Suspending stories on the direct dispatcher
    // ========================================================================

    #[tokio::test]
    async fn test_direct_dispatch_refuses_suspending_handler() {
        let recorder = Arc::new(Recorder::default());
        let bot = scenario_bot(Flavor::Suspending, &recorder);
        let mut bus = turn("order").with_entity(EntityValue::new("item", "pizza"));

        let err = dispatch(Mode::Direct, &bot, &mut bus).await.unwrap_err();

        assert!(
            matches!(err, DispatchError::Suspending { ref story, ref part } if story == "order" && part == "handler"),
            "{err}"
        );
        assert!(recorder.entries().is_empty());
        assert!(bus.answers().is_empty());
        assert!(bus.step().is_none());
    }

    #[test]
    fn test_direct_dispatch_refuses_suspending_step_outside_runtime() {
        let recorder = Arc::new(Recorder::default());
        let handler = mock_handler(Flavor::Direct, "order", Script::answering("?"), &recorder);
        let story = StoryDefinition::builder("order", handler)
            .starter_intent("order")
            .step(recording_step(Flavor::Direct, "pick-item", &recorder).select_on_entity("item"))
            .step(recording_step(Flavor::Suspending, "confirm", &recorder).select_on_entity("confirm"))
            .build()
            .unwrap();
        let bot = Arc::new(BotDefinition::builder("orders").story(story).build().unwrap());
        let story = bot.find_story_by_id("order");

        // The suspending step is never selected here, the story is refused anyway
        let mut bus = turn("order").with_entity(EntityValue::new("item", "pizza"));
        let err = DirectDispatcher::new(Arc::clone(&bot)).dispatch(story, &mut bus).unwrap_err();

        assert!(matches!(err, DispatchError::Suspending { ref part, .. } if part == "step confirm"), "{err}");
        assert!(recorder.entries().is_empty());
    }

    #[tokio::test]
    async fn test_timer_bound_story_runs_on_suspending_dispatcher() {
        let recorder = Arc::new(Recorder::default());
        let bot = scenario_bot(Flavor::Suspending, &recorder);
        let mut bus = turn("order").with_entity(EntityValue::new("confirm", true));

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            SuspendingDispatcher::new(Arc::clone(&bot)).dispatch(bot.find_story_by_id("order"), &mut bus),
        )
        .await
        .expect("turn should finish")
        .unwrap();

        assert_eq!(outcome.step.as_deref(), Some("confirm"));
        assert_eq!(
            recorder.entries(),
            vec!["order:preconditions", "order:instantiate", "step:confirm"]
        );
        assert_eq!(bus.answers(), vec!["confirm"]);
    }
}
