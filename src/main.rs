//! Storyline demo - dispatches turns of a small pizza bot
//!
//! Each argument is one turn of the same dialog: `intent[,role=value...]`.
//! The `text` role sets the user sentence, `-` stands for a turn without
//! intent.
//!
//! ```text
//! storyline greet order,size=large yes map keyword,text=_reset_
//! ```

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use storyline::bus::{ConnectorType, Dialog, EntityValue, UserInterfaceType};
use storyline::connector::{ConnectorKey, ConnectorResolver};
use storyline::definition::{
    AsyncHandlerDefinition, AsyncStoryHandler, ConfigurableStoryHandler, DefinitionContext, HandlerDefinition,
    HandlerError, HandlerResult, TurnData,
};
use storyline::{Bot, BotDefinition, Bus, DispatchConfig, Handler, StepDefinition, StoryDefinition, TurnBus};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "storyline=info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = DispatchConfig::from_env();
    let interface: UserInterfaceType = std::env::var("STORYLINE_INTERFACE")
        .ok()
        .map(|value| value.parse())
        .transpose()?
        .unwrap_or_default();
    let connector = std::env::var("STORYLINE_CONNECTOR").unwrap_or_else(|_| "web".to_string());
    tracing::info!(bot = %config.bot_id, %connector, ?interface, "starting demo bot");

    let bot = Bot::new(Arc::new(pizza_bot(config)?));

    let mut dialog = Dialog::new();
    let mut story: Option<String> = None;
    let mut step: Option<String> = None;
    for arg in std::env::args().skip(1) {
        let turn = Turn::parse(&arg);
        let mut bus = TurnBus::in_dialog(dialog, turn.intent.as_deref(), turn.text.as_deref())
            .with_connector(connector.clone(), ConnectorType::new(connector.clone(), interface));
        for entity in turn.entities {
            bus = bus.with_entity(entity);
        }
        if let Some(story) = &story {
            bus = bus.with_story(story.clone());
        }
        if let Some(step) = &step {
            bus = bus.with_step(step.clone());
        }

        let outcome = bot.handle_async(&mut bus).await?;
        for answer in bus.answers() {
            println!("{answer}");
        }
        let answering = outcome.answering();
        tracing::info!(
            story = ?answering.story_id,
            step = ?answering.step,
            state = ?answering.final_state(),
            "turn handled"
        );

        story = bus.current_story_id().map(str::to_string);
        step = bus.step().map(str::to_string);
        dialog = bus.into_dialog();
    }

    Ok(())
}

/// One turn parsed from the command line
#[derive(Debug, Default)]
struct Turn {
    intent: Option<String>,
    text: Option<String>,
    entities: Vec<EntityValue>,
}

impl Turn {
    fn parse(arg: &str) -> Self {
        let mut parts = arg.split(',');
        let mut turn = Turn {
            intent: parts.next().filter(|i| !i.is_empty() && *i != "-").map(str::to_string),
            ..Turn::default()
        };
        for part in parts {
            match part.split_once('=') {
                Some(("text", text)) => turn.text = Some(text.to_string()),
                Some((role, value)) => turn.entities.push(EntityValue::new(role, value)),
                None => turn.entities.push(EntityValue::new(part, true)),
            }
        }
        turn
    }
}

// ============================================================================
// Demo stories
// ============================================================================

fn pizza_bot(config: DispatchConfig) -> Result<BotDefinition, storyline::definition::DefinitionError> {
    let connectors = Arc::new(ConnectorResolver::new());
    connectors.register::<OrderDefinition, VoicePrompt, _>(ConnectorKey::Type("alexa".to_string()), |order| {
        VoicePrompt(format!(
            "Say the name of a pizza, for example {}.",
            order.menu.first().copied().unwrap_or("margherita")
        ))
    });

    let order = StoryDefinition::builder(
        "order",
        Handler::direct(ConfigurableStoryHandler::new(
            |_bus: &mut dyn Bus| Ok(Menu::default()),
            |ctx: &DefinitionContext<'_>, menu: &Menu| OrderDefinition {
                menu: menu.pizzas.clone(),
                connectors: Arc::clone(ctx.connectors),
            },
        )),
    )
    .starter_intent("order")
    .secondary_intent("yes")
    .step(StepDefinition::new("size").select_on_entity("size").answer(|bus| {
        let size = bus
            .entity("size")
            .and_then(|e| e.value.as_str().map(str::to_string))
            .unwrap_or_default();
        bus.end(&format!("A {size} pizza, noted. Shall I confirm?"));
        Ok(())
    }))
    .step(StepDefinition::new("confirm").intent("yes").answer(|bus| {
        bus.end("Your order is confirmed.");
        Ok(())
    }))
    .build()?;

    let map = StoryDefinition::builder("map", Handler::suspending(MapStory))
        .starter_intent("map")
        .unsupported_interface(UserInterfaceType::VoiceAssistant)
        .build()?;

    BotDefinition::builder(config.bot_id.clone())
        .with_config(config)
        .story(StoryDefinition::simple(
            "greet",
            Handler::from_fn(|bus| {
                bus.end("Hello! I can take a pizza order or show you the way to the shop.");
                Ok(())
            }),
        ))
        .story(order)
        .story(map)
        .hello("greet")
        .keyword("_reset_", |bus| {
            bus.set_step(None);
            bus.end("Dialog reset.");
            Ok(())
        })
        .connectors(connectors)
        .build()
}

#[derive(Debug, Clone)]
struct Menu {
    pizzas: Vec<&'static str>,
}

impl Default for Menu {
    fn default() -> Self {
        Self {
            pizzas: vec!["margherita", "regina", "quattro formaggi"],
        }
    }
}

struct VoicePrompt(String);

struct OrderDefinition {
    menu: Vec<&'static str>,
    connectors: Arc<ConnectorResolver>,
}

impl HandlerDefinition for OrderDefinition {
    fn handle(&mut self, bus: &mut dyn Bus) -> HandlerResult {
        let prompt = self
            .connectors
            .resolve_for_story::<Self, VoicePrompt>(self, &*bus)
            .map_or_else(|| format!("Which pizza? We have {}.", self.menu.join(", ")), |voice| voice.0);
        bus.end(&prompt);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Shop {
    name: &'static str,
    address: &'static str,
}

struct MapStory;

#[async_trait]
impl AsyncStoryHandler for MapStory {
    async fn check_preconditions(&self, _bus: &mut dyn Bus) -> HandlerResult<TurnData> {
        // Stands in for a geocoding call
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(TurnData::new(Shop {
            name: "Pizzeria Centrale",
            address: "12 Via Roma",
        }))
    }

    fn new_definition(&self, ctx: &DefinitionContext<'_>) -> HandlerResult<Box<dyn AsyncHandlerDefinition>> {
        let shop = ctx
            .data
            .get::<Shop>()
            .cloned()
            .ok_or_else(HandlerError::data_mismatch::<Shop>)?;
        Ok(Box::new(MapDefinition { shop }))
    }
}

struct MapDefinition {
    shop: Shop,
}

#[async_trait]
impl AsyncHandlerDefinition for MapDefinition {
    async fn answer(&mut self, bus: &mut dyn Bus) -> HandlerResult {
        bus.end(&format!("{} is at {}.", self.shop.name, self.shop.address));
        Ok(())
    }
}
