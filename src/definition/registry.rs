//! Bot definition: the immutable story registry of a bot
//!
//! Resolution never fails. An intent nobody declares degrades to a reserved
//! intent, and a story lookup that finds nothing degrades to a fallback
//! story, ultimately the unknown story.

use super::fallback::{self, KeywordListener};
use super::handler::{Handler, HandlerResult};
use super::intent::ReservedName;
use super::story::StoryTag;
use super::{DefinitionError, Intent, StoryDefinition};
use crate::bus::Bus;
use crate::config::{DispatchConfig, RagConfig};
use crate::connector::ConnectorResolver;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Stories used when no declared story claims the intent
#[derive(Debug, Clone, Copy)]
pub struct Fallbacks<'a> {
    pub unknown: &'a Arc<StoryDefinition>,
    pub keyword: &'a Arc<StoryDefinition>,
    pub rag_excluded: Option<&'a Arc<StoryDefinition>>,
    pub rag: Option<&'a Arc<StoryDefinition>>,
    pub rag_config: Option<&'a RagConfig>,
}

/// Wraps a raw intent name into an [`Intent`].
///
/// The name is kept when any story declares it, as a starter or secondary
/// intent of the story or of one of its steps. Otherwise a reserved intent
/// is substituted, checking `keyword`, then `rag-excluded`, then falling back
/// to `unknown`.
pub fn resolve_intent(stories: &[Arc<StoryDefinition>], intent_name: &str) -> Intent {
    let intent = Intent::new(intent_name);
    if stories.iter().any(|story| story.supports_intent(&intent)) {
        return intent;
    }
    match ReservedName::classify(intent_name) {
        ReservedName::Keyword => Intent::keyword(),
        ReservedName::RagExcluded => Intent::rag_excluded(),
        ReservedName::Other => Intent::unknown(),
    }
}

/// Finds the story starting with the intent, first match in list order.
pub fn resolve_story(
    stories: &[Arc<StoryDefinition>],
    intent_name: Option<&str>,
    fallbacks: &Fallbacks<'_>,
) -> Arc<StoryDefinition> {
    let Some(intent_name) = intent_name else {
        return Arc::clone(fallbacks.unknown);
    };
    let intent = resolve_intent(stories, intent_name);
    if let Some(story) = stories.iter().find(|story| story.is_starter_intent(&intent)) {
        return Arc::clone(story);
    }

    // The raw name decides: a story may declare `keyword` without starting with it
    let fallback = match ReservedName::classify(intent_name) {
        ReservedName::Keyword => fallbacks.keyword,
        ReservedName::RagExcluded => fallbacks.rag_excluded.unwrap_or(fallbacks.unknown),
        ReservedName::Other if fallbacks.rag_config.is_some_and(|c| c.enabled) => {
            fallbacks.rag.unwrap_or(fallbacks.unknown)
        }
        ReservedName::Other => fallbacks.unknown,
    };
    tracing::debug!(intent = %intent, story = fallback.id(), "no story starts with intent, using fallback");
    Arc::clone(fallback)
}

/// Step to owning story side-table, built once with the registry
#[derive(Debug, Default)]
struct StepIndex {
    /// Step name to index of the first story declaring it
    owners: HashMap<String, usize>,
    /// Step names of each story, by story index
    by_story: Vec<Vec<String>>,
}

impl StepIndex {
    fn build(stories: &[Arc<StoryDefinition>]) -> Self {
        let mut index = Self::default();
        for (i, story) in stories.iter().enumerate() {
            let names: Vec<String> = story.all_steps().iter().map(|s| s.name().to_string()).collect();
            for name in &names {
                index.owners.entry(name.clone()).or_insert(i);
            }
            index.by_story.push(names);
        }
        index
    }
}

/// The immutable set of stories of a bot
#[derive(Debug)]
pub struct BotDefinition {
    bot_id: String,
    namespace: String,
    stories: Vec<Arc<StoryDefinition>>,
    unknown_story: Arc<StoryDefinition>,
    keyword_story: Arc<StoryDefinition>,
    rag_excluded_story: Arc<StoryDefinition>,
    rag_story: Arc<StoryDefinition>,
    hello_story: Option<Arc<StoryDefinition>>,
    goodbye_story: Option<Arc<StoryDefinition>>,
    no_input_story: Option<Arc<StoryDefinition>>,
    rag_config: RagConfig,
    default_unknown_answer: String,
    default_rag_excluded_answer: String,
    steps: StepIndex,
    connectors: Arc<ConnectorResolver>,
}

impl BotDefinition {
    pub fn builder(bot_id: impl Into<String>) -> BotDefinitionBuilder {
        BotDefinitionBuilder::new(bot_id)
    }

    pub fn bot_id(&self) -> &str {
        &self.bot_id
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn stories(&self) -> &[Arc<StoryDefinition>] {
        &self.stories
    }

    pub fn unknown_story(&self) -> &Arc<StoryDefinition> {
        &self.unknown_story
    }

    pub fn keyword_story(&self) -> &Arc<StoryDefinition> {
        &self.keyword_story
    }

    pub fn rag_excluded_story(&self) -> &Arc<StoryDefinition> {
        &self.rag_excluded_story
    }

    pub fn rag_story(&self) -> &Arc<StoryDefinition> {
        &self.rag_story
    }

    pub fn hello_story(&self) -> Option<&Arc<StoryDefinition>> {
        self.hello_story.as_ref()
    }

    pub fn goodbye_story(&self) -> Option<&Arc<StoryDefinition>> {
        self.goodbye_story.as_ref()
    }

    pub fn no_input_story(&self) -> Option<&Arc<StoryDefinition>> {
        self.no_input_story.as_ref()
    }

    /// Story of a dialog that starts without intent: hello, else the first story.
    pub fn default_story(&self) -> &Arc<StoryDefinition> {
        self.hello_story
            .as_ref()
            .or_else(|| self.stories.first())
            .unwrap_or(&self.unknown_story)
    }

    pub fn rag_config(&self) -> &RagConfig {
        &self.rag_config
    }

    pub fn default_unknown_answer(&self) -> &str {
        &self.default_unknown_answer
    }

    pub fn default_rag_excluded_answer(&self) -> &str {
        &self.default_rag_excluded_answer
    }

    pub fn connectors(&self) -> &Arc<ConnectorResolver> {
        &self.connectors
    }

    fn fallbacks(&self) -> Fallbacks<'_> {
        Fallbacks {
            unknown: &self.unknown_story,
            keyword: &self.keyword_story,
            rag_excluded: Some(&self.rag_excluded_story),
            rag: Some(&self.rag_story),
            rag_config: Some(&self.rag_config),
        }
    }

    pub fn resolve_intent(&self, intent_name: &str) -> Intent {
        resolve_intent(&self.stories, intent_name)
    }

    pub fn resolve_story(&self, intent_name: Option<&str>) -> Arc<StoryDefinition> {
        resolve_story(&self.stories, intent_name, &self.fallbacks())
    }

    /// Declared stories, then the fallback stories
    pub fn all_stories(&self) -> impl Iterator<Item = &Arc<StoryDefinition>> {
        self.stories.iter().chain([
            &self.unknown_story,
            &self.keyword_story,
            &self.rag_excluded_story,
            &self.rag_story,
        ])
    }

    /// Story with this id, or the unknown story
    pub fn find_story_by_id(&self, id: &str) -> &Arc<StoryDefinition> {
        self.all_stories()
            .find(|story| story.id() == id)
            .unwrap_or(&self.unknown_story)
    }

    /// Story owning this handler
    pub fn find_story_by_handler(&self, handler: &Handler) -> Option<&Arc<StoryDefinition>> {
        self.all_stories().find(|story| story.handler().is_same(handler))
    }

    /// Story declaring a step with this name
    pub fn story_for_step(&self, step_name: &str) -> Option<&Arc<StoryDefinition>> {
        self.steps
            .owners
            .get(step_name)
            .and_then(|&i| self.stories.get(i))
    }

    /// Names of the steps of a declared story, depth first
    pub fn step_names(&self, story_id: &str) -> &[String] {
        self.stories
            .iter()
            .position(|story| story.id() == story_id)
            .and_then(|i| self.steps.by_story.get(i))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Intent of a step: its own, else the main intent of its story.
    pub fn step_intent(&self, step_name: &str) -> Option<Intent> {
        let story = self.story_for_step(step_name)?;
        let step = story.find_step(step_name)?;
        Some(step.own_intent().unwrap_or(story.main_intent()).clone())
    }

    pub fn stories_tagged(&self, tag: StoryTag) -> impl Iterator<Item = &Arc<StoryDefinition>> {
        self.stories.iter().filter(move |story| story.has_tag(tag))
    }

    /// Declared story for a well-known intent. Intents that only reach the
    /// unknown or keyword story yield `None`.
    fn find_declared(&self, intent: Option<&Intent>) -> Option<Arc<StoryDefinition>> {
        let story = self.resolve_story(Some(intent?.name()));
        let fallback = Arc::ptr_eq(&story, &self.unknown_story) || Arc::ptr_eq(&story, &self.keyword_story);
        (!fallback).then_some(story)
    }
}

/// Builder for [`BotDefinition`]
pub struct BotDefinitionBuilder {
    config: DispatchConfig,
    stories: Vec<StoryDefinition>,
    unknown_story: Option<StoryDefinition>,
    keyword_story: Option<StoryDefinition>,
    rag_excluded_story: Option<StoryDefinition>,
    rag_story: Option<StoryDefinition>,
    hello: Option<Intent>,
    goodbye: Option<Intent>,
    no_input: Option<Intent>,
    keywords: HashMap<String, KeywordListener>,
    connectors: Arc<ConnectorResolver>,
}

impl BotDefinitionBuilder {
    pub fn new(bot_id: impl Into<String>) -> Self {
        Self {
            config: DispatchConfig {
                bot_id: bot_id.into(),
                ..DispatchConfig::default()
            },
            stories: Vec::new(),
            unknown_story: None,
            keyword_story: None,
            rag_excluded_story: None,
            rag_story: None,
            hello: None,
            goodbye: None,
            no_input: None,
            keywords: HashMap::new(),
            connectors: Arc::new(ConnectorResolver::new()),
        }
    }

    /// Applies the whole configuration, bot id included.
    #[must_use]
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.config.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn story(mut self, story: StoryDefinition) -> Self {
        self.stories.push(story);
        self
    }

    #[must_use]
    pub fn stories(mut self, stories: impl IntoIterator<Item = StoryDefinition>) -> Self {
        self.stories.extend(stories);
        self
    }

    #[must_use]
    pub fn unknown_story(mut self, story: StoryDefinition) -> Self {
        self.unknown_story = Some(story);
        self
    }

    #[must_use]
    pub fn keyword_story(mut self, story: StoryDefinition) -> Self {
        self.keyword_story = Some(story);
        self
    }

    #[must_use]
    pub fn rag_excluded_story(mut self, story: StoryDefinition) -> Self {
        self.rag_excluded_story = Some(story);
        self
    }

    #[must_use]
    pub fn rag_story(mut self, story: StoryDefinition) -> Self {
        self.rag_story = Some(story);
        self
    }

    #[must_use]
    pub fn rag(mut self, rag: RagConfig) -> Self {
        self.config.rag = rag;
        self
    }

    #[must_use]
    pub fn hello(mut self, intent: impl Into<Intent>) -> Self {
        self.hello = Some(intent.into());
        self
    }

    #[must_use]
    pub fn goodbye(mut self, intent: impl Into<Intent>) -> Self {
        self.goodbye = Some(intent.into());
        self
    }

    #[must_use]
    pub fn no_input(mut self, intent: impl Into<Intent>) -> Self {
        self.no_input = Some(intent.into());
        self
    }

    #[must_use]
    pub fn unknown_answer(mut self, answer: impl Into<String>) -> Self {
        self.config.unknown_answer = answer.into();
        self
    }

    #[must_use]
    pub fn rag_excluded_answer(mut self, answer: impl Into<String>) -> Self {
        self.config.rag_excluded_answer = answer.into();
        self
    }

    /// Registers a listener of the built-in keyword story.
    #[must_use]
    pub fn keyword<F>(mut self, keyword: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&mut dyn Bus) -> HandlerResult + Send + Sync + 'static,
    {
        self.keywords.insert(keyword.into(), Arc::new(listener));
        self
    }

    /// Connector specializations available to the handlers of this bot
    #[must_use]
    pub fn connectors(mut self, connectors: Arc<ConnectorResolver>) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn build(self) -> Result<BotDefinition, DefinitionError> {
        let mut ids = HashSet::new();
        let mut starters: HashMap<&Intent, &str> = HashMap::new();
        for story in &self.stories {
            if story.starter_intents().is_empty() {
                return Err(DefinitionError::MissingMainIntent {
                    story: story.id().to_string(),
                });
            }
            if !ids.insert(story.id()) {
                return Err(DefinitionError::DuplicateStoryId(story.id().to_string()));
            }
            for intent in story.starter_intents() {
                if let Some(first) = starters.get(intent) {
                    tracing::warn!(
                        intent = %intent,
                        story = story.id(),
                        kept = *first,
                        "starter intent already claimed by another story, first one wins"
                    );
                } else {
                    starters.insert(intent, story.id());
                }
            }
        }

        let config = self.config;
        let stories: Vec<Arc<StoryDefinition>> = self.stories.into_iter().map(Arc::new).collect();
        let steps = StepIndex::build(&stories);

        let mut definition = BotDefinition {
            unknown_story: Arc::new(
                self.unknown_story
                    .unwrap_or_else(|| fallback::unknown_story(config.unknown_answer.clone())),
            ),
            keyword_story: Arc::new(
                self.keyword_story
                    .unwrap_or_else(|| fallback::keyword_story(self.keywords)),
            ),
            rag_excluded_story: Arc::new(
                self.rag_excluded_story
                    .unwrap_or_else(|| fallback::rag_excluded_story(config.rag_excluded_answer.clone())),
            ),
            rag_story: Arc::new(
                self.rag_story
                    .unwrap_or_else(|| fallback::rag_story(config.unknown_answer.clone())),
            ),
            hello_story: None,
            goodbye_story: None,
            no_input_story: None,
            stories,
            steps,
            rag_config: config.rag,
            default_unknown_answer: config.unknown_answer,
            default_rag_excluded_answer: config.rag_excluded_answer,
            bot_id: config.bot_id,
            namespace: config.namespace,
            connectors: self.connectors,
        };
        definition.hello_story = definition.find_declared(self.hello.as_ref());
        definition.goodbye_story = definition.find_declared(self.goodbye.as_ref());
        definition.no_input_story = definition.find_declared(self.no_input.as_ref());

        tracing::info!(
            bot = %definition.bot_id,
            namespace = %definition.namespace,
            stories = definition.stories.len(),
            "bot definition built"
        );
        Ok(definition)
    }
}
