//! Connector specializations
//!
//! A handler can have per-connector variants: the same story rendered
//! differently for a voice assistant, or for one specific configured
//! connector. Specializations are registered explicitly, per handler type
//! and [`ConnectorKey`], with a factory taking the handler instance.
//!
//! Registrations of an ancestor type apply to its descendants once the
//! relation is declared with [`ConnectorResolver::inherit`]. The ancestor
//! walk happens once per `(type, key)`; its outcome is cached in a concurrent
//! map, so turns resolve without locking. Two turns racing on the first
//! lookup compute the same entry twice and one insert wins. A walk that
//! overlaps a registration is not cached.

use crate::bus::{Bus, ConnectorType};
use dashmap::DashMap;
use std::any::{type_name, Any, TypeId};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What a specialization is registered for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConnectorKey {
    /// A connector family, such as `messenger` or `alexa`
    Type(String),
    /// One configured connector instance
    Id(String),
}

impl ConnectorKey {
    pub fn of_type(connector_type: &ConnectorType) -> Self {
        Self::Type(connector_type.id.clone())
    }

    pub fn id(connector_id: impl Into<String>) -> Self {
        Self::Id(connector_id.into())
    }
}

impl fmt::Display for ConnectorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(id) => write!(f, "type:{id}"),
            Self::Id(id) => write!(f, "id:{id}"),
        }
    }
}

type Factory = Arc<dyn Fn(&dyn Any) -> Option<Box<dyn Any>> + Send + Sync>;
type Projection = Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;

#[derive(Clone)]
struct ParentLink {
    parent: TypeId,
    project: Projection,
}

/// Outcome of an ancestor walk: projections to apply, then the factory
#[derive(Clone)]
struct Resolution {
    path: Vec<Projection>,
    factory: Factory,
}

type CacheKey = (TypeId, ConnectorKey);

/// Registration table of connector specializations
#[derive(Default)]
pub struct ConnectorResolver {
    registrations: DashMap<CacheKey, Factory>,
    parents: DashMap<TypeId, Vec<ParentLink>>,
    cache: DashMap<CacheKey, Option<Resolution>>,
    /// Bumped by every registration, before the cache is cleared
    generation: AtomicU64,
}

impl ConnectorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the specialization `S` of handler `H` for a connector.
    pub fn register<H, S, F>(&self, key: ConnectorKey, factory: F)
    where
        H: Any,
        S: Any,
        F: Fn(&H) -> S + Send + Sync + 'static,
    {
        tracing::debug!(handler = type_name::<H>(), specialization = type_name::<S>(), %key, "registering connector specialization");
        let factory: Factory = Arc::new(move |handler: &dyn Any| {
            handler
                .downcast_ref::<H>()
                .map(|h| Box::new(factory(h)) as Box<dyn Any>)
        });
        self.registrations.insert((TypeId::of::<H>(), key), factory);
        self.invalidate();
    }

    /// Declares `Parent` as an ancestor of `Child`: specializations registered
    /// for `Parent` apply to `Child` through `project`.
    pub fn inherit<Child, Parent, F>(&self, project: F)
    where
        Child: Any,
        Parent: Any,
        F: Fn(&Child) -> &Parent + Send + Sync + 'static,
    {
        let project: Projection = Arc::new(move |handler: &dyn Any| {
            handler
                .downcast_ref::<Child>()
                .map(|child| project(child) as &dyn Any)
        });
        self.parents
            .entry(TypeId::of::<Child>())
            .or_default()
            .push(ParentLink {
                parent: TypeId::of::<Parent>(),
                project,
            });
        self.invalidate();
    }

    fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
    }

    /// Builds the specialization `S` registered for the handler and key, if any.
    pub fn resolve<H, S>(&self, handler: &H, key: &ConnectorKey) -> Option<S>
    where
        H: Any,
        S: Any,
    {
        let cache_key = (TypeId::of::<H>(), key.clone());
        // The read guard must be released before inserting into the same shard
        let cached = self.cache.get(&cache_key).map(|entry| entry.value().clone());
        let resolution = match cached {
            Some(resolution) => resolution,
            None => {
                let generation = self.generation.load(Ordering::SeqCst);
                let computed = self.walk(TypeId::of::<H>(), key);
                self.remember(cache_key, computed, generation)
            }
        };
        let Some(resolution) = resolution else {
            tracing::debug!(handler = type_name::<H>(), %key, "no connector specialization");
            return None;
        };

        let mut current: &dyn Any = handler;
        for project in &resolution.path {
            current = project(current)?;
        }
        match (resolution.factory)(current)?.downcast::<S>() {
            Ok(specialization) => Some(*specialization),
            Err(_) => {
                tracing::warn!(
                    handler = type_name::<H>(),
                    expected = type_name::<S>(),
                    %key,
                    "connector specialization has another type"
                );
                None
            }
        }
    }

    /// Resolution for a handler definition: connector id first, then connector type.
    pub fn resolve_for_definition<H, S>(&self, handler: &H, bus: &dyn Bus) -> Option<S>
    where
        H: Any,
        S: Any,
    {
        let found = self
            .resolve(handler, &ConnectorKey::id(bus.connector_id()))
            .or_else(|| self.resolve(handler, &ConnectorKey::of_type(bus.target_connector_type())));
        if found.is_none() {
            Self::warn_missing::<H>(bus);
        }
        found
    }

    /// Resolution for a story handler: connector type first, then connector id.
    pub fn resolve_for_story<H, S>(&self, handler: &H, bus: &dyn Bus) -> Option<S>
    where
        H: Any,
        S: Any,
    {
        let found = self
            .resolve(handler, &ConnectorKey::of_type(bus.target_connector_type()))
            .or_else(|| self.resolve(handler, &ConnectorKey::id(bus.connector_id())));
        if found.is_none() {
            Self::warn_missing::<H>(bus);
        }
        found
    }

    fn warn_missing<H>(bus: &dyn Bus) {
        tracing::warn!(
            handler = type_name::<H>(),
            connector_id = bus.connector_id(),
            connector_type = %bus.target_connector_type(),
            "no connector specialization, using default behavior"
        );
    }

    /// Caches a walk result computed at `generation`. The entry is dropped
    /// again when a registration happened meanwhile, whichever finished first.
    fn remember(&self, cache_key: CacheKey, computed: Option<Resolution>, generation: u64) -> Option<Resolution> {
        let resolution = self.cache.entry(cache_key.clone()).or_insert(computed).value().clone();
        if self.generation.load(Ordering::SeqCst) != generation {
            self.cache.remove(&cache_key);
        }
        resolution
    }

    /// Breadth-first walk over the declared ancestors, nearest first.
    fn walk(&self, start: TypeId, key: &ConnectorKey) -> Option<Resolution> {
        let mut queue = vec![(start, Vec::new())];
        let mut visited = HashSet::new();
        while !queue.is_empty() {
            let mut next = Vec::new();
            for (type_id, path) in queue {
                if !visited.insert(type_id) {
                    continue;
                }
                if let Some(factory) = self.registrations.get(&(type_id, key.clone())) {
                    return Some(Resolution {
                        path,
                        factory: Arc::clone(factory.value()),
                    });
                }
                if let Some(links) = self.parents.get(&type_id) {
                    for link in links.value() {
                        let mut extended: Vec<Projection> = path.clone();
                        extended.push(Arc::clone(&link.project));
                        next.push((link.parent, extended));
                    }
                }
            }
            queue = next;
        }
        None
    }
}

impl fmt::Debug for ConnectorResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorResolver")
            .field("registrations", &self.registrations.len())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}
