//! Event-source lookup.
//!
//! An [`EventSourceRegistry`] maps event type names to factories. Each
//! factory receives the owning service and the command's argument list and
//! returns a fresh [`EventStream`]. The dispatcher only sees the object-safe
//! [`EventSourceLookup`] trait.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::{OpenError, SourceError};
use crate::push::EventStream;

type Factory<S> = Arc<dyn Fn(&S, &[String]) -> Result<EventStream, SourceError> + Send + Sync>;

/// Resolves event type names to push sources.
pub trait EventSourceLookup: Send + Sync {
    /// Open a new source for `event_type` with `args`.
    fn open(&self, event_type: &str, args: &[String]) -> Result<EventStream, OpenError>;

    /// Registered type names, sorted.
    fn event_types(&self) -> Vec<String>;
}

/// Constructor-supplied map from type name to factory over a service `S`.
pub struct EventSourceRegistry<S> {
    service: Arc<S>,
    factories: HashMap<String, Factory<S>>,
}

impl<S: Send + Sync + 'static> EventSourceRegistry<S> {
    /// Create an empty registry bound to `service`.
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            factories: HashMap::new(),
        }
    }

    /// Register a factory. Replaces any factory with the same name.
    pub fn register<F>(&mut self, event_type: impl Into<String>, factory: F)
    where
        F: Fn(&S, &[String]) -> Result<EventStream, SourceError> + Send + Sync + 'static,
    {
        let _ = self.factories.insert(event_type.into(), Arc::new(factory));
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with<F>(mut self, event_type: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&S, &[String]) -> Result<EventStream, SourceError> + Send + Sync + 'static,
    {
        self.register(event_type, factory);
        self
    }

    /// Whether `event_type` is registered.
    pub fn contains(&self, event_type: &str) -> bool {
        self.factories.contains_key(event_type)
    }

    /// Number of registered factories.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Whether no factory is registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<S: Send + Sync + 'static> EventSourceLookup for EventSourceRegistry<S> {
    fn open(&self, event_type: &str, args: &[String]) -> Result<EventStream, OpenError> {
        let factory = self
            .factories
            .get(event_type)
            .ok_or_else(|| OpenError::UnknownEventType(event_type.to_owned()))?;
        Ok(factory(&self.service, args)?)
    }

    fn event_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl<S> fmt::Debug for EventSourceRegistry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("EventSourceRegistry")
            .field("event_types", &names)
            .finish_non_exhaustive()
    }
}
