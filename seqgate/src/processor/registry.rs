//! Startup-time processor registration.

use super::ProcessorFactory;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("processor factory '{0}' is already registered")]
    DuplicateName(String),
}

/// The set of processor factories, built once at startup and then frozen.
///
/// Freezing consumes the builder and hands out an `Arc`; the dispatcher
/// borrows it read-only for every request, so registration races are
/// impossible by construction.
pub struct Registry {
    factories: Vec<Arc<dyn ProcessorFactory>>,
    names: HashSet<String>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            factories: Vec::new(),
            names: HashSet::new(),
        }
    }

    /// Registers a factory; order of registration is the order factories
    /// are offered requests (and therefore the priority order).
    pub fn register(&mut self, factory: Arc<dyn ProcessorFactory>) -> Result<(), RegistryError> {
        let name = factory.name().to_string();
        if !self.names.insert(name.clone()) {
            return Err(RegistryError::DuplicateName(name));
        }
        self.factories.push(factory);
        Ok(())
    }

    pub fn freeze(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn factories(&self) -> &[Arc<dyn ProcessorFactory>] {
        &self.factories
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
