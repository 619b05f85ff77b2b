use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::schedule::processors::TaskProcessor;
use crate::schedule::types::TaskAction;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("no processor registered for action: {0}")]
    NotFound(String),
}

/// Action → capability table, built once at startup and read-only afterwards.
#[derive(Clone, Default)]
pub struct ProcessorRegistry {
    processors: BTreeMap<TaskAction, Arc<dyn TaskProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `processor` to `action`, replacing any earlier binding.
    pub fn register(&mut self, action: TaskAction, processor: Arc<dyn TaskProcessor>) {
        info!(%action, "Registering processor");
        self.processors.insert(action, processor);
    }

    /// Bind a processor under the action it declares itself.
    pub fn register_processor(&mut self, processor: Arc<dyn TaskProcessor>) {
        let action = processor.action();
        self.register(action, processor);
    }

    pub fn with(mut self, action: TaskAction, processor: Arc<dyn TaskProcessor>) -> Self {
        self.register(action, processor);
        self
    }

    /// Resolve the raw action string carried by a task.
    pub fn resolve(&self, action: &str) -> Result<Arc<dyn TaskProcessor>, RegistryError> {
        action
            .parse::<TaskAction>()
            .ok()
            .and_then(|action| self.processors.get(&action).cloned())
            .ok_or_else(|| RegistryError::NotFound(action.to_string()))
    }

    pub fn contains(&self, action: TaskAction) -> bool {
        self.processors.contains_key(&action)
    }

    pub fn actions(&self) -> Vec<TaskAction> {
        self.processors.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}
