//! Type-erased service registry shared across modules.

use crate::error::ModuleError;
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

/// Services published by modules for other modules to consume.
///
/// Keys are chosen by the publishing module ("gateway", "rate-limiter",
/// ...). Lookups fail loudly: asking for an unknown key or the wrong type
/// is a wiring mistake, not a runtime condition to recover from.
#[derive(Default)]
pub struct Registry {
    services: DashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish<T: Any + Send + Sync>(&self, key: impl Into<String>, service: Arc<T>) {
        self.services.insert(key.into(), service);
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Result<Arc<T>, ModuleError> {
        let entry = self
            .services
            .get(key)
            .ok_or_else(|| ModuleError::ServiceNotFound(key.to_string()))?;
        entry
            .value()
            .clone()
            .downcast::<T>()
            .map_err(|_| ModuleError::ServiceType(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.services.contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.services.iter().map(|entry| entry.key().clone()).collect()
    }
}
