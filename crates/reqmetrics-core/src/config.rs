//! Configuration sources consulted while deriving labels.
//!
//! Values are looked up on every event, never cached, so an override made
//! at runtime is visible to the next request.

use std::collections::HashMap;
use std::sync::RwLock;

/// Key/value lookup for environment-style settings.
pub trait ConfigSource: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
}

/// Reads the process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvConfig;

impl ConfigSource for EnvConfig {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// In-memory source with runtime overrides. Used for embedding and tests
/// where mutating the real process environment would race.
#[derive(Debug, Default)]
pub struct MapConfig {
    values: RwLock<HashMap<String, String>>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: &str) {
        let mut values = self.values.write().unwrap_or_else(|p| p.into_inner());
        values.insert(key.to_string(), value.to_string());
    }

    pub fn remove(&self, key: &str) {
        let mut values = self.values.write().unwrap_or_else(|p| p.into_inner());
        values.remove(key);
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.read().unwrap_or_else(|p| p.into_inner());
        values.get(key).cloned()
    }
}
