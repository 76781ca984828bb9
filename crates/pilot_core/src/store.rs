//! Durable key/value storage shared between the background orchestrator and
//! page sessions.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

pub const CURRENT_TASK_KEY: &str = "current_task";
pub const PREFERENCES_KEY: &str = "preferences";
const PAYLOAD_KEY_PREFIX: &str = "publish_payload_";

pub fn payload_key(platform: &str) -> String {
    format!("{PAYLOAD_KEY_PREFIX}{platform}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error on key {key}: {message}")]
    Io { key: String, message: String },
    #[error("stored value for {key} is not valid JSON: {message}")]
    Corrupt { key: String, message: String },
}

/// JSON values by key. Writes replace the whole record.
pub trait Storage: Send {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;
    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError>;
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;
    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryStore {
    entries: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.keys().cloned().collect())
    }
}

/// Keys holding publish payloads, paired with the platform they belong to.
pub fn payload_keys(store: &dyn Storage) -> Result<Vec<(String, String)>, StoreError> {
    Ok(store
        .keys()?
        .into_iter()
        .filter_map(|key| {
            key.strip_prefix(PAYLOAD_KEY_PREFIX)
                .map(|platform| (key.clone(), platform.to_string()))
        })
        .collect())
}
