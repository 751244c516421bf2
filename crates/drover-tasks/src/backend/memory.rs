//! In-process backends backed by plain collections.
//!
//! These are the reference implementations used by the test suite and
//! the demo runner. They are fully functional inside one process but
//! provide no durability.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

use super::{BackendError, DataStore, EventEmitter, Queue};

#[derive(Debug, Default)]
pub struct MemoryQueue {
    messages: Mutex<VecDeque<Vec<u8>>>,
}

impl MemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    async fn write(&self, message: Vec<u8>) -> Result<(), BackendError> {
        self.messages.lock().await.push_back(message);
        Ok(())
    }

    async fn read(&self) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.messages.lock().await.pop_front())
    }

    async fn remove(&self, message: &[u8]) -> Result<(), BackendError> {
        self.messages.lock().await.retain(|m| m != message);
        Ok(())
    }

    async fn flush(&self) -> Result<(), BackendError> {
        self.messages.lock().await.clear();
        Ok(())
    }

    async fn size(&self) -> Result<usize, BackendError> {
        Ok(self.messages.lock().await.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDataStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDataStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.values.lock().await.len()
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        self.values.lock().await.contains_key(key)
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), BackendError> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.values.lock().await.remove(key))
    }

    async fn peek(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn flush(&self) -> Result<(), BackendError> {
        self.values.lock().await.clear();
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryEventEmitter {
    events: Mutex<Vec<Vec<u8>>>,
}

impl MemoryEventEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event emitted so far, oldest first.
    pub async fn events(&self) -> Vec<Vec<u8>> {
        self.events.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventEmitter for MemoryEventEmitter {
    async fn emit(&self, event: Vec<u8>) -> Result<(), BackendError> {
        self.events.lock().await.push(event);
        Ok(())
    }
}
