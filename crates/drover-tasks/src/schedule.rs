use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::backend::DataStore;
use crate::error::BrokerError;
use crate::message::QueuedTask;
use crate::registry::TaskRegistry;

/// The set of future-dated tasks held by the consumer process.
///
/// Workers add to it when they dequeue a task that is not due yet (or
/// defer a delayed retry); the scheduler loop drains the due entries
/// back into the queue. The whole set is mirrored into the schedule
/// store under one key so it survives a consumer restart.
pub struct Schedule {
    key: String,
    store: Option<Arc<dyn DataStore>>,
    tasks: Mutex<HashMap<String, QueuedTask>>,
}

impl Schedule {
    #[must_use]
    pub fn new(key: impl Into<String>, store: Option<Arc<dyn DataStore>>) -> Self {
        Self {
            key: key.into(),
            store,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// True when `task` has no pending `execute_time` left, as of `now`.
    #[must_use]
    pub fn should_run(task: &QueuedTask, now: DateTime<Utc>) -> bool {
        task.execute_time.map_or(true, |eta| eta <= now)
    }

    /// Inserts a pending task. A task that is already pending under
    /// the same id is left untouched.
    pub async fn add(&self, task: QueuedTask) {
        let mut tasks = self.tasks.lock().await;
        tasks.entry(task.id.clone()).or_insert(task);
    }

    pub async fn remove(&self, id: &str) -> Option<QueuedTask> {
        self.tasks.lock().await.remove(id)
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.tasks.lock().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    pub async fn tasks(&self) -> Vec<QueuedTask> {
        self.tasks.lock().await.values().cloned().collect()
    }

    /// Removes and returns every pending task that is due at `now`.
    pub async fn take_due(&self, now: DateTime<Utc>) -> Vec<QueuedTask> {
        let mut tasks = self.tasks.lock().await;
        let due: Vec<String> = tasks
            .values()
            .filter(|task| Self::should_run(task, now))
            .map(|task| task.id.clone())
            .collect();

        due.iter().filter_map(|id| tasks.remove(id)).collect()
    }

    /// Restores the pending set from the schedule store. Entries whose
    /// task type is no longer registered are dropped with a notice so
    /// one stale snapshot cannot wedge the consumer.
    pub async fn load<S>(&self, registry: &TaskRegistry<S>) -> Result<(), BrokerError>
    where
        S: Clone + Send + Sync + 'static,
    {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let Some(bytes) = store.get(&self.key).await.map_err(BrokerError::StoreGet)? else {
            return Ok(());
        };

        let snapshot: Vec<QueuedTask> =
            serde_json::from_slice(&bytes).map_err(BrokerError::Decode)?;

        let mut tasks = self.tasks.lock().await;
        for task in snapshot {
            if !registry.is_kind_registered(&task.data.kind) {
                warn!(
                    "skipping scheduled task {} with unregistered type {:?}",
                    task.id, task.data.kind
                );
                continue;
            }
            tasks.entry(task.id.clone()).or_insert(task);
        }

        debug!("loaded {} scheduled task(s)", tasks.len());
        Ok(())
    }

    /// Writes the current pending set to the schedule store.
    pub async fn save(&self) -> Result<(), BrokerError> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let snapshot = self.tasks().await;
        let bytes = serde_json::to_vec(&snapshot).map_err(BrokerError::Encode)?;
        store
            .put(&self.key, bytes)
            .await
            .map_err(BrokerError::StorePut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryDataStore;
    use crate::message::{TaskRawData, MESSAGE_VERSION};
    use crate::test_utils::{ModifyState, TestState};
    use crate::Task;

    use chrono::TimeZone;

    fn pending(id: &str, eta: Option<DateTime<Utc>>) -> QueuedTask {
        QueuedTask {
            version: MESSAGE_VERSION,
            id: id.to_string(),
            data: TaskRawData {
                kind: ModifyState::kind().into(),
                inner: serde_json::json!({"key": "k", "value": "v"}),
            },
            execute_time: eta,
            retries: 0,
            retry_delay: 0,
        }
    }

    #[test]
    fn should_run_without_an_eta() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        assert!(Schedule::should_run(&pending("t", None), now));
        assert!(Schedule::should_run(&pending("t", Some(now)), now));
        assert!(!Schedule::should_run(
            &pending("t", Some(now + chrono::TimeDelta::seconds(1))),
            now
        ));
    }

    #[tokio::test]
    async fn take_due_leaves_future_tasks_pending() {
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2037, 1, 1, 0, 0, 0).unwrap();

        let schedule = Schedule::new("schedule", None);
        schedule.add(pending("due", Some(now))).await;
        schedule.add(pending("later", Some(later))).await;

        let due = schedule.take_due(now).await;
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "due");
        assert!(schedule.contains("later").await);
        assert!(!schedule.contains("due").await);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_the_store() {
        let store: Arc<MemoryDataStore> = Arc::new(MemoryDataStore::new());
        let registry = TaskRegistry::<TestState>::new();
        registry.register_task::<ModifyState>();

        let later = Utc.with_ymd_and_hms(2037, 1, 1, 0, 0, 0).unwrap();
        let schedule = Schedule::new("schedule", Some(store.clone() as Arc<dyn DataStore>));
        schedule.add(pending("t-1", Some(later))).await;
        schedule.save().await.unwrap();

        let restored = Schedule::new("schedule", Some(store as Arc<dyn DataStore>));
        restored.load(&registry).await.unwrap();
        assert!(restored.contains("t-1").await);
        assert_eq!(restored.len().await, 1);
    }

    #[tokio::test]
    async fn load_skips_unregistered_kinds() {
        let store: Arc<MemoryDataStore> = Arc::new(MemoryDataStore::new());
        let registry = TaskRegistry::<TestState>::new();
        registry.register_task::<ModifyState>();

        let mut orphan = pending("t-orphan", None);
        orphan.data.kind = "gone".into();
        let snapshot = vec![orphan, pending("t-1", None)];
        store
            .put("schedule", serde_json::to_vec(&snapshot).unwrap())
            .await
            .unwrap();

        let schedule = Schedule::new("schedule", Some(store as Arc<dyn DataStore>));
        schedule.load(&registry).await.unwrap();
        assert!(schedule.contains("t-1").await);
        assert!(!schedule.contains("t-orphan").await);
    }
}
