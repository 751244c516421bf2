use dashmap::mapref::one::Ref;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::any::type_name;
use std::fmt::Debug;
use tracing::trace;

use crate::error::BrokerError;
use crate::message::{QueuedTask, TaskRawData, MESSAGE_VERSION};
use crate::task::{Task, TaskTrigger};

mod recurring;
pub use self::recurring::RecurringTask;

/// Keeps the metadata of every registered task type and rehydrates
/// messages back into task instances.
///
/// Registration happens while the process boots; once the consumer is
/// started the registry is only read.
pub struct TaskRegistry<S> {
    items: DashMap<String, RegistryItem<S>>,
}

impl<S: Clone + Send + Sync + 'static> TaskRegistry<S> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: DashMap::new(),
        }
    }

    /// Registering the same task type twice is a no-op; two different
    /// types claiming the same kind is a wiring bug and panics.
    pub fn register_task<T: DeserializeOwned + Task<State = S>>(&self) {
        // This is to easily print the exact object type causing the
        // problem instead of printing off its type
        let kind = T::kind();
        let rust_name = type_name::<T>();
        if let Some(existing) = self.items.get(kind) {
            assert!(
                existing.rust_name == rust_name,
                "Task {rust_name:?} ({kind}) is already registered by {:?}",
                existing.rust_name,
            );
            return;
        }
        trace!("registered task {rust_name:?} ({kind})");

        let deserializer: DeserializerFn<S> = Box::new(|value| {
            let task: T = serde_json::from_value(value)?;
            Ok(Box::new(task))
        });

        let retry_delay = T::retry_delay().num_seconds();
        let item = RegistryItem {
            deserializer,
            kind,
            rust_name,
            trigger: T::trigger(),
            retries: T::retries(),
            retry_delay: u32::try_from(retry_delay).unwrap_or(0),
        };
        self.items.insert(kind.to_string(), item);
    }

    #[must_use]
    pub fn find_item(&self, kind: &str) -> Option<Ref<'_, String, RegistryItem<S>>> {
        self.items.get(kind)
    }

    #[must_use]
    pub fn is_task_registered<T: Task<State = S>>(&self) -> bool {
        self.items.contains_key(T::kind())
    }

    #[must_use]
    pub fn is_kind_registered(&self, kind: &str) -> bool {
        self.items.contains_key(kind)
    }

    /// Periodic task types, cloned out so callers never hold a map
    /// guard across an await point.
    #[must_use]
    pub fn recurring_tasks(&self) -> Vec<RecurringTask> {
        self.items
            .iter()
            .filter(|item| item.is_recurring())
            .map(|item| RecurringTask::from_item(&item))
            .collect()
    }
}

impl<S: Clone + Send + Sync + 'static> TaskRegistry<S> {
    pub fn encode(&self, task: &QueuedTask) -> Result<Vec<u8>, BrokerError> {
        serde_json::to_vec(task).map_err(BrokerError::Encode)
    }

    /// Decodes a wire message back into a task envelope and verifies
    /// that this process can actually run it.
    pub fn decode(&self, message: &[u8]) -> Result<QueuedTask, BrokerError> {
        let task: QueuedTask = serde_json::from_slice(message).map_err(BrokerError::Decode)?;
        if task.version != MESSAGE_VERSION {
            return Err(BrokerError::UnsupportedVersion {
                version: task.version,
            });
        }

        // Fail early so undecodable payloads are caught at dequeue
        // time, not halfway through execution.
        self.deserialize_task(&task.data)?;
        Ok(task)
    }

    pub(crate) fn deserialize_task(
        &self,
        data: &TaskRawData,
    ) -> Result<Box<dyn Task<State = S>>, BrokerError> {
        let item = self
            .find_item(&data.kind)
            .ok_or_else(|| BrokerError::UnknownTaskType {
                kind: data.kind.clone(),
            })?;

        (item.deserializer)(data.inner.clone()).map_err(BrokerError::Decode)
    }
}

impl<S: Clone + Send + Sync + 'static> Default for TaskRegistry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Debug for TaskRegistry<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("items", &self.items.len())
            .finish()
    }
}

pub struct RegistryItem<S> {
    pub(crate) deserializer: DeserializerFn<S>,
    pub(crate) kind: &'static str,
    pub(crate) rust_name: &'static str,
    pub(crate) trigger: TaskTrigger,
    pub(crate) retries: u16,
    pub(crate) retry_delay: u32,
}

impl<S> RegistryItem<S> {
    #[must_use]
    pub fn is_recurring(&self) -> bool {
        self.trigger.is_recurring()
    }
}

pub type DeserializerFn<S> = Box<
    dyn Fn(serde_json::Value) -> serde_json::Result<Box<dyn Task<State = S>>>
        + Send
        + Sync
        + 'static,
>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{EveryHour, ModifyState, TestState};

    use chrono::TimeZone;
    use chrono::Utc;

    type TestRegistry = TaskRegistry<TestState>;

    fn registry() -> TestRegistry {
        let registry = TestRegistry::new();
        registry.register_task::<ModifyState>();
        registry.register_task::<EveryHour>();
        registry
    }

    #[test]
    fn registering_the_same_task_twice_is_a_no_op() {
        let registry = TestRegistry::new();
        registry.register_task::<EveryHour>();
        registry.register_task::<EveryHour>();
        assert_eq!(registry.recurring_tasks().len(), 1);
    }

    #[test]
    #[should_panic]
    fn should_crash_if_two_types_claim_one_kind() {
        #[derive(Debug, serde::Deserialize, serde::Serialize)]
        struct Impostor;

        #[async_trait::async_trait]
        impl crate::Task for Impostor {
            type State = TestState;

            fn kind() -> &'static str {
                EveryHour::kind()
            }

            async fn perform(
                &self,
                _ctx: &crate::TaskRunContext,
                _state: Self::State,
            ) -> crate::TaskResult {
                Ok(serde_json::Value::Null)
            }
        }

        let registry = TestRegistry::new();
        registry.register_task::<EveryHour>();
        registry.register_task::<Impostor>();
    }

    #[test]
    fn encoded_tasks_round_trip() {
        let registry = registry();
        let eta = Utc.with_ymd_and_hms(2037, 1, 1, 0, 0, 0).unwrap();
        let task = QueuedTask {
            version: MESSAGE_VERSION,
            id: "t-1".into(),
            data: TaskRawData {
                kind: ModifyState::kind().into(),
                inner: serde_json::json!({"key": "k", "value": "v"}),
            },
            execute_time: Some(eta),
            retries: 3,
            retry_delay: 10,
        };

        let message = registry.encode(&task).unwrap();
        let decoded = registry.decode(&message).unwrap();
        assert_eq!(decoded, task);
        assert_eq!(decoded.retries, task.retries);
        assert_eq!(decoded.retry_delay, task.retry_delay);
    }

    #[test]
    fn decode_rejects_unknown_kinds() {
        let registry = registry();
        let task = QueuedTask {
            version: MESSAGE_VERSION,
            id: "t-1".into(),
            data: TaskRawData {
                kind: "never_registered".into(),
                inner: serde_json::Value::Null,
            },
            execute_time: None,
            retries: 0,
            retry_delay: 0,
        };

        let message = registry.encode(&task).unwrap();
        let error = registry.decode(&message).unwrap_err();
        assert!(matches!(error, BrokerError::UnknownTaskType { .. }));
    }

    #[test]
    fn decode_rejects_future_message_versions() {
        let registry = registry();
        let message = serde_json::to_vec(&serde_json::json!({
            "version": MESSAGE_VERSION + 1,
            "id": "t-1",
            "data": {"kind": EveryHour::kind(), "inner": null},
            "execute_time": null,
            "retries": 0,
            "retry_delay": 0,
        }))
        .unwrap();

        let error = registry.decode(&message).unwrap_err();
        assert!(matches!(error, BrokerError::UnsupportedVersion { .. }));
    }

    #[test]
    fn recurring_tasks_are_enumerated() {
        let registry = registry();
        let recurring = registry.recurring_tasks();
        assert_eq!(recurring.len(), 1);
        assert_eq!(recurring[0].kind, EveryHour::kind());
    }
}
