use crate::message::{QueuedTask, TaskRawData, MESSAGE_VERSION};
use crate::task::TaskTrigger;

use super::RegistryItem;

/// Snapshot of a periodic task type the periodic loop drives.
///
/// Periodic tasks carry no payload: the registry rebuilds them from a
/// null payload, so their types must deserialize from nothing (unit
/// structs or all-default fields).
#[derive(Debug, Clone)]
pub struct RecurringTask {
    pub kind: &'static str,
    pub rust_name: &'static str,
    pub trigger: TaskTrigger,
    retries: u16,
    retry_delay: u32,
}

impl RecurringTask {
    pub(crate) fn from_item<S>(item: &RegistryItem<S>) -> Self {
        Self {
            kind: item.kind,
            rust_name: item.rust_name,
            trigger: item.trigger.clone(),
            retries: item.retries,
            retry_delay: item.retry_delay,
        }
    }

    /// Builds an activation envelope. The task id equals the kind so
    /// that every activation shares one result and revoke namespace.
    #[must_use]
    pub fn envelope(&self) -> QueuedTask {
        QueuedTask {
            version: MESSAGE_VERSION,
            id: self.kind.to_string(),
            data: TaskRawData {
                kind: self.kind.to_string(),
                inner: serde_json::Value::Null,
            },
            execute_time: None,
            retries: self.retries,
            retry_delay: self.retry_delay,
        }
    }
}
