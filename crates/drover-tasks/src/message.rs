use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Version byte stamped into every encoded message so the wire format
/// can be migrated without breaking consumers mid-upgrade.
pub const MESSAGE_VERSION: u8 = 1;

fn default_version() -> u8 {
    MESSAGE_VERSION
}

/// Serialized task payload: the registered kind plus whatever the task
/// type serializes to. `inner` stays opaque to the runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRawData {
    pub kind: String,
    pub inner: serde_json::Value,
}

/// A task invocation as it travels through the queue, the schedule
/// snapshot and the consumer process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedTask {
    #[serde(default = "default_version")]
    pub version: u8,
    /// UUID v4 for regular tasks; equal to `data.kind` for periodic
    /// tasks, which makes their result and revoke records singletons.
    pub id: String,
    pub data: TaskRawData,
    /// When set, the task must not execute before this instant.
    pub execute_time: Option<DateTime<Utc>>,
    pub retries: u16,
    /// Seconds to defer a retry after a failure.
    pub retry_delay: u32,
}

impl QueuedTask {
    /// Key of the out-of-band revocation record in the result store.
    #[must_use]
    pub fn revoke_id(&self) -> String {
        format!("r:{}", self.id)
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.data.kind
    }

    #[must_use]
    pub fn retry_delay(&self) -> TimeDelta {
        TimeDelta::seconds(i64::from(self.retry_delay))
    }
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.data.kind == other.data.kind
            && self.id == other.id
            && self.execute_time == other.execute_time
    }
}
