use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::QueuedTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Enqueued,
    Scheduled,
    Started,
    Finished,
    Error,
    Retrying,
    Revoked,
}

/// Lifecycle notification pushed to the event emitter backend as it is
/// observed by a worker or the scheduler. Emitters receive copies; the
/// runtime never reads events back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub status: EventStatus,
    pub id: String,
    pub task: String,
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<bool>,
    pub retries: u16,
    pub retry_delay: u32,
    /// Seconds since the Unix epoch, present for deferred tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_time: Option<i64>,
}

impl TaskEvent {
    #[must_use]
    pub fn new(status: EventStatus, task: &QueuedTask, ts: DateTime<Utc>) -> Self {
        Self {
            status,
            id: task.id.clone(),
            task: task.data.kind.clone(),
            ts,
            error: None,
            retries: task.retries,
            retry_delay: task.retry_delay,
            execute_time: task.execute_time.map(|t| t.timestamp()),
        }
    }

    #[must_use]
    pub fn with_error(mut self) -> Self {
        self.error = Some(true);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::message::{TaskRawData, MESSAGE_VERSION};
    use chrono::TimeZone;

    #[test]
    fn serializes_with_mandatory_keys_and_lowercase_status() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let task = QueuedTask {
            version: MESSAGE_VERSION,
            id: "t-1".into(),
            data: TaskRawData {
                kind: "demo".into(),
                inner: serde_json::Value::Null,
            },
            execute_time: Some(ts),
            retries: 2,
            retry_delay: 10,
        };

        let event = TaskEvent::new(EventStatus::Error, &task, ts).with_error();
        let value: serde_json::Value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["status"], "error");
        assert_eq!(value["id"], "t-1");
        assert_eq!(value["task"], "demo");
        assert_eq!(value["error"], true);
        assert_eq!(value["retries"], 2);
        assert_eq!(value["execute_time"], ts.timestamp());
        assert!(value.get("ts").is_some());
    }

    #[test]
    fn error_flag_is_omitted_unless_set() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let task = QueuedTask {
            version: MESSAGE_VERSION,
            id: "t-1".into(),
            data: TaskRawData {
                kind: "demo".into(),
                inner: serde_json::Value::Null,
            },
            execute_time: None,
            retries: 0,
            retry_delay: 0,
        };

        let value = serde_json::to_value(TaskEvent::new(EventStatus::Finished, &task, ts)).unwrap();
        assert!(value.get("error").is_none());
        assert!(value.get("execute_time").is_none());
    }
}
