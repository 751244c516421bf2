use chrono::{DateTime, TimeDelta, Utc};

use crate::message::QueuedTask;

/// Contextual information handed to a running task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRunContext {
    pub id: String,
    pub kind: String,
    pub started_at: DateTime<Utc>,
    /// Retries left *after* this attempt fails.
    pub retries_remaining: u16,
    pub retry_delay: TimeDelta,
    pub is_retrying: bool,
}

impl TaskRunContext {
    pub(crate) fn new(task: &QueuedTask, declared_retries: u16, now: DateTime<Utc>) -> Self {
        Self {
            id: task.id.clone(),
            kind: task.data.kind.clone(),
            started_at: now,
            retries_remaining: task.retries,
            retry_delay: task.retry_delay(),
            is_retrying: task.retries < declared_retries,
        }
    }
}
