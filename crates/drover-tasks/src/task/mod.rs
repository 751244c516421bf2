mod run_context;
mod trigger;

pub use self::run_context::TaskRunContext;
pub use self::trigger::{InvalidCronExpr, TaskTrigger};

use async_trait::async_trait;
use chrono::TimeDelta;
use std::fmt::Debug;

use crate::error::TaskError;

/// What a task execution produced: the value to persist in the result
/// store on success, or an opaque failure the retry policy acts on.
pub type TaskResult = Result<serde_json::Value, TaskError>;

#[async_trait]
pub trait Task: Debug + Send + Sync + 'static {
    type State: Clone + Send + Sync + 'static;

    /// A **unique** type of the task. It keys the registry and travels
    /// with every message, so changing it orphans queued invocations
    /// and any persisted schedule snapshot.
    fn kind() -> &'static str
    where
        Self: Sized;

    /// The condition that activates the task periodically.
    ///
    /// Anything other than [`TaskTrigger::None`] marks this as a
    /// periodic task: the periodic loop evaluates the trigger once per
    /// minute and enqueues the task on a match, and its `task_id` is
    /// pinned to [`Task::kind`] so revocations apply to every
    /// activation.
    fn trigger() -> TaskTrigger
    where
        Self: Sized,
    {
        TaskTrigger::None
    }

    /// How many times a failing invocation is re-run before giving up.
    fn retries() -> u16
    where
        Self: Sized,
    {
        0
    }

    /// The delay before a failed invocation is tried again. With a
    /// zero delay retries re-enter the queue immediately; otherwise
    /// they wait in the schedule.
    fn retry_delay() -> TimeDelta
    where
        Self: Sized,
    {
        TimeDelta::zero()
    }

    /// Runs the task. Return [`serde_json::Value::Null`] when there is
    /// no meaningful result; null results are only persisted when the
    /// queue is configured to store them.
    async fn perform(&self, ctx: &TaskRunContext, state: Self::State) -> TaskResult;
}

#[cfg(test)]
mod tests {
    use super::Task;

    use static_assertions::assert_obj_safe;
    use std::sync::Arc;

    assert_obj_safe!(Task<State = Arc<()>>);
}
