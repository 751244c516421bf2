use chrono::TimeDelta;
use std::sync::Mutex;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::error::{BrokerError, WaitError};
use crate::message::QueuedTask;
use crate::queue::TaskQueue;

/// Lazy handle over a task's future result.
///
/// The first value read from the result store is cached locally, so a
/// handle keeps answering after the (destructive) store read.
pub struct AsyncResult<S> {
    queue: TaskQueue<S>,
    task: QueuedTask,
    cached: Mutex<Option<serde_json::Value>>,
}

/// Polling knobs for [`AsyncResult::wait`]. Polling starts at 100 ms
/// and grows by `backoff` per miss up to `max_delay`.
#[derive(Debug, Clone, TypedBuilder)]
pub struct WaitOptions {
    #[builder(default)]
    pub timeout: Option<TimeDelta>,

    #[builder(default = 1.15)]
    pub backoff: f32,

    #[builder(default = Duration::from_secs(1))]
    pub max_delay: Duration,

    /// Issue a revoke before timing out, so a task nobody is waiting
    /// for anymore does not run.
    #[builder(default)]
    pub revoke_on_timeout: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl<S: Clone + Send + Sync + 'static> AsyncResult<S> {
    pub(crate) fn new(queue: TaskQueue<S>, task: QueuedTask) -> Self {
        Self {
            queue,
            task,
            cached: Mutex::new(None),
        }
    }

    pub(crate) fn with_value(
        queue: TaskQueue<S>,
        task: QueuedTask,
        value: serde_json::Value,
    ) -> Self {
        Self {
            queue,
            task,
            cached: Mutex::new(Some(value)),
        }
    }

    #[must_use]
    pub fn task(&self) -> &QueuedTask {
        &self.task
    }

    /// One result store lookup. `Ok(None)` means the result is not
    /// ready yet.
    pub async fn get(&self) -> Result<Option<serde_json::Value>, BrokerError> {
        {
            let cached = self.cached.lock().expect("result cache poisoned");
            if cached.is_some() {
                return Ok(cached.clone());
            }
        }

        let Some(value) = self.queue.get_result(&self.task.id, false).await? else {
            return Ok(None);
        };

        *self.cached.lock().expect("result cache poisoned") = Some(value.clone());
        Ok(Some(value))
    }

    /// Polls until the result arrives or `options.timeout` elapses.
    pub async fn wait(&self, options: WaitOptions) -> Result<serde_json::Value, WaitError> {
        let clock = self.queue.clock().clone();
        let started = clock.now();
        let mut delay = Duration::from_millis(100);

        loop {
            if let Some(value) = self.get().await? {
                return Ok(value);
            }

            if let Some(timeout) = options.timeout {
                if clock.now() - started >= timeout {
                    if options.revoke_on_timeout {
                        self.revoke().await?;
                    }
                    return Err(WaitError::Timeout);
                }
            }

            clock.sleep(delay).await;
            delay = delay.mul_f32(options.backoff.max(1.0)).min(options.max_delay);
        }
    }

    pub async fn revoke(&self) -> Result<(), BrokerError> {
        self.queue.revoke(&self.task, None, false).await
    }

    pub async fn restore(&self) -> Result<(), BrokerError> {
        self.queue.restore(&self.task).await
    }

    pub async fn is_revoked(&self) -> Result<bool, BrokerError> {
        let now = self.queue.now();
        self.queue.is_revoked(&self.task, now, true).await
    }
}

impl<S> std::fmt::Debug for AsyncResult<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncResult")
            .field("task", &self.task.id)
            .finish()
    }
}
