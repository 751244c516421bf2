use chrono::{DateTime, Timelike, Utc};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::queue::TaskQueue;

/// Wakes at every minute boundary and enqueues each periodic task
/// whose trigger covers that minute. Revocation is not checked here;
/// workers drop revoked activations at dequeue time, which is what
/// lets a one-shot revoke consume exactly one activation.
pub(crate) struct PeriodicLoop<S> {
    queue: TaskQueue<S>,
    shutdown: CancellationToken,
}

impl<S: Clone + Send + Sync + 'static> PeriodicLoop<S> {
    pub(crate) fn new(queue: TaskQueue<S>, shutdown: CancellationToken) -> Self {
        Self { queue, shutdown }
    }

    pub(crate) async fn run(self) {
        debug!("periodic task loop started");
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let now = self.queue.now();
            let until_boundary = Duration::from_secs(u64::from(60 - now.second().min(59)));
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = self.queue.clock().sleep(until_boundary) => {}
            }

            let now = self.queue.now();
            self.tick(now).await;
        }
        debug!("periodic task loop stopped");
    }

    /// Evaluates every periodic task against `now`.
    pub(crate) async fn tick(&self, now: DateTime<Utc>) {
        for task in self.queue.registry().recurring_tasks() {
            if !task.trigger.matches(now) {
                continue;
            }

            debug!("enqueueing periodic task {:?} ({})", task.kind, task.rust_name);
            let envelope = task.envelope();
            if let Err(error) = self.queue.write_message(&envelope).await {
                warn!(%error, "could not enqueue periodic task {:?}", task.kind);
            }
        }
    }
}
