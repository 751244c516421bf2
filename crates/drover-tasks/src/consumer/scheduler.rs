use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::event::{EventStatus, TaskEvent};
use crate::queue::TaskQueue;
use crate::schedule::Schedule;

/// Releases deferred tasks back into the queue once they come due and
/// snapshots the schedule at every minute boundary so a restarted
/// consumer picks up where this one left off.
pub(crate) struct SchedulerLoop<S> {
    queue: TaskQueue<S>,
    schedule: Arc<Schedule>,
    shutdown: CancellationToken,
    interval: Duration,
}

impl<S: Clone + Send + Sync + 'static> SchedulerLoop<S> {
    pub(crate) fn new(
        queue: TaskQueue<S>,
        schedule: Arc<Schedule>,
        shutdown: CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            schedule,
            shutdown,
            interval,
        }
    }

    pub(crate) async fn run(self) {
        debug!("scheduler started");
        let mut last_minute = self.queue.now().minute();

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let now = self.queue.now();
            self.tick(now).await;

            if now.minute() != last_minute {
                last_minute = now.minute();
                if let Err(error) = self.schedule.save().await {
                    warn!(%error, "could not save schedule snapshot");
                }
            }

            tokio::select! {
                () = self.shutdown.cancelled() => {}
                () = self.queue.clock().sleep(self.interval) => {}
            }
        }
        debug!("scheduler stopped");
    }

    /// One scheduler pass: every task due at `now` leaves the
    /// schedule, and the ones that are not revoked re-enter the queue.
    pub(crate) async fn tick(&self, now: DateTime<Utc>) {
        for task in self.schedule.take_due(now).await {
            match self.queue.is_revoked(&task, now, false).await {
                Ok(true) => {
                    debug!("dropping revoked scheduled task {}", task.id);
                    continue;
                }
                Ok(false) => {}
                Err(error) => {
                    warn!(%error, "could not check revocation for task {}", task.id);
                }
            }

            match self.queue.write_message(&task).await {
                Ok(()) => {
                    debug!("enqueued scheduled task {}", task.id);
                    self.queue
                        .emit(TaskEvent::new(EventStatus::Enqueued, &task, now))
                        .await;
                }
                Err(error) => {
                    // Keep the task for the next pass instead of
                    // losing it to a transient queue failure.
                    warn!(%error, "could not enqueue scheduled task {}", task.id);
                    self.schedule.add(task).await;
                }
            }
        }
    }
}
