use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::event::{EventStatus, TaskEvent};
use crate::message::QueuedTask;
use crate::queue::TaskQueue;
use crate::schedule::Schedule;

/// One worker loop. It pulls a message, decides what the task needs
/// (drop as revoked, defer, or execute) and applies the retry policy
/// when execution fails. Everything it observes is emitted as events.
pub(crate) struct Worker<S> {
    id: usize,
    queue: TaskQueue<S>,
    schedule: Arc<Schedule>,
    shutdown: CancellationToken,
    backoff: Backoff,
}

impl<S: Clone + Send + Sync + 'static> Worker<S> {
    pub(crate) fn new(
        id: usize,
        queue: TaskQueue<S>,
        schedule: Arc<Schedule>,
        shutdown: CancellationToken,
    ) -> Self {
        let settings = queue.settings();
        let backoff = Backoff::new(
            settings.default_delay(),
            settings.backoff(),
            settings.max_delay(),
        );

        Self {
            id,
            queue,
            schedule,
            shutdown,
            backoff,
        }
    }

    pub(crate) async fn run(mut self) {
        debug!("worker {} started", self.id);
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.check_message().await;
        }
        debug!("worker {} stopped", self.id);
    }

    /// One iteration of the loop: pull a single message and dispatch
    /// it, or back off when the queue has nothing for us.
    pub(crate) async fn check_message(&mut self) {
        match self.queue.dequeue().await {
            Ok(Some(task)) => {
                self.backoff.reset();
                let now = self.queue.now();
                self.handle_task(task, now).await;
            }
            Ok(None) => self.sleep().await,
            Err(error) if error.is_decode_error() => {
                error!(%error, "discarding undecodable message");
            }
            Err(error) => {
                error!(%error, "could not read from the queue");
                self.sleep().await;
            }
        }
    }

    async fn sleep(&mut self) {
        let delay = self.backoff.next();
        tokio::select! {
            () = self.shutdown.cancelled() => {}
            () = self.queue.clock().sleep(delay) => {}
        }
    }

    pub(crate) async fn handle_task(&self, task: QueuedTask, now: DateTime<Utc>) {
        self.queue
            .emit(TaskEvent::new(EventStatus::Started, &task, now))
            .await;

        match self.queue.is_revoked(&task, now, false).await {
            Ok(true) => {
                debug!("task {} is revoked, dropping it", task.id);
                self.queue
                    .emit(TaskEvent::new(EventStatus::Revoked, &task, now))
                    .await;
                return;
            }
            Ok(false) => {}
            Err(error) => {
                // Revocation is advisory; a store hiccup must not
                // block execution.
                warn!(%error, "could not check revocation for task {}", task.id);
            }
        }

        if !Schedule::should_run(&task, now) {
            debug!(
                "task {} is not due until {:?}, deferring it",
                task.id, task.execute_time
            );
            self.schedule.add(task.clone()).await;
            self.queue
                .emit(TaskEvent::new(EventStatus::Scheduled, &task, now))
                .await;
            return;
        }

        self.process_task(task, now).await;
    }

    async fn process_task(&self, mut task: QueuedTask, now: DateTime<Utc>) {
        debug!("executing task {} ({})", task.id, task.data.kind);

        match self.queue.execute(&task).await {
            Ok(..) => {
                self.queue
                    .emit(TaskEvent::new(EventStatus::Finished, &task, now))
                    .await;
            }
            Err(error) => {
                error!(%error, "Unhandled exception in worker thread");
                self.queue
                    .emit(TaskEvent::new(EventStatus::Error, &task, now).with_error())
                    .await;

                if task.retries == 0 {
                    debug!("task {} has no tries left, giving up", task.id);
                    return;
                }

                self.queue
                    .emit(TaskEvent::new(EventStatus::Retrying, &task, now))
                    .await;

                task.retries -= 1;
                info!("Re-enqueueing task {}, {} tries left", task.id, task.retries);

                if task.retry_delay > 0 {
                    task.execute_time = Some(now + TimeDelta::seconds(i64::from(task.retry_delay)));
                    self.schedule.add(task.clone()).await;
                    self.queue
                        .emit(TaskEvent::new(EventStatus::Scheduled, &task, now))
                        .await;
                } else {
                    match self.queue.write_message(&task).await {
                        Ok(()) => {
                            self.queue
                                .emit(TaskEvent::new(EventStatus::Enqueued, &task, now))
                                .await;
                        }
                        Err(error) => {
                            error!(%error, "could not re-enqueue task {}", task.id);
                        }
                    }
                }
            }
        }
    }
}
