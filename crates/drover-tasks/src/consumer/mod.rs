use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::error::BrokerError;
use crate::queue::TaskQueue;
use crate::schedule::Schedule;
use crate::settings::Settings;

mod periodic;
mod scheduler;
mod worker;

use self::periodic::PeriodicLoop;
use self::scheduler::SchedulerLoop;
use self::worker::Worker;


/// Supervises one consumer process: the worker pool, the scheduler
/// loop and the periodic loop, all observing one shutdown signal.
pub struct Consumer<S> {
    queue: TaskQueue<S>,
    schedule: Arc<Schedule>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    settings: Settings,
}

impl<S: Clone + Send + Sync + 'static> Consumer<S> {
    #[must_use]
    pub fn new(queue: TaskQueue<S>) -> Self {
        let settings = queue.settings().clone();
        let schedule = Arc::new(Schedule::new(
            settings.schedule_key(),
            queue.schedule_store(),
        ));

        Self {
            queue,
            schedule,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
            settings,
        }
    }

    #[must_use]
    pub fn schedule(&self) -> &Arc<Schedule> {
        &self.schedule
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.tracker.is_empty() && !self.shutdown.is_cancelled()
    }

    /// Restores the persisted schedule and spawns every loop. All task
    /// types must be registered before this is called.
    pub async fn start(&self) -> Result<(), BrokerError> {
        if !self.tracker.is_empty() {
            return Err(BrokerError::Config("consumer already started"));
        }

        self.schedule.load(self.queue.registry()).await?;

        info!(
            workers = self.settings.workers(),
            periodic = self.settings.periodic(),
            "starting consumer"
        );

        let scheduler = SchedulerLoop::new(
            self.queue.clone(),
            self.schedule.clone(),
            self.shutdown.clone(),
            self.settings.scheduler_interval(),
        );
        self.tracker.spawn(scheduler.run());

        if self.settings.periodic() {
            let periodic = PeriodicLoop::new(self.queue.clone(), self.shutdown.clone());
            self.tracker.spawn(periodic.run());
        } else {
            debug!("periodic task loop is disabled");
        }

        for id in 0..self.settings.workers() {
            let worker = Worker::new(
                id,
                self.queue.clone(),
                self.schedule.clone(),
                self.shutdown.clone(),
            );
            self.tracker.spawn(worker.run());
        }

        Ok(())
    }

    /// Signals every loop to stop, waits for in-flight task executions
    /// to drain and snapshots the schedule one last time.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        info!("shutting down consumer");
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;

        if let Err(error) = self.schedule.save().await {
            warn!(%error, "could not save schedule snapshot during shutdown");
        }
        info!("consumer stopped");
    }
}
