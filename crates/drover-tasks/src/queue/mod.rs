use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::backend::{DataStore, EventEmitter, Queue};
use crate::clock::{Clock, SystemClock};
use crate::error::{BrokerError, TaskError};
use crate::event::TaskEvent;
use crate::message::{QueuedTask, TaskRawData, MESSAGE_VERSION};
use crate::registry::TaskRegistry;
use crate::result::AsyncResult;
use crate::scheduled::Scheduled;
use crate::settings::Settings;
use crate::task::{Task, TaskRunContext};

mod catch_unwind;

use self::catch_unwind::CatchUnwindTaskFuture;

/// Façade over the broker backends: producers enqueue through it,
/// workers dequeue and execute through it, and revocation and result
/// records go through it in both directions.
///
/// Cloning is cheap; every loop of a consumer holds its own handle.
pub struct TaskQueue<S>(Arc<TaskQueueInner<S>>);

impl<S> Clone for TaskQueue<S> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

struct TaskQueueInner<S> {
    registry: TaskRegistry<S>,
    queue: Arc<dyn Queue>,
    result_store: Option<Arc<dyn DataStore>>,
    schedule_store: Option<Arc<dyn DataStore>>,
    events: Option<Arc<dyn EventEmitter>>,
    clock: Arc<dyn Clock>,
    settings: Settings,
    state: S,
}

impl<S: Clone + Send + Sync + 'static> TaskQueue<S> {
    pub fn builder(queue: Arc<dyn Queue>, settings: Settings, state: S) -> TaskQueueBuilder<S> {
        TaskQueueBuilder {
            queue,
            result_store: None,
            schedule_store: None,
            events: None,
            clock: None,
            settings,
            state,
        }
    }

    #[must_use]
    pub fn register_task<T>(self) -> Self
    where
        T: Task<State = S> + serde::de::DeserializeOwned,
    {
        self.0.registry.register_task::<T>();
        self
    }

    #[must_use]
    pub fn registry(&self) -> &TaskRegistry<S> {
        &self.0.registry
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.0.settings
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.0.clock
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.0.clock.now()
    }

    pub(crate) fn schedule_store(&self) -> Option<Arc<dyn DataStore>> {
        self.0.schedule_store.clone()
    }

    #[must_use]
    pub fn has_result_store(&self) -> bool {
        self.0.result_store.is_some()
    }
}

impl<S: Clone + Send + Sync + 'static> TaskQueue<S> {
    /// Hands a task to the queue for out-of-band execution. Returns a
    /// result handle when a result store is configured.
    pub async fn enqueue<T>(&self, task: T) -> Result<Option<AsyncResult<S>>, BrokerError>
    where
        T: Task<State = S> + Serialize,
    {
        self.enqueue_inner(task, None).await
    }

    /// Like [`TaskQueue::enqueue`], with the execution deferred.
    pub async fn schedule<T>(
        &self,
        task: T,
        when: Scheduled,
    ) -> Result<Option<AsyncResult<S>>, BrokerError>
    where
        T: Task<State = S> + Serialize,
    {
        let eta = when.execute_time(self.now());
        self.enqueue_inner(task, Some(eta)).await
    }

    async fn enqueue_inner<T>(
        &self,
        task: T,
        execute_time: Option<DateTime<Utc>>,
    ) -> Result<Option<AsyncResult<S>>, BrokerError>
    where
        T: Task<State = S> + Serialize,
    {
        let envelope = self.envelope_of_at(&task, execute_time)?;

        if self.0.settings.eager {
            debug!("eagerly executing task {}", envelope.id);
            let value = self.execute(&envelope).await.map_err(BrokerError::Eager)?;
            return Ok(Some(AsyncResult::with_value(
                self.clone(),
                envelope,
                value,
            )));
        }

        self.write_message(&envelope).await?;
        Ok(self
            .0
            .result_store
            .as_ref()
            .map(|_| AsyncResult::new(self.clone(), envelope)))
    }

    /// Builds the envelope [`TaskQueue::enqueue`] would write, without
    /// writing it. Useful for revoking periodic tasks, whose envelopes
    /// are stable across activations.
    pub fn envelope_of<T>(&self, task: &T) -> Result<QueuedTask, BrokerError>
    where
        T: Task<State = S> + Serialize,
    {
        self.envelope_of_at(task, None)
    }

    fn envelope_of_at<T>(
        &self,
        task: &T,
        execute_time: Option<DateTime<Utc>>,
    ) -> Result<QueuedTask, BrokerError>
    where
        T: Task<State = S> + Serialize,
    {
        let inner = serde_json::to_value(task).map_err(BrokerError::Encode)?;
        let id = if T::trigger().is_recurring() {
            T::kind().to_string()
        } else {
            Uuid::new_v4().to_string()
        };

        let retry_delay = T::retry_delay().num_seconds();
        Ok(QueuedTask {
            version: MESSAGE_VERSION,
            id,
            data: TaskRawData {
                kind: T::kind().to_string(),
                inner,
            },
            execute_time,
            retries: T::retries(),
            retry_delay: u32::try_from(retry_delay).unwrap_or(0),
        })
    }

    /// Pops and decodes one message. `Ok(None)` means the queue is
    /// empty; decode failures are reported so callers can discard the
    /// message instead of retrying it.
    pub async fn dequeue(&self) -> Result<Option<QueuedTask>, BrokerError> {
        let message = self
            .0
            .queue
            .read()
            .await
            .map_err(BrokerError::QueueRead)?;

        match message {
            Some(message) => self.0.registry.decode(&message).map(Some),
            None => Ok(None),
        }
    }

    pub(crate) async fn write_message(&self, task: &QueuedTask) -> Result<(), BrokerError> {
        let message = self.0.registry.encode(task)?;
        self.0
            .queue
            .write(message)
            .await
            .map_err(BrokerError::QueueWrite)
    }

    pub async fn queue_size(&self) -> Result<usize, BrokerError> {
        self.0.queue.size().await.map_err(BrokerError::QueueRead)
    }

    pub async fn flush_queue(&self) -> Result<(), BrokerError> {
        self.0.queue.flush().await.map_err(BrokerError::Flush)
    }
}

impl<S: Clone + Send + Sync + 'static> TaskQueue<S> {
    /// Runs the task's user code and persists its result. Results are
    /// skipped for periodic tasks, and for null values unless the
    /// queue stores them; a failed persist is logged, never raised.
    pub async fn execute(&self, task: &QueuedTask) -> Result<serde_json::Value, TaskError> {
        let boxed = self
            .0
            .registry
            .deserialize_task(&task.data)
            .map_err(TaskError::new)?;

        let declared_retries = self
            .0
            .registry
            .find_item(&task.data.kind)
            .map(|item| item.retries)
            .unwrap_or(task.retries);

        let ctx = TaskRunContext::new(task, declared_retries, self.now());
        let value = CatchUnwindTaskFuture::new(boxed.perform(&ctx, self.0.state.clone())).await?;

        self.store_result(task, &value).await;
        Ok(value)
    }

    async fn store_result(&self, task: &QueuedTask, value: &serde_json::Value) {
        if self.0.result_store.is_none() {
            return;
        }
        if value.is_null() && !self.0.settings.store_null_results {
            return;
        }
        if self.is_periodic(task) {
            return;
        }

        if let Err(error) = self.put_result(&task.id, value).await {
            warn!(%error, "could not store result for task {}", task.id);
        }
    }

    fn is_periodic(&self, task: &QueuedTask) -> bool {
        self.0
            .registry
            .find_item(&task.data.kind)
            .map_or(task.id == task.data.kind, |item| item.is_recurring())
    }

    pub async fn put_result(
        &self,
        id: &str,
        value: &serde_json::Value,
    ) -> Result<(), BrokerError> {
        let store = self.result_store()?;
        let bytes = serde_json::to_vec(value).map_err(BrokerError::Encode)?;
        store.put(id, bytes).await.map_err(BrokerError::StorePut)
    }

    /// Reads a result record. A non-`peek` read removes the record.
    pub async fn get_result(
        &self,
        id: &str,
        peek: bool,
    ) -> Result<Option<serde_json::Value>, BrokerError> {
        let store = self.result_store()?;
        let bytes = if peek {
            store.peek(id).await.map_err(BrokerError::StoreGet)?
        } else {
            store.get(id).await.map_err(BrokerError::StoreGet)?
        };

        match bytes {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(BrokerError::Decode),
            None => Ok(None),
        }
    }

    fn result_store(&self) -> Result<&Arc<dyn DataStore>, BrokerError> {
        self.0
            .result_store
            .as_ref()
            .ok_or(BrokerError::Config("a result store is not configured"))
    }
}

impl<S: Clone + Send + Sync + 'static> TaskQueue<S> {
    /// Writes a soft cancellation record for `task`. The queued
    /// message stays where it is; workers drop it at dequeue time.
    pub async fn revoke(
        &self,
        task: &QueuedTask,
        until: Option<DateTime<Utc>>,
        once: bool,
    ) -> Result<(), BrokerError> {
        let store = self
            .0
            .result_store
            .as_ref()
            .ok_or(BrokerError::Config("a result store is required to revoke tasks"))?;

        let record = serde_json::to_vec(&(until, once)).map_err(BrokerError::Encode)?;
        store
            .put(&task.revoke_id(), record)
            .await
            .map_err(BrokerError::StorePut)
    }

    /// Clears any revocation record for `task`.
    pub async fn restore(&self, task: &QueuedTask) -> Result<(), BrokerError> {
        let store = self.result_store()?;
        store
            .get(&task.revoke_id())
            .await
            .map_err(BrokerError::StoreGet)?;
        Ok(())
    }

    /// Checks the revocation record as of `now`. A one-shot record is
    /// consumed when `preserve` is off; that consumption is what makes
    /// `revoke_once` suppress exactly one activation.
    pub async fn is_revoked(
        &self,
        task: &QueuedTask,
        now: DateTime<Utc>,
        preserve: bool,
    ) -> Result<bool, BrokerError> {
        let Some(store) = &self.0.result_store else {
            return Ok(false);
        };

        let Some(bytes) = store
            .peek(&task.revoke_id())
            .await
            .map_err(BrokerError::StoreGet)?
        else {
            return Ok(false);
        };

        let (until, once): (Option<DateTime<Utc>>, bool) =
            serde_json::from_slice(&bytes).map_err(BrokerError::Decode)?;

        if once {
            if !preserve {
                self.restore(task).await?;
            }
            return Ok(true);
        }

        Ok(until.map_or(true, |until| until > now))
    }
}

impl<S: Clone + Send + Sync + 'static> TaskQueue<S> {
    pub(crate) async fn emit(&self, event: TaskEvent) {
        let Some(emitter) = &self.0.events else {
            return;
        };

        let bytes = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(%error, "could not encode {:?} event for task {}", event.status, event.id);
                return;
            }
        };

        if let Err(error) = emitter.emit(bytes).await {
            warn!(%error, "could not emit {:?} event for task {}", event.status, event.id);
        }
    }

    // strictly for testing only!
    #[doc(hidden)]
    #[must_use]
    pub fn get_state(&self) -> &S {
        &self.0.state
    }
}

pub struct TaskQueueBuilder<S> {
    queue: Arc<dyn Queue>,
    result_store: Option<Arc<dyn DataStore>>,
    schedule_store: Option<Arc<dyn DataStore>>,
    events: Option<Arc<dyn EventEmitter>>,
    clock: Option<Arc<dyn Clock>>,
    settings: Settings,
    state: S,
}

impl<S: Clone + Send + Sync + 'static> TaskQueueBuilder<S> {
    #[must_use]
    pub fn result_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.result_store = Some(store);
        self
    }

    #[must_use]
    pub fn schedule_store(mut self, store: Arc<dyn DataStore>) -> Self {
        self.schedule_store = Some(store);
        self
    }

    #[must_use]
    pub fn event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.events = Some(emitter);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn build(self) -> TaskQueue<S> {
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock::new(self.settings.utc)));

        TaskQueue(Arc::new(TaskQueueInner {
            registry: TaskRegistry::new(),
            queue: self.queue,
            result_store: self.result_store,
            schedule_store: self.schedule_store,
            events: self.events,
            clock,
            settings: self.settings,
            state: self.state,
        }))
    }
}
