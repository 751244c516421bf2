pub mod backend;
pub mod backoff;
pub mod clock;
pub mod consumer;
pub mod error;
pub mod task;

pub use self::consumer::Consumer;
pub use self::event::{EventStatus, TaskEvent};
pub use self::message::{QueuedTask, TaskRawData, MESSAGE_VERSION};
pub use self::queue::{TaskQueue, TaskQueueBuilder};
pub use self::registry::TaskRegistry;
pub use self::result::{AsyncResult, WaitOptions};
pub use self::schedule::Schedule;
pub use self::scheduled::Scheduled;
pub use self::settings::Settings;
pub use self::task::{Task, TaskResult, TaskRunContext, TaskTrigger};

pub mod prelude {
    pub use super::task::{Task, TaskResult, TaskRunContext, TaskTrigger};
    pub use super::Scheduled;

    pub use ::async_trait::async_trait;
    pub use ::chrono::TimeDelta;
    pub use ::serde::{Deserialize, Serialize};
}

mod event;
mod message;
mod queue;
mod registry;
mod result;
mod schedule;
mod scheduled;
mod settings;

#[cfg(test)]
mod test_utils;
