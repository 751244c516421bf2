use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::time::Duration;
use typed_builder::TypedBuilder;

#[derive(Debug, Clone, Deserialize, Serialize, TypedBuilder)]
#[serde(default)]
pub struct Settings {
    /// Number of worker loops pulling from the queue.
    ///
    /// It defaults to `1` if not set.
    #[builder(default = NonZeroUsize::MIN)]
    pub(crate) workers: NonZeroUsize,

    /// Initial sleep after an empty queue poll. Repeated misses grow
    /// it by `backoff` up to `max_delay`; a successful poll resets it.
    ///
    /// It defaults to `100ms` if not set.
    #[builder(default = Duration::from_millis(100))]
    pub(crate) default_delay: Duration,

    /// Upper bound of the empty-poll sleep.
    ///
    /// It defaults to `10s` if not set.
    #[builder(default = Duration::from_secs(10))]
    pub(crate) max_delay: Duration,

    /// Multiplier applied to the empty-poll sleep per miss.
    ///
    /// It defaults to `1.15` if not set.
    #[builder(default = 1.15)]
    pub(crate) backoff: f32,

    /// Pause between scheduler passes over the deferred task set.
    ///
    /// It defaults to `1s` if not set.
    #[builder(default = Duration::from_secs(1))]
    pub(crate) scheduler_interval: Duration,

    /// Key the schedule snapshot is persisted under.
    #[builder(default = String::from("schedule"))]
    pub(crate) schedule_key: String,

    /// Whether the periodic loop runs at all.
    #[builder(default = true)]
    pub(crate) periodic: bool,

    /// Whether `now()` reads UTC or the local wall clock. Must stay
    /// consistent between producers and every consumer process, since
    /// `execute_time` comparisons depend on it.
    #[builder(default = true)]
    pub(crate) utc: bool,

    /// Persist results that are `null`. Off by default.
    #[builder(default)]
    pub(crate) store_null_results: bool,

    /// Execute tasks synchronously on enqueue instead of writing them
    /// to the queue. Only sensible in tests.
    #[builder(default)]
    pub(crate) eager: bool,
}

impl Settings {
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers.get()
    }

    #[must_use]
    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    #[must_use]
    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    #[must_use]
    pub fn backoff(&self) -> f32 {
        self.backoff
    }

    #[must_use]
    pub fn scheduler_interval(&self) -> Duration {
        self.scheduler_interval
    }

    #[must_use]
    pub fn schedule_key(&self) -> &str {
        &self.schedule_key
    }

    #[must_use]
    pub fn periodic(&self) -> bool {
        self.periodic
    }

    #[must_use]
    pub fn utc(&self) -> bool {
        self.utc
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: NonZeroUsize::MIN,
            default_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            backoff: 1.15,
            scheduler_interval: Duration::from_secs(1),
            schedule_key: String::from("schedule"),
            periodic: true,
            utc: true,
            store_null_results: false,
            eager: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_match_default_impl() {
        let built = Settings::builder().build();
        let default = Settings::default();

        assert_eq!(built.workers(), default.workers());
        assert_eq!(built.default_delay(), default.default_delay());
        assert_eq!(built.max_delay(), default.max_delay());
        assert_eq!(built.scheduler_interval(), default.scheduler_interval());
        assert_eq!(built.schedule_key(), default.schedule_key());
        assert_eq!(built.periodic(), default.periodic());
        assert_eq!(built.utc(), default.utc());
    }
}
