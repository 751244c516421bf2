use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Time source injected into the queue and every consumer loop.
///
/// Production code uses [`SystemClock`]; tests drive a [`VirtualClock`]
/// so deferred execution and backoff sleeps run without real waiting.
#[async_trait]
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock. With `utc` disabled it reads the local wall time and
/// reinterprets it as UTC, so `execute_time` comparisons stay in the
/// operator's local frame across all loops.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    utc: bool,
}

impl SystemClock {
    #[must_use]
    pub fn new(utc: bool) -> Self {
        Self { utc }
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        if self.utc {
            Utc::now()
        } else {
            Utc.from_utc_datetime(&Local::now().naive_local())
        }
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Manually driven clock for tests. `sleep` advances the clock by the
/// requested duration and yields, so polling loops make progress
/// without wall-clock delays.
#[derive(Debug)]
pub struct VirtualClock {
    now: Mutex<DateTime<Utc>>,
}

impl VirtualClock {
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock poisoned") = now;
    }

    pub fn advance(&self, delta: TimeDelta) {
        let mut now = self.now.lock().expect("clock lock poisoned");
        *now += delta;
    }
}

#[async_trait]
impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock poisoned")
    }

    async fn sleep(&self, duration: Duration) {
        let delta = TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::zero());
        self.advance(delta);
        tokio::task::yield_now().await;
    }
}
