use chrono::{DateTime, TimeDelta, Utc};

/// When an explicitly scheduled task becomes due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduled {
    At(DateTime<Utc>),
    In(TimeDelta),
}

impl Scheduled {
    #[must_use]
    pub fn execute_time(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::At(timestamp) => *timestamp,
            Self::In(delta) => now + *delta,
        }
    }
}
