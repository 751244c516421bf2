use chrono::{DateTime, TimeDelta, Timelike, Utc};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum TaskTrigger {
    /// The task only runs when explicitly enqueued.
    None,

    /// Matches whenever the cron expression covers the current minute.
    Cron(cron_clock::Schedule),

    /// Matches every `<duration>`, aligned to the Unix epoch.
    Every(TimeDelta),

    /// Matches if any of the contained triggers match.
    Multiple(Vec<TaskTrigger>),
}

#[derive(Debug, Error)]
#[error("invalid cron expression")]
pub struct InvalidCronExpr;

impl TaskTrigger {
    pub fn cron<T: AsRef<str>>(expr: T) -> Result<Self, InvalidCronExpr> {
        cron_clock::Schedule::from_str(expr.as_ref())
            .map(Self::Cron)
            .map_err(|_| InvalidCronExpr)
    }

    #[must_use]
    pub fn every(delta: TimeDelta) -> Self {
        Self::Every(delta)
    }

    #[must_use]
    pub fn is_recurring(&self) -> bool {
        match self {
            Self::Cron(..) | Self::Every(..) => true,
            Self::Multiple(triggers) => triggers.iter().any(TaskTrigger::is_recurring),
            Self::None => false,
        }
    }

    /// Evaluates the trigger against `now`, truncated to its minute.
    /// The periodic loop calls this once per minute boundary.
    #[must_use]
    pub fn matches(&self, now: DateTime<Utc>) -> bool {
        let Some(minute) = truncate_to_minute(now) else {
            return false;
        };

        match self {
            Self::None => false,
            Self::Cron(schedule) => {
                let probe = minute - TimeDelta::seconds(1);
                schedule.after(&probe).next() == Some(minute)
            }
            Self::Every(delta) => {
                let seconds = delta.num_seconds();
                seconds > 0 && minute.timestamp() % seconds == 0
            }
            Self::Multiple(triggers) => triggers.iter().any(|trigger| trigger.matches(now)),
        }
    }
}

fn truncate_to_minute(now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    now.with_second(0).and_then(|n| n.with_nanosecond(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn at(hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 20, hour, minute, second).unwrap()
    }

    #[test]
    fn none_never_matches() {
        assert!(!TaskTrigger::None.matches(at(0, 0, 0)));
        assert!(!TaskTrigger::None.is_recurring());
    }

    #[test]
    fn hourly_cron_matches_only_on_the_hour() {
        // sec min hour day month dow
        let trigger = TaskTrigger::cron("0 0 * * * *").unwrap();
        assert!(trigger.is_recurring());

        assert!(trigger.matches(at(3, 0, 0)));
        // seconds within the minute are irrelevant
        assert!(trigger.matches(at(3, 0, 42)));
        assert!(!trigger.matches(at(3, 1, 0)));
        assert!(!trigger.matches(at(3, 59, 0)));
    }

    #[test]
    fn invalid_cron_expression_is_rejected() {
        assert!(TaskTrigger::cron("not a cron line").is_err());
    }

    #[test]
    fn interval_matches_on_epoch_aligned_boundaries() {
        let trigger = TaskTrigger::every(TimeDelta::minutes(5));

        assert!(trigger.matches(at(3, 0, 0)));
        assert!(!trigger.matches(at(3, 1, 0)));
        assert!(trigger.matches(at(3, 5, 17)));
    }

    #[test]
    fn non_positive_interval_never_matches() {
        assert!(!TaskTrigger::every(TimeDelta::zero()).matches(at(3, 0, 0)));
    }

    #[test]
    fn multiple_matches_if_any_member_does() {
        let trigger = TaskTrigger::Multiple(vec![
            TaskTrigger::cron("0 0 * * * *").unwrap(),
            TaskTrigger::every(TimeDelta::minutes(7)),
        ]);

        assert!(trigger.is_recurring());
        assert!(trigger.matches(at(3, 0, 0)));
        assert!(!trigger.matches(at(3, 2, 0)));
    }
}
