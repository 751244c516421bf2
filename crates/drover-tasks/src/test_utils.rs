use async_trait::async_trait;
use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::TaskError;
use crate::task::{Task, TaskResult, TaskRunContext, TaskTrigger};

/// Shared mutable map the test tasks write into, standing in for real
/// application state.
pub(crate) type TestState = Arc<Mutex<HashMap<String, String>>>;

pub(crate) fn new_state() -> TestState {
    Arc::new(Mutex::new(HashMap::new()))
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct ModifyState {
    pub key: String,
    pub value: String,
}

impl ModifyState {
    pub(crate) fn new(key: &str, value: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

#[async_trait]
impl Task for ModifyState {
    type State = TestState;

    fn kind() -> &'static str {
        "tests::modify_state"
    }

    async fn perform(&self, _ctx: &TaskRunContext, state: Self::State) -> TaskResult {
        state
            .lock()
            .expect("state lock poisoned")
            .insert(self.key.clone(), self.value.clone());
        Ok(serde_json::json!(self.value))
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct BlowUp;

#[async_trait]
impl Task for BlowUp {
    type State = TestState;

    fn kind() -> &'static str {
        "tests::blow_up"
    }

    async fn perform(&self, _ctx: &TaskRunContext, _state: Self::State) -> TaskResult {
        Err(TaskError::new("blowed up"))
    }
}

/// Fails while `key` is missing from the state. With `always_fail`
/// unset the first failure also fixes the state, so the next retry
/// succeeds.
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct FlakyTask {
    pub key: String,
    pub always_fail: bool,
}

#[async_trait]
impl Task for FlakyTask {
    type State = TestState;

    fn kind() -> &'static str {
        "tests::flaky"
    }

    fn retries() -> u16 {
        3
    }

    async fn perform(&self, _ctx: &TaskRunContext, state: Self::State) -> TaskResult {
        let mut state = state.lock().expect("state lock poisoned");
        match state.get(&self.key) {
            Some(value) => Ok(serde_json::json!(value)),
            None => {
                if !self.always_fail {
                    state.insert(self.key.clone(), "fixed".to_string());
                }
                Err(TaskError::new("still broken"))
            }
        }
    }
}

/// Same as [`FlakyTask`] but retries wait in the schedule first.
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct SlowFlakyTask {
    pub key: String,
}

#[async_trait]
impl Task for SlowFlakyTask {
    type State = TestState;

    fn kind() -> &'static str {
        "tests::slow_flaky"
    }

    fn retries() -> u16 {
        3
    }

    fn retry_delay() -> TimeDelta {
        TimeDelta::seconds(10)
    }

    async fn perform(&self, _ctx: &TaskRunContext, state: Self::State) -> TaskResult {
        let state = state.lock().expect("state lock poisoned");
        match state.get(&self.key) {
            Some(value) => Ok(serde_json::json!(value)),
            None => Err(TaskError::new("still broken")),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct EveryHour;

#[async_trait]
impl Task for EveryHour {
    type State = TestState;

    fn kind() -> &'static str {
        "tests::every_hour"
    }

    fn trigger() -> TaskTrigger {
        TaskTrigger::cron("0 0 * * * *").expect("static cron expression")
    }

    async fn perform(&self, _ctx: &TaskRunContext, state: Self::State) -> TaskResult {
        state
            .lock()
            .expect("state lock poisoned")
            .insert("p".to_string(), "y".to_string());
        Ok(serde_json::Value::Null)
    }
}

/// Succeeds with a null value; exercises the null result policy.
#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct Nothing;

#[async_trait]
impl Task for Nothing {
    type State = TestState;

    fn kind() -> &'static str {
        "tests::nothing"
    }

    async fn perform(&self, _ctx: &TaskRunContext, _state: Self::State) -> TaskResult {
        Ok(serde_json::Value::Null)
    }
}
