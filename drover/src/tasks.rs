use drover_tasks::prelude::*;
use tracing::info;

/// Minute heartbeat so a freshly wired consumer visibly does work.
#[derive(Debug, Deserialize, Serialize)]
pub struct Heartbeat;

#[async_trait]
impl Task for Heartbeat {
    type State = ();

    fn kind() -> &'static str {
        "drover::tasks::heartbeat"
    }

    fn trigger() -> TaskTrigger {
        TaskTrigger::cron("0 * * * * *").expect("static cron expression")
    }

    async fn perform(&self, ctx: &TaskRunContext, _state: Self::State) -> TaskResult {
        info!("heartbeat at {}", ctx.started_at);
        Ok(serde_json::Value::Null)
    }
}
