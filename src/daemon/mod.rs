use crate::config::Config;
use crate::cron::{
    AgentTurnPayload, CronHost, CronService, CronServiceOptions, HostFuture, IsolatedJobReport,
};
use anyhow::Result;
use std::sync::Arc;

/// Host wiring for a standalone daemon: system events and heartbeat requests
/// go to the process log until a channel transport claims them, and no
/// isolated runner is configured, so isolated jobs record an error instead of
/// silently vanishing. Embedders replace this with their own [`CronHost`].
struct LogBridge;

impl CronHost for LogBridge {
    fn enqueue_system_event(&self, text: &str) {
        tracing::info!(event = %text, "system event for main session");
    }

    fn request_reply_heartbeat_now(&self) {
        tracing::debug!("reply heartbeat requested");
    }

    fn run_isolated_job<'a>(
        &'a self,
        _payload: &'a AgentTurnPayload,
    ) -> HostFuture<'a, Result<IsolatedJobReport>> {
        Box::pin(async { Err(anyhow::anyhow!("no isolated agent runner configured")) })
    }
}

pub async fn run(config: Config) -> Result<()> {
    let cron = CronService::new(
        CronServiceOptions::from_config(&config),
        Arc::new(LogBridge),
    );
    cron.start()?;

    let status = cron.status();
    tracing::info!(
        jobs = status.jobs,
        enabled = status.enabled,
        "starling daemon running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    cron.stop();
    tracing::info!("starling daemon stopped");
    Ok(())
}
