use super::host::{CronHost, IsolatedJobStatus};
use super::types::{CronJob, CronPayload, CronRunStatus, SkipReason};

/// Terminal result of one firing, ready to be folded into job state.
#[derive(Debug, Clone)]
pub(crate) struct RunOutcome {
    pub status: CronRunStatus,
    pub error: Option<String>,
    pub summary: Option<String>,
}

impl RunOutcome {
    pub(crate) fn skipped(reason: SkipReason) -> Self {
        Self {
            status: CronRunStatus::Skipped,
            error: Some(reason.to_string()),
            summary: None,
        }
    }
}

/// Execute a validated job against the host callbacks.
///
/// Callers run `fire_check` first; dispatch here is on the payload alone.
pub(crate) async fn execute(host: &dyn CronHost, job: &CronJob) -> RunOutcome {
    match &job.payload {
        CronPayload::SystemEvent(payload) => {
            host.enqueue_system_event(&payload.text);
            host.request_reply_heartbeat_now();
            RunOutcome {
                status: CronRunStatus::Ok,
                error: None,
                summary: None,
            }
        }
        CronPayload::AgentTurn(payload) => match host.run_isolated_job(payload).await {
            Ok(report) => {
                let summary = report
                    .summary
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);

                if let Some(summary) = &summary {
                    let line = match report.status {
                        IsolatedJobStatus::Ok => format!("Cron: {summary}"),
                        IsolatedJobStatus::Error => format!("Cron (error): {summary}"),
                    };
                    host.enqueue_system_event(&line);
                    host.request_reply_heartbeat_now();
                }

                let status = match report.status {
                    IsolatedJobStatus::Ok => CronRunStatus::Ok,
                    IsolatedJobStatus::Error => CronRunStatus::Error,
                };
                RunOutcome {
                    status,
                    error: report.error,
                    summary,
                }
            }
            Err(error) => {
                tracing::warn!(job_id = %job.id, %error, "isolated cron job runner failed");
                RunOutcome {
                    status: CronRunStatus::Error,
                    error: Some(error.to_string()),
                    summary: None,
                }
            }
        },
    }
}
