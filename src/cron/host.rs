use super::types::AgentTurnPayload;
use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

pub type HostFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What an isolated agent run reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolatedJobStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone)]
pub struct IsolatedJobReport {
    pub status: IsolatedJobStatus,
    /// Best-effort last output of the run. Surfaced to the main session even
    /// when the run failed.
    pub summary: Option<String>,
    pub error: Option<String>,
}

/// The external collaborators the scheduler drives.
///
/// Implementations own the actual session plumbing; the scheduler only
/// guarantees call ordering: a heartbeat request always immediately follows a
/// successful system-event enqueue for a firing job, and neither is invoked
/// for a skipped job.
pub trait CronHost: Send + Sync {
    /// Append a system-originated message to the main session's inbound queue.
    fn enqueue_system_event(&self, text: &str);

    /// Signal the main session's reply loop to process immediately rather
    /// than waiting for its next natural tick.
    fn request_reply_heartbeat_now(&self);

    /// Execute an agent turn in an isolated session context and report back.
    fn run_isolated_job<'a>(
        &'a self,
        payload: &'a AgentTurnPayload,
    ) -> HostFuture<'a, Result<IsolatedJobReport>>;
}
