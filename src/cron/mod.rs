use crate::config::Config;
use crate::error::CronError;
use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

pub mod host;
mod runner;
pub mod store;
pub mod types;

pub use host::{CronHost, HostFuture, IsolatedJobReport, IsolatedJobStatus};
pub use store::{CRON_STORE_VERSION, CronJobsFile, CronStore};
pub use types::{
    AgentTurnPayload, CronJob, CronJobSpec, CronJobState, CronPayload, CronRunStatus, CronSchedule,
    SessionTarget, SkipReason, SystemEventPayload, WakeMode,
};

use runner::RunOutcome;

/// Construction-time options for the scheduler.
#[derive(Debug, Clone)]
pub struct CronServiceOptions {
    pub store_path: PathBuf,
    /// Global switch. When false no timers are ever armed; `add` and `list`
    /// keep working for inspection and future activation.
    pub enabled: bool,
    pub max_concurrent_runs: usize,
}

impl CronServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            store_path: config.cron.store_path(&config.workspace_dir),
            enabled: config.cron.enabled,
            max_concurrent_runs: config.cron.max_concurrent_runs.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronStatus {
    pub enabled: bool,
    pub jobs: usize,
    pub next_wake_at_ms: Option<i64>,
}

#[derive(Default)]
struct SchedulerState {
    loaded: bool,
    started: bool,
    stopped: bool,
    jobs: Vec<CronJob>,
    /// One pending wake-up per job id. A job never has two live timers: the
    /// old handle is cancelled before a new one is installed, and a firing
    /// task removes its own entry before executing.
    timers: HashMap<String, JoinHandle<()>>,
}

struct Inner {
    enabled: bool,
    store: CronStore,
    host: Arc<dyn CronHost>,
    run_slots: Semaphore,
    cancel: CancellationToken,
    state: Mutex<SchedulerState>,
}

/// Timer-driven scheduler for autonomous jobs.
///
/// Single logical instance per process. Executions of different jobs may
/// overlap (bounded by `max_concurrent_runs`); a single job is serialized
/// with itself because its firing task is also its only timer and re-arms
/// only after the run completes.
#[derive(Clone)]
pub struct CronService {
    inner: Arc<Inner>,
}

impl CronService {
    pub fn new(options: CronServiceOptions, host: Arc<dyn CronHost>) -> Self {
        Self {
            inner: Arc::new(Inner {
                enabled: options.enabled,
                store: CronStore::new(options.store_path),
                host,
                run_slots: Semaphore::new(options.max_concurrent_runs.max(1)),
                cancel: CancellationToken::new(),
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Load the job store and arm one timer per enabled job. When the
    /// scheduler is globally disabled this only loads: jobs stay inspectable
    /// but nothing ever fires.
    pub fn start(&self) -> Result<(), CronError> {
        let doc = self.inner.store.load().map_err(CronError::Store)?;

        let mut st = self.inner.lock_state();
        if st.started {
            return Ok(());
        }
        st.jobs = doc.jobs;
        st.loaded = true;

        for job in &st.jobs {
            if let Err(reason) = types::fire_check(job) {
                tracing::warn!(
                    job_id = %job.id,
                    %reason,
                    "persisted cron job is invalid; it will be skipped when fired"
                );
            }
        }

        if !self.inner.enabled {
            tracing::warn!("cron scheduler is disabled; persisted jobs will not fire");
            return Ok(());
        }
        st.started = true;

        let now = now_ms();
        let due_times: Vec<(String, i64)> = st
            .jobs
            .iter_mut()
            .filter(|job| job.enabled)
            .map(|job| {
                let due = job
                    .state
                    .next_run_at_ms
                    .unwrap_or_else(|| types::initial_next_run(&job.schedule, now));
                job.state.next_run_at_ms = Some(due);
                (job.id.clone(), due)
            })
            .collect();
        for (job_id, due_at_ms) in due_times {
            Inner::arm_locked(&self.inner, &mut st, job_id, due_at_ms);
        }

        tracing::info!(jobs = st.jobs.len(), "cron scheduler started");
        Ok(())
    }

    /// Cancel all armed timers. In-flight executions finish and write their
    /// final state; no new execution starts afterwards. Idempotent.
    pub fn stop(&self) {
        let mut st = self.inner.lock_state();
        st.stopped = true;
        st.started = false;
        self.inner.cancel.cancel();
        for (_, handle) in st.timers.drain() {
            handle.abort();
        }
        tracing::debug!("cron scheduler stopped");
    }

    /// Validate and persist a new job; arm its timer when the scheduler is
    /// running. Validation failures reject before anything is persisted.
    pub fn add(&self, spec: CronJobSpec) -> Result<CronJob, CronError> {
        let job = spec.into_job(now_ms())?;

        let mut st = self.inner.lock_state();
        Inner::ensure_loaded_locked(&self.inner, &mut st)?;
        st.jobs.push(job.clone());
        if let Err(error) = Inner::persist_locked(&self.inner, &st) {
            st.jobs.retain(|j| j.id != job.id);
            return Err(CronError::Store(error));
        }

        if job.enabled && st.started {
            if let Some(due_at_ms) = job.state.next_run_at_ms {
                Inner::arm_locked(&self.inner, &mut st, job.id.clone(), due_at_ms);
            }
        }
        tracing::debug!(job_id = %job.id, "cron job added");
        Ok(job)
    }

    /// Remove a job and cancel its pending timer. Returns false when the id
    /// is unknown.
    pub fn remove(&self, id: &str) -> Result<bool, CronError> {
        let mut st = self.inner.lock_state();
        Inner::ensure_loaded_locked(&self.inner, &mut st)?;
        let before = st.jobs.len();
        st.jobs.retain(|job| job.id != id);
        if st.jobs.len() == before {
            return Ok(false);
        }
        if let Some(handle) = st.timers.remove(id) {
            handle.abort();
        }
        Inner::persist_locked(&self.inner, &st).map_err(CronError::Store)?;
        tracing::debug!(job_id = %id, "cron job removed");
        Ok(true)
    }

    /// Enable or disable a job, cancelling or (re-)arming its timer.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, CronError> {
        let mut st = self.inner.lock_state();
        Inner::ensure_loaded_locked(&self.inner, &mut st)?;
        let Some(position) = st.jobs.iter().position(|job| job.id == id) else {
            return Ok(false);
        };

        let now = now_ms();
        let (job_id, due_at_ms) = {
            let job = &mut st.jobs[position];
            job.enabled = enabled;
            job.updated_at_ms = now;
            if enabled && job.state.next_run_at_ms.is_none() {
                job.state.next_run_at_ms = Some(types::initial_next_run(&job.schedule, now));
            }
            (job.id.clone(), job.state.next_run_at_ms)
        };

        if enabled {
            if st.started {
                if let Some(due_at_ms) = due_at_ms {
                    Inner::arm_locked(&self.inner, &mut st, job_id, due_at_ms);
                }
            }
        } else if let Some(handle) = st.timers.remove(&job_id) {
            handle.abort();
        }

        Inner::persist_locked(&self.inner, &st).map_err(CronError::Store)?;
        Ok(true)
    }

    /// Read-only snapshot, ordered by due time. Empty until the store has
    /// been loaded.
    pub fn list(&self, include_disabled: bool) -> Vec<CronJob> {
        let st = self.inner.lock_state();
        if !st.loaded {
            return Vec::new();
        }
        let mut jobs: Vec<CronJob> = st
            .jobs
            .iter()
            .filter(|job| include_disabled || job.enabled)
            .cloned()
            .collect();
        jobs.sort_by_key(|job| job.state.next_run_at_ms.unwrap_or(i64::MAX));
        jobs
    }

    pub fn status(&self) -> CronStatus {
        let st = self.inner.lock_state();
        let next_wake_at_ms = if self.inner.enabled {
            st.jobs
                .iter()
                .filter(|job| job.enabled)
                .filter_map(|job| job.state.next_run_at_ms)
                .min()
        } else {
            None
        };
        CronStatus {
            enabled: self.inner.enabled,
            jobs: st.jobs.len(),
            next_wake_at_ms,
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutations before `start` must not clobber persisted jobs: pull the
    /// document in first if nothing has been loaded yet.
    fn ensure_loaded_locked(inner: &Inner, st: &mut SchedulerState) -> Result<(), CronError> {
        if !st.loaded {
            let doc = inner.store.load().map_err(CronError::Store)?;
            st.jobs = doc.jobs;
            st.loaded = true;
        }
        Ok(())
    }

    fn persist_locked(inner: &Inner, st: &SchedulerState) -> Result<()> {
        let doc = CronJobsFile {
            version: CRON_STORE_VERSION,
            jobs: st.jobs.clone(),
        };
        inner.store.save(&doc)
    }

    /// Install the single live timer for a job. Any stale handle is cancelled
    /// first so two timers can never coexist for one id.
    fn arm_locked(inner: &Arc<Inner>, st: &mut SchedulerState, job_id: String, due_at_ms: i64) {
        if st.stopped || !inner.enabled {
            return;
        }
        if let Some(stale) = st.timers.remove(&job_id) {
            stale.abort();
        }

        let task_inner = Arc::clone(inner);
        let cancel = inner.cancel.clone();
        let task_job_id = job_id.clone();
        let handle = tokio::spawn(async move {
            let delay_ms = u64::try_from(due_at_ms.saturating_sub(now_ms())).unwrap_or(0);
            tokio::select! {
                () = cancel.cancelled() => {}
                () = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                    Inner::fire(&task_inner, &task_job_id).await;
                }
            }
        });
        st.timers.insert(job_id, handle);
    }

    async fn fire(inner: &Arc<Inner>, job_id: &str) {
        let job = {
            let mut st = inner.lock_state();
            st.timers.remove(job_id);
            if st.stopped || !inner.enabled {
                return;
            }
            let Some(job) = st.jobs.iter().find(|job| job.id == job_id) else {
                return;
            };
            if !job.enabled {
                return;
            }
            job.clone()
        };

        let Ok(_permit) = inner.run_slots.acquire().await else {
            return;
        };
        if inner.cancel.is_cancelled() {
            return;
        }

        let fired_at_ms = now_ms();
        let outcome = match types::fire_check(&job) {
            Ok(()) => {
                tracing::debug!(job_id = %job.id, "cron job firing");
                runner::execute(inner.host.as_ref(), &job).await
            }
            Err(reason) => {
                tracing::warn!(job_id = %job.id, %reason, "skipping cron job");
                RunOutcome::skipped(reason)
            }
        };

        let mut st = inner.lock_state();
        let Some(position) = st.jobs.iter().position(|job| job.id == job_id) else {
            return;
        };
        // A timer armed while this run was executing is stale either way:
        // one-shot jobs disable below, recurring jobs re-arm from completion.
        if let Some(stale) = st.timers.remove(job_id) {
            stale.abort();
        }
        let rearm = {
            let job = &mut st.jobs[position];
            let now = now_ms();
            job.state.last_run_at_ms = Some(fired_at_ms);
            job.state.last_status = Some(outcome.status);
            job.state.last_error = outcome.error;
            job.state.last_summary = outcome.summary;
            job.updated_at_ms = now;

            match job.schedule {
                // One-shot semantics: a single fire attempt, whatever its
                // outcome.
                CronSchedule::At { .. } => {
                    job.enabled = false;
                    job.state.next_run_at_ms = None;
                    None
                }
                CronSchedule::Every { every_ms } => {
                    let next = now.saturating_add(every_ms.max(1));
                    job.state.next_run_at_ms = Some(next);
                    job.enabled.then(|| (job.id.clone(), next))
                }
            }
        };

        if let Some((job_id, due_at_ms)) = rearm {
            Inner::arm_locked(inner, &mut st, job_id, due_at_ms);
        }
        if let Err(error) = Inner::persist_locked(inner, &st) {
            tracing::error!(
                %error,
                "failed to persist cron job state; in-memory state remains authoritative"
            );
        }
    }
}

pub(crate) fn now_ms() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

// ─── CLI surface ────────────────────────────────────────────────────────────

fn format_ms(ms: Option<i64>) -> String {
    ms.and_then(chrono::DateTime::from_timestamp_millis)
        .map_or_else(|| "n/a".into(), |dt| dt.to_rfc3339())
}

fn describe_schedule(schedule: &CronSchedule) -> String {
    match *schedule {
        CronSchedule::At { at_ms } => format!("at {}", format_ms(Some(at_ms))),
        CronSchedule::Every { every_ms } => format!("every {every_ms}ms"),
    }
}

#[allow(clippy::needless_pass_by_value)]
pub fn handle_command(command: crate::cli::CronCommands, config: &Config) -> Result<()> {
    let store = CronStore::new(config.cron.store_path(&config.workspace_dir));

    match command {
        crate::cli::CronCommands::List { all } => {
            let doc = store.load()?;
            let mut jobs: Vec<&CronJob> = doc
                .jobs
                .iter()
                .filter(|job| all || job.enabled)
                .collect();
            jobs.sort_by_key(|job| job.state.next_run_at_ms.unwrap_or(i64::MAX));

            if jobs.is_empty() {
                println!("No scheduled jobs yet.");
                println!("\nUsage:");
                println!(
                    "  starling cron add --at-ms 1765584002000 --target main --text \"stand-up reminder\""
                );
                return Ok(());
            }

            println!("🕒 Scheduled jobs ({}):", jobs.len());
            for job in jobs {
                let name = job.name.as_deref().unwrap_or("-");
                let last_status = job
                    .state
                    .last_status
                    .map_or_else(|| "n/a".into(), |status| status.to_string());
                println!(
                    "- {} | {} | {} | target={} wake={} | next={} | last={} ({})",
                    job.id,
                    name,
                    describe_schedule(&job.schedule),
                    job.session_target,
                    job.wake_mode,
                    format_ms(job.state.next_run_at_ms),
                    format_ms(job.state.last_run_at_ms),
                    last_status
                );
                if let Some(error) = &job.state.last_error {
                    println!("    last error: {error}");
                }
            }
            Ok(())
        }
        crate::cli::CronCommands::Add {
            name,
            at_ms,
            every_ms,
            target,
            wake,
            text,
            message,
            deliver,
        } => {
            let schedule = match (at_ms, every_ms) {
                (Some(at_ms), None) => CronSchedule::At { at_ms },
                (None, Some(every_ms)) => CronSchedule::Every { every_ms },
                _ => anyhow::bail!("specify exactly one of --at-ms or --every-ms"),
            };
            let session_target: SessionTarget = target
                .parse()
                .map_err(|_| anyhow::anyhow!("invalid --target: {target} (expected main|isolated)"))?;
            let wake_mode: WakeMode = wake.parse().map_err(|_| {
                anyhow::anyhow!("invalid --wake: {wake} (expected now|next-heartbeat)")
            })?;
            let payload = match session_target {
                SessionTarget::Main => CronPayload::SystemEvent(SystemEventPayload {
                    text: text.ok_or_else(|| anyhow::anyhow!("--text is required for main jobs"))?,
                }),
                SessionTarget::Isolated => CronPayload::AgentTurn(AgentTurnPayload {
                    message: message
                        .ok_or_else(|| anyhow::anyhow!("--message is required for isolated jobs"))?,
                    deliver: Some(deliver),
                }),
            };

            let job = CronJobSpec {
                name,
                enabled: true,
                schedule,
                session_target,
                wake_mode,
                payload,
            }
            .into_job(now_ms())?;

            let mut doc = store.load()?;
            doc.jobs.push(job.clone());
            store.save(&doc)?;

            println!("✅ Added cron job {}", job.id);
            println!("  Schedule: {}", describe_schedule(&job.schedule));
            println!("  Next    : {}", format_ms(job.state.next_run_at_ms));
            Ok(())
        }
        crate::cli::CronCommands::Remove { id } => {
            let mut doc = store.load()?;
            let before = doc.jobs.len();
            doc.jobs.retain(|job| job.id != id);
            if doc.jobs.len() == before {
                return Err(CronError::JobNotFound(id).into());
            }
            store.save(&doc)?;
            println!("✅ Removed cron job {id}");
            Ok(())
        }
        crate::cli::CronCommands::Status => {
            let doc = store.load()?;
            let next_wake_at_ms = if config.cron.enabled {
                doc.jobs
                    .iter()
                    .filter(|job| job.enabled)
                    .filter_map(|job| job.state.next_run_at_ms)
                    .min()
            } else {
                None
            };

            println!(
                "Cron scheduler: {}",
                if config.cron.enabled { "enabled" } else { "disabled" }
            );
            println!("Jobs: {}", doc.jobs.len());
            println!("Next wake: {}", format_ms(next_wake_at_ms));
            Ok(())
        }
    }
}
