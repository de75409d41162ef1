use starling::cron::{
    AgentTurnPayload, CronHost, CronJobSpec, CronPayload, CronRunStatus, CronSchedule,
    CronService, CronServiceOptions, HostFuture, IsolatedJobReport, IsolatedJobStatus,
    SessionTarget, SystemEventPayload, WakeMode,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tempfile::TempDir;
use tokio::time::Duration;

#[derive(Clone)]
enum IsolatedBehavior {
    Report {
        status: IsolatedJobStatus,
        summary: Option<&'static str>,
        error: Option<&'static str>,
    },
    Fail(&'static str),
}

struct RecordingHost {
    events: Mutex<Vec<String>>,
    heartbeats: AtomicUsize,
    isolated_calls: AtomicUsize,
    behavior: IsolatedBehavior,
}

impl RecordingHost {
    fn new(behavior: IsolatedBehavior) -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            heartbeats: AtomicUsize::new(0),
            isolated_calls: AtomicUsize::new(0),
            behavior,
        })
    }

    fn ok() -> Arc<Self> {
        Self::new(IsolatedBehavior::Report {
            status: IsolatedJobStatus::Ok,
            summary: None,
            error: None,
        })
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }
}

impl CronHost for RecordingHost {
    fn enqueue_system_event(&self, text: &str) {
        self.events.lock().unwrap().push(text.to_string());
    }

    fn request_reply_heartbeat_now(&self) {
        self.heartbeats.fetch_add(1, Ordering::SeqCst);
    }

    fn run_isolated_job<'a>(
        &'a self,
        _payload: &'a AgentTurnPayload,
    ) -> HostFuture<'a, anyhow::Result<IsolatedJobReport>> {
        self.isolated_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.clone();
        Box::pin(async move {
            match behavior {
                IsolatedBehavior::Report {
                    status,
                    summary,
                    error,
                } => Ok(IsolatedJobReport {
                    status,
                    summary: summary.map(str::to_string),
                    error: error.map(str::to_string),
                }),
                IsolatedBehavior::Fail(message) => Err(anyhow::anyhow!(message)),
            }
        })
    }
}

fn store_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("cron").join("jobs.json")
}

fn service(tmp: &TempDir, enabled: bool, host: &Arc<RecordingHost>) -> CronService {
    CronService::new(
        CronServiceOptions {
            store_path: store_path(tmp),
            enabled,
            max_concurrent_runs: 2,
        },
        Arc::clone(host) as Arc<dyn CronHost>,
    )
}

fn now_ms() -> i64 {
    i64::try_from(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_millis(),
    )
    .unwrap()
}

fn main_spec(at_ms: i64, text: &str) -> CronJobSpec {
    CronJobSpec {
        name: None,
        enabled: true,
        schedule: CronSchedule::At { at_ms },
        session_target: SessionTarget::Main,
        wake_mode: WakeMode::Now,
        payload: CronPayload::SystemEvent(SystemEventPayload { text: text.into() }),
    }
}

fn isolated_spec(at_ms: i64) -> CronJobSpec {
    CronJobSpec {
        name: Some("weekly".into()),
        enabled: true,
        schedule: CronSchedule::At { at_ms },
        session_target: SessionTarget::Isolated,
        wake_mode: WakeMode::Now,
        payload: CronPayload::AgentTurn(AgentTurnPayload {
            message: "do it".into(),
            deliver: Some(false),
        }),
    }
}

/// Advance paused time far enough for pending timers and their executions to
/// settle.
async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn one_shot_main_job_fires_and_disables() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    let at_ms = now_ms() + 250;
    let job = cron.add(main_spec(at_ms, "hello")).unwrap();
    assert_eq!(job.state.next_run_at_ms, Some(at_ms));

    settle(1_000).await;

    assert_eq!(host.events(), vec!["hello".to_string()]);
    assert_eq!(host.heartbeats(), 1);

    let jobs = cron.list(true);
    let updated = jobs.iter().find(|j| j.id == job.id).unwrap();
    assert!(!updated.enabled);
    assert_eq!(updated.state.last_status, Some(CronRunStatus::Ok));
    assert_eq!(updated.state.next_run_at_ms, None);

    settle(2_000).await;
    assert_eq!(host.events().len(), 1, "one-shot job must not fire again");

    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn isolated_job_posts_summary_to_main() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::new(IsolatedBehavior::Report {
        status: IsolatedJobStatus::Ok,
        summary: Some("done"),
        error: None,
    });
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    cron.add(isolated_spec(now_ms() + 100)).unwrap();
    settle(1_000).await;

    assert_eq!(host.isolated_calls.load(Ordering::SeqCst), 1);
    assert_eq!(host.events(), vec!["Cron: done".to_string()]);
    assert_eq!(host.heartbeats(), 1);

    let jobs = cron.list(true);
    assert_eq!(jobs[0].state.last_summary.as_deref(), Some("done"));
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn isolated_job_error_still_posts_last_output() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::new(IsolatedBehavior::Report {
        status: IsolatedJobStatus::Error,
        summary: Some("last output"),
        error: Some("boom"),
    });
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    cron.add(isolated_spec(now_ms() + 100)).unwrap();
    settle(1_000).await;

    assert_eq!(host.events(), vec!["Cron (error): last output".to_string()]);
    assert_eq!(host.heartbeats(), 1);

    let jobs = cron.list(true);
    assert_eq!(jobs[0].state.last_status, Some(CronRunStatus::Error));
    assert_eq!(jobs[0].state.last_error.as_deref(), Some("boom"));
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn isolated_runner_failure_records_error_without_events() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::new(IsolatedBehavior::Fail("bridge down"));
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    cron.add(isolated_spec(now_ms() + 100)).unwrap();
    settle(1_000).await;

    assert!(host.events().is_empty());
    assert_eq!(host.heartbeats(), 0);

    let jobs = cron.list(true);
    assert_eq!(jobs[0].state.last_status, Some(CronRunStatus::Error));
    assert_eq!(jobs[0].state.last_error.as_deref(), Some("bridge down"));
    cron.stop();
}

#[tokio::test]
async fn add_rejects_unsupported_session_payload_combinations() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);
    cron.start().unwrap();

    let main_with_agent_turn = CronJobSpec {
        payload: CronPayload::AgentTurn(AgentTurnPayload {
            message: "nope".into(),
            deliver: None,
        }),
        ..main_spec(now_ms() + 1_000, "unused")
    };
    let err = cron.add(main_with_agent_turn).unwrap_err();
    assert!(err.to_string().contains("main cron jobs require"));

    let isolated_with_system_event = CronJobSpec {
        session_target: SessionTarget::Isolated,
        ..main_spec(now_ms() + 1_000, "nope")
    };
    let err = cron.add(isolated_with_system_event).unwrap_err();
    assert!(err.to_string().contains("isolated cron jobs require"));

    assert!(cron.list(true).is_empty());
    assert!(!store_path(&tmp).exists(), "nothing may be persisted");
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn persisted_main_job_with_agent_turn_payload_skips() {
    let tmp = TempDir::new().unwrap();
    let at_ms = now_ms() + 100;
    let path = store_path(&tmp);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(
        &path,
        serde_json::json!({
            "version": 1,
            "jobs": [{
                "id": "job-1",
                "enabled": true,
                "createdAtMs": now_ms(),
                "updatedAtMs": now_ms(),
                "schedule": {"kind": "at", "atMs": at_ms},
                "sessionTarget": "main",
                "wakeMode": "now",
                "payload": {"kind": "agentTurn", "message": "bad"},
                "state": {}
            }]
        })
        .to_string(),
    )
    .unwrap();

    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);
    cron.start().unwrap();
    settle(1_000).await;

    assert!(host.events().is_empty());
    assert_eq!(host.heartbeats(), 0);
    assert_eq!(host.isolated_calls.load(Ordering::SeqCst), 0);

    let jobs = cron.list(true);
    assert_eq!(jobs[0].state.last_status, Some(CronRunStatus::Skipped));
    assert!(
        jobs[0]
            .state
            .last_error
            .as_deref()
            .unwrap()
            .contains("main job requires")
    );
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn blank_system_event_text_skips_without_callbacks() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    cron.add(main_spec(now_ms() + 100, "   ")).unwrap();
    settle(1_000).await;

    assert!(host.events().is_empty());
    assert_eq!(host.heartbeats(), 0);

    let jobs = cron.list(true);
    assert_eq!(jobs[0].state.last_status, Some(CronRunStatus::Skipped));
    assert!(
        jobs[0]
            .state
            .last_error
            .as_deref()
            .unwrap()
            .contains("non-empty")
    );
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn disabled_scheduler_never_fires() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, false, &host);

    cron.start().unwrap();
    cron.add(main_spec(now_ms() + 100, "hello")).unwrap();

    let status = cron.status();
    assert!(!status.enabled);
    assert_eq!(status.jobs, 1);
    assert_eq!(status.next_wake_at_ms, None);

    settle(5_000).await;
    assert!(host.events().is_empty());
    assert_eq!(host.heartbeats(), 0);

    let jobs = cron.list(true);
    assert_eq!(jobs.len(), 1, "jobs stay inspectable while disabled");
    cron.stop();
}

#[tokio::test]
async fn status_reports_next_wake_when_enabled() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    let at_ms = now_ms() + 5_000;
    let spec = CronJobSpec {
        wake_mode: WakeMode::NextHeartbeat,
        ..main_spec(at_ms, "hello")
    };
    cron.add(spec).unwrap();

    let status = cron.status();
    assert!(status.enabled);
    assert_eq!(status.jobs, 1);
    assert_eq!(status.next_wake_at_ms, Some(at_ms));
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn recurring_job_reschedules_after_each_run() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    let spec = CronJobSpec {
        schedule: CronSchedule::Every { every_ms: 1_000 },
        ..main_spec(0, "tick")
    };
    let job = cron.add(spec).unwrap();

    settle(3_500).await;
    cron.stop();

    let fired = host.events().len();
    assert!(fired >= 2, "expected repeated fires, got {fired}");
    assert!(host.events().iter().all(|event| event == "tick"));

    let jobs = cron.list(true);
    let updated = jobs.iter().find(|j| j.id == job.id).unwrap();
    assert!(updated.enabled, "recurring jobs stay enabled");
    assert_eq!(updated.state.last_status, Some(CronRunStatus::Ok));
    assert!(updated.state.next_run_at_ms.is_some());
}

#[tokio::test(start_paused = true)]
async fn stop_cancels_pending_timers() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    cron.add(main_spec(now_ms() + 500, "hello")).unwrap();
    cron.stop();

    settle(5_000).await;
    assert!(host.events().is_empty());
    assert_eq!(host.heartbeats(), 0);

    // Safe to call again with nothing running.
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn remove_cancels_timer_and_persists() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    let job = cron.add(main_spec(now_ms() + 500, "hello")).unwrap();

    assert!(cron.remove(&job.id).unwrap());
    assert!(!cron.remove(&job.id).unwrap());

    settle(2_000).await;
    assert!(host.events().is_empty());
    assert!(cron.list(true).is_empty());
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn set_enabled_false_holds_fire_until_reenabled() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();
    let cron = service(&tmp, true, &host);

    cron.start().unwrap();
    let job = cron.add(main_spec(now_ms() + 500, "hello")).unwrap();

    assert!(cron.set_enabled(&job.id, false).unwrap());
    settle(2_000).await;
    assert!(host.events().is_empty());

    assert!(cron.set_enabled(&job.id, true).unwrap());
    settle(2_000).await;
    assert_eq!(host.events(), vec!["hello".to_string()]);

    assert!(!cron.set_enabled("no-such-job", true).unwrap());
    cron.stop();
}

#[tokio::test(start_paused = true)]
async fn jobs_survive_restart() {
    let tmp = TempDir::new().unwrap();
    let host = RecordingHost::ok();

    let first = service(&tmp, true, &host);
    first.start().unwrap();
    let job = first.add(main_spec(now_ms() + 60_000, "later")).unwrap();
    first.stop();

    let second = service(&tmp, true, &host);
    second.start().unwrap();

    let jobs = second.list(true);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, job.id);
    assert_eq!(jobs[0].state.next_run_at_ms, job.state.next_run_at_ms);
    second.stop();
}
