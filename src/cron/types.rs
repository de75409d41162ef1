use crate::error::CronError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CronSchedule {
    /// One-shot: fire once at an absolute epoch time.
    #[serde(rename_all = "camelCase")]
    At { at_ms: i64 },
    /// Repeating: fire every `every_ms` milliseconds.
    #[serde(rename_all = "camelCase")]
    Every { every_ms: i64 },
}

/// Which conversation context a firing consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SessionTarget {
    Main,
    Isolated,
}

/// How urgently a fired job's result should surface to the reply loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum WakeMode {
    Now,
    NextHeartbeat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEventPayload {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentTurnPayload {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deliver: Option<bool>,
}

/// What a firing does. Paired with [`SessionTarget`] as a closed world:
/// `main` jobs carry `systemEvent`, `isolated` jobs carry `agentTurn`.
/// Both halves stay independently representable so jobs persisted by older
/// or buggy writers still load and can be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum CronPayload {
    #[serde(rename = "systemEvent")]
    SystemEvent(SystemEventPayload),
    #[serde(rename = "agentTurn")]
    AgentTurn(AgentTurnPayload),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CronRunStatus {
    Ok,
    Error,
    Skipped,
}

/// Mutable run state, owned by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CronJobState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_status: Option<CronRunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_summary: Option<String>,
}

/// An autonomous task definition plus its run state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub enabled: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
    pub schedule: CronSchedule,
    pub session_target: SessionTarget,
    pub wake_mode: WakeMode,
    pub payload: CronPayload,
    #[serde(default)]
    pub state: CronJobState,
}

/// Input to `add`: a job definition without identity or run state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CronJobSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub session_target: SessionTarget,
    pub wake_mode: WakeMode,
    pub payload: CronPayload,
}

fn default_enabled() -> bool {
    true
}

impl CronJobSpec {
    /// Enforce the session-target/payload pairing and schedule sanity.
    /// Rejections happen here, before anything is persisted.
    pub fn validate(&self) -> Result<(), CronError> {
        match (self.session_target, &self.payload) {
            (SessionTarget::Main, CronPayload::SystemEvent(_))
            | (SessionTarget::Isolated, CronPayload::AgentTurn(_)) => {}
            (SessionTarget::Main, CronPayload::AgentTurn(_)) => {
                return Err(CronError::MainPayloadMismatch);
            }
            (SessionTarget::Isolated, CronPayload::SystemEvent(_)) => {
                return Err(CronError::IsolatedPayloadMismatch);
            }
        }

        if let CronSchedule::Every { every_ms } = self.schedule {
            if every_ms <= 0 {
                return Err(CronError::InvalidSchedule(
                    "everyMs must be positive".into(),
                ));
            }
        }

        Ok(())
    }

    pub fn into_job(self, now_ms: i64) -> Result<CronJob, CronError> {
        self.validate()?;
        let next_run_at_ms = initial_next_run(&self.schedule, now_ms);
        Ok(CronJob {
            id: Uuid::new_v4().to_string(),
            name: self.name,
            enabled: self.enabled,
            created_at_ms: now_ms,
            updated_at_ms: now_ms,
            schedule: self.schedule,
            session_target: self.session_target,
            wake_mode: self.wake_mode,
            payload: self.payload,
            state: CronJobState {
                next_run_at_ms: Some(next_run_at_ms),
                ..CronJobState::default()
            },
        })
    }
}

/// First due time for a schedule created (or first seen) at `now_ms`.
pub fn initial_next_run(schedule: &CronSchedule, now_ms: i64) -> i64 {
    match *schedule {
        CronSchedule::At { at_ms } => at_ms,
        CronSchedule::Every { every_ms } => now_ms.saturating_add(every_ms.max(1)),
    }
}

/// Why a firing was skipped instead of executed. Recorded verbatim in
/// `state.lastError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SkipReason {
    #[error("main job requires a systemEvent payload")]
    MainPayloadKind,
    #[error("isolated job requires an agentTurn payload")]
    IsolatedPayloadKind,
    #[error("systemEvent text must be non-empty")]
    EmptySystemEventText,
}

/// Fire-time re-validation. Jobs loaded from disk may predate the pairing
/// invariant; they skip instead of crashing the scheduler.
pub fn fire_check(job: &CronJob) -> Result<(), SkipReason> {
    match (job.session_target, &job.payload) {
        (SessionTarget::Main, CronPayload::SystemEvent(payload)) => {
            if payload.text.trim().is_empty() {
                Err(SkipReason::EmptySystemEventText)
            } else {
                Ok(())
            }
        }
        (SessionTarget::Main, CronPayload::AgentTurn(_)) => Err(SkipReason::MainPayloadKind),
        (SessionTarget::Isolated, CronPayload::AgentTurn(_)) => Ok(()),
        (SessionTarget::Isolated, CronPayload::SystemEvent(_)) => {
            Err(SkipReason::IsolatedPayloadKind)
        }
    }
}
