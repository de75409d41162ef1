use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for Starling.
///
/// Each subsystem defines its own error variant. Library callers can match on
/// these to decide recovery strategy; internal code continues to use
/// `anyhow::Result` for ad-hoc context chains.
#[derive(Debug, Error)]
pub enum StarlingError {
    // ── Config ───────────────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Cron ─────────────────────────────────────────────────────────────
    #[error("cron: {0}")]
    Cron(#[from] CronError),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

// ─── Cron errors ─────────────────────────────────────────────────────────────

/// Errors surfaced by the cron scheduling engine.
///
/// The two payload-mismatch variants carry the exact operator-facing wording
/// for the closed-world session-target/payload pairing; `add` rejects with
/// these before anything is persisted.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("main cron jobs require a systemEvent payload")]
    MainPayloadMismatch,

    #[error("isolated cron jobs require an agentTurn payload")]
    IsolatedPayloadMismatch,

    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("cron job not found: {0}")]
    JobNotFound(String),

    #[error("store: {0}")]
    Store(anyhow::Error),
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, StarlingError>;
