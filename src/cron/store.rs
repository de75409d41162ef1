use super::types::CronJob;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const CRON_STORE_VERSION: u32 = 1;

/// The single persisted document: `{"version": 1, "jobs": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJobsFile {
    pub version: u32,
    #[serde(default)]
    pub jobs: Vec<CronJob>,
}

impl Default for CronJobsFile {
    fn default() -> Self {
        Self {
            version: CRON_STORE_VERSION,
            jobs: Vec::new(),
        }
    }
}

/// Durable, atomic read/write of the job collection.
///
/// The whole document is rewritten on every mutation; writes go to a sibling
/// temp file and are renamed into place, so a failed write never corrupts the
/// previous on-disk copy.
#[derive(Debug, Clone)]
pub struct CronStore {
    path: PathBuf,
}

impl CronStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the document, or return an empty one when the file does not
    /// exist yet. Jobs that violate the payload/target pairing are kept as-is;
    /// the scheduler skips them at fire time.
    pub fn load(&self) -> Result<CronJobsFile> {
        if !self.path.exists() {
            return Ok(CronJobsFile::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cron store: {}", self.path.display()))?;
        let doc: CronJobsFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse cron store: {}", self.path.display()))?;

        if doc.version != CRON_STORE_VERSION {
            tracing::warn!(
                version = doc.version,
                expected = CRON_STORE_VERSION,
                "cron store has unexpected version; loading anyway"
            );
        }

        Ok(doc)
    }

    pub fn save(&self, doc: &CronJobsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create cron directory: {}", parent.display()))?;
        }

        let serialized =
            serde_json::to_vec_pretty(doc).context("Failed to serialize cron jobs")?;

        let tmp_path = self.temp_path();
        fs::write(&tmp_path, serialized)
            .with_context(|| format!("Failed to write cron store: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace cron store: {}", self.path.display()))?;
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| "jobs.json".into(), |n| n.to_os_string());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
