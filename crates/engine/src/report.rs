use callsim_core::CallerId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::compare::{Classification, Verdict};

/// Result of writing one screenshot to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteStatus {
    Written { bytes: usize },
    WriteFailed { reason: String },
}

impl WriteStatus {
    pub fn is_written(&self) -> bool {
        matches!(self, WriteStatus::Written { .. })
    }
}

/// What happened to the screenshot for one caller ID.
#[derive(Debug, Clone)]
pub struct ScreenshotOutcome {
    pub caller_id: CallerId,
    pub path: PathBuf,
    pub status: WriteStatus,
    pub captured_at: DateTime<Utc>,
    /// Present when reference images are configured and the screenshot decoded.
    pub classification: Option<Classification>,
}

/// Summary of a completed run, in caller-list order.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<ScreenshotOutcome>,
}

#[derive(Serialize)]
struct ManifestRecord<'a> {
    caller_id: &'a str,
    path: String,
    status: &'static str,
    detail: String,
    verdict: Option<Verdict>,
    allowed_diff: Option<u64>,
    blocked_diff: Option<u64>,
}

impl RunReport {
    pub fn new(
        run_id: Uuid,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        outcomes: Vec<ScreenshotOutcome>,
    ) -> Self {
        Self {
            run_id,
            started_at,
            finished_at,
            outcomes,
        }
    }

    pub fn written_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_written()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.written_count()
    }

    pub fn verdict_count(&self, verdict: Verdict) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.classification.map(|c| c.verdict) == Some(verdict))
            .count()
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    /// Write the per-number manifest as CSV, replacing any previous file.
    pub fn write_csv(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        for outcome in &self.outcomes {
            let (status, detail) = match &outcome.status {
                WriteStatus::Written { bytes } => ("written", bytes.to_string()),
                WriteStatus::WriteFailed { reason } => ("write_failed", reason.clone()),
            };
            writer.serialize(ManifestRecord {
                caller_id: outcome.caller_id.as_str(),
                path: outcome.path.display().to_string(),
                status,
                detail,
                verdict: outcome.classification.map(|c| c.verdict),
                allowed_diff: outcome.classification.map(|c| c.allowed_diff),
                blocked_diff: outcome.classification.map(|c| c.blocked_diff),
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}
