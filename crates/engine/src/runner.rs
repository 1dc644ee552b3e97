use callsim_core::*;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::artifacts::ArtifactWriter;
use crate::compare::{CompareError, ReferenceImages};
use crate::report::RunReport;

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("GSM {action} for {caller_id} failed: {source}")]
    Call {
        caller_id: CallerId,
        action: GsmCallAction,
        #[source]
        source: SessionError,
    },
    #[error("Screenshot for {caller_id} failed: {source}")]
    Capture {
        caller_id: CallerId,
        #[source]
        source: SessionError,
    },
    #[error(transparent)]
    Reference(#[from] CompareError),
    #[error("Device lock failed: {0}")]
    Lock(#[source] SessionError),
    #[error("Screenshot task failed: {0}")]
    Task(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Results manifest error: {0}")]
    Manifest(#[from] csv::Error),
}

/// Drives the call → wait → screenshot → cancel sequence over a caller list.
pub struct CallSimulationRunner {
    session: Arc<dyn AutomationSession>,
    config: RunConfig,
}

impl CallSimulationRunner {
    pub fn new(session: Arc<dyn AutomationSession>, config: RunConfig) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Process every caller ID in order.
    ///
    /// Each screenshot is captured before its call is cancelled; writing it
    /// happens in a detached task. All writes are finished before this
    /// returns, on success and on failure alike. The session is left open for
    /// the caller to release.
    pub async fn run(&self) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        info!(
            run_id = %run_id,
            numbers = self.config.caller_ids.len(),
            delay_ms = self.config.ring_delay_ms,
            output_dir = %self.config.output_dir.display(),
            "Starting call simulation run"
        );

        let references = match &self.config.reference_images {
            Some(refs) => {
                let images = ReferenceImages::load(refs)?;
                info!(
                    allowed = %refs.allowed.display(),
                    blocked = %refs.blocked.display(),
                    "Reference images loaded"
                );
                Some(images)
            }
            None => None,
        };

        if self.config.create_output_dir {
            tokio::fs::create_dir_all(&self.config.output_dir).await?;
        }

        if self.config.lock_device {
            self.session.lock().await.map_err(RunError::Lock)?;
        }

        let mut writer = ArtifactWriter::new(
            self.config.output_dir.clone(),
            self.config.file_prefix.clone(),
        );
        if let Some(images) = references {
            writer = writer.with_references(Arc::new(images));
        }

        let looped = self.call_loop(&mut writer).await;
        if let Err(ref e) = looped {
            warn!(error = %e, pending = writer.pending(), "Run aborted, waiting for in-flight screenshots");
        }
        let drained = writer.drain().await;
        looped?;
        let outcomes = drained?;

        let report = RunReport::new(run_id, started_at, Utc::now(), outcomes);

        if let Some(path) = &self.config.results_file {
            report.write_csv(path)?;
            info!(path = %path.display(), "Results manifest written");
        }

        info!(
            run_id = %run_id,
            written = report.written_count(),
            failed = report.failed_count(),
            "Call simulation run complete"
        );

        Ok(report)
    }

    async fn call_loop(&self, writer: &mut ArtifactWriter) -> Result<(), RunError> {
        let total = self.config.caller_ids.len();
        let delay = self.config.ring_delay();

        for (index, caller_id) in self.config.caller_ids.iter().enumerate() {
            writer.check_failures()?;

            info!(caller_id = %caller_id, "[{}/{}] Simulating incoming call", index + 1, total);
            self.gsm(caller_id, GsmCallAction::Call).await?;

            tokio::time::sleep(delay).await;

            let artifact = self.capture(caller_id).await?;
            writer.spawn(caller_id.clone(), artifact);

            self.gsm(caller_id, GsmCallAction::Cancel).await?;
        }

        writer.check_failures()
    }

    async fn capture(&self, caller_id: &CallerId) -> Result<ScreenshotArtifact, RunError> {
        self.session
            .take_screenshot()
            .await
            .map_err(|source| RunError::Capture {
                caller_id: caller_id.clone(),
                source,
            })
    }

    async fn gsm(&self, caller_id: &CallerId, action: GsmCallAction) -> Result<(), RunError> {
        self.session
            .gsm_call(caller_id, action)
            .await
            .map_err(|source| RunError::Call {
                caller_id: caller_id.clone(),
                action,
                source,
            })
    }
}
