use callsim_core::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::compare::{Classification, ReferenceImages};
use crate::report::{ScreenshotOutcome, WriteStatus};
use crate::runner::RunError;

type TaskOutput = (usize, ScreenshotOutcome);

/// `<output_dir>/<prefix>-<caller_id>.png`
pub fn artifact_path(output_dir: &Path, prefix: &str, caller_id: &CallerId) -> PathBuf {
    output_dir.join(format!("{}-{}.png", prefix, caller_id))
}

/// Writes captured screenshots to disk in detached tasks.
///
/// `spawn` returns immediately; the call loop never waits on a write. A write
/// error is logged and recorded in the outcome. When reference images are set,
/// each screenshot is also classified off the loop's path.
pub struct ArtifactWriter {
    output_dir: PathBuf,
    prefix: String,
    references: Option<Arc<ReferenceImages>>,
    tasks: JoinSet<TaskOutput>,
    finished: Vec<(usize, ScreenshotOutcome)>,
    failure: Option<RunError>,
    next_seq: usize,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            prefix: prefix.into(),
            references: None,
            tasks: JoinSet::new(),
            finished: Vec::new(),
            failure: None,
            next_seq: 0,
        }
    }

    pub fn with_references(mut self, references: Arc<ReferenceImages>) -> Self {
        self.references = Some(references);
        self
    }

    /// Number of writes still in flight.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Start writing the screenshot captured for `caller_id`.
    pub fn spawn(&mut self, caller_id: CallerId, artifact: ScreenshotArtifact) -> PathBuf {
        let seq = self.next_seq;
        self.next_seq += 1;

        let path = artifact_path(&self.output_dir, &self.prefix, &caller_id);
        let references = self.references.clone();
        let task_path = path.clone();

        self.tasks.spawn(async move {
            (seq, write_and_classify(caller_id, artifact, task_path, references).await)
        });
        path
    }

    /// Reap finished tasks without waiting; return the first task failure seen.
    pub fn check_failures(&mut self) -> Result<(), RunError> {
        while let Some(joined) = self.tasks.try_join_next() {
            self.collect(joined);
        }
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Wait for every outstanding task. Outcomes come back in spawn order.
    pub async fn drain(mut self) -> Result<Vec<ScreenshotOutcome>, RunError> {
        while let Some(joined) = self.tasks.join_next().await {
            self.collect(joined);
        }
        if let Some(err) = self.failure {
            return Err(err);
        }

        self.finished.sort_by_key(|(seq, _)| *seq);
        Ok(self.finished.into_iter().map(|(_, outcome)| outcome).collect())
    }

    fn collect(&mut self, joined: Result<TaskOutput, JoinError>) {
        let err = match joined {
            Ok((seq, outcome)) => {
                self.finished.push((seq, outcome));
                return;
            }
            Err(join_err) => RunError::Task(join_err.to_string()),
        };
        // Keep the earliest failure; later ones are only logged.
        if self.failure.is_none() {
            self.failure = Some(err);
        } else {
            error!(error = %err, "Additional screenshot task failure");
        }
    }
}

async fn write_and_classify(
    caller_id: CallerId,
    artifact: ScreenshotArtifact,
    path: PathBuf,
    references: Option<Arc<ReferenceImages>>,
) -> ScreenshotOutcome {
    let status = match tokio::fs::write(&path, &artifact.bytes).await {
        Ok(()) => {
            debug!(caller_id = %caller_id, path = %path.display(), bytes = artifact.len(), "Screenshot written");
            WriteStatus::Written {
                bytes: artifact.len(),
            }
        }
        Err(e) => {
            error!(caller_id = %caller_id, path = %path.display(), error = %e, "Failed to write screenshot");
            WriteStatus::WriteFailed {
                reason: e.to_string(),
            }
        }
    };

    let captured_at = artifact.captured_at;
    let classification = match references {
        Some(refs) => classify(&caller_id, refs, artifact.bytes).await,
        None => None,
    };

    ScreenshotOutcome {
        caller_id,
        path,
        status,
        captured_at,
        classification,
    }
}

async fn classify(
    caller_id: &CallerId,
    refs: Arc<ReferenceImages>,
    bytes: Vec<u8>,
) -> Option<Classification> {
    match tokio::task::spawn_blocking(move || refs.classify(&bytes)).await {
        Ok(Ok(classification)) => {
            info!(caller_id = %caller_id, verdict = %classification.verdict, "Screenshot classified");
            Some(classification)
        }
        Ok(Err(e)) => {
            warn!(caller_id = %caller_id, error = %e, "Screenshot could not be classified");
            None
        }
        Err(e) => {
            warn!(caller_id = %caller_id, error = %e, "Classification task failed");
            None
        }
    }
}
