pub mod artifacts;
pub mod compare;
pub mod report;
pub mod runner;

pub use artifacts::{artifact_path, ArtifactWriter};
pub use compare::{Classification, CompareError, ReferenceImages, Verdict};
pub use report::{RunReport, ScreenshotOutcome, WriteStatus};
pub use runner::{CallSimulationRunner, RunError};
