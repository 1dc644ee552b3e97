use async_trait::async_trait;
use callsim_core::*;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// PNG file signature, standing in for real image data.
const PLACEHOLDER_PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Configuration for the simulated session (dry runs and tests).
#[derive(Debug, Clone)]
pub struct SimulatedSessionConfig {
    /// Bytes returned by every screenshot.
    pub screenshot: Vec<u8>,
    /// Time a screenshot takes to "capture".
    pub screenshot_latency: Duration,
    /// Reject any GSM call for this number.
    pub fail_call_for: Option<CallerId>,
    /// Reject every screenshot request.
    pub fail_screenshots: bool,
}

impl Default for SimulatedSessionConfig {
    fn default() -> Self {
        Self {
            screenshot: PLACEHOLDER_PNG.to_vec(),
            screenshot_latency: Duration::ZERO,
            fail_call_for: None,
            fail_screenshots: false,
        }
    }
}

/// An operation the simulated session received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOp {
    GsmCall {
        number: CallerId,
        action: GsmCallAction,
    },
    Screenshot,
    Lock,
    End,
}

/// A recorded operation and when it arrived.
#[derive(Debug, Clone)]
pub struct SessionCall {
    pub op: SessionOp,
    pub at: Instant,
}

/// An in-memory automation session.
///
/// Records every operation in arrival order so callers can assert on the
/// exact sequence a run produced.
pub struct SimulatedSession {
    config: SimulatedSessionConfig,
    id: String,
    calls: Mutex<Vec<SessionCall>>,
    ended: Mutex<bool>,
}

impl SimulatedSession {
    pub fn new(config: SimulatedSessionConfig) -> Self {
        Self {
            config,
            id: "simulated".to_string(),
            calls: Mutex::new(Vec::new()),
            ended: Mutex::new(false),
        }
    }

    /// Snapshot of all recorded operations.
    pub async fn calls(&self) -> Vec<SessionCall> {
        self.calls.lock().await.clone()
    }

    /// Recorded operations without timestamps.
    pub async fn ops(&self) -> Vec<SessionOp> {
        self.calls.lock().await.iter().map(|c| c.op.clone()).collect()
    }

    pub async fn is_ended(&self) -> bool {
        *self.ended.lock().await
    }

    async fn record(&self, op: SessionOp) {
        debug!(?op, "Simulated session operation");
        self.calls.lock().await.push(SessionCall {
            op,
            at: Instant::now(),
        });
    }

    async fn ensure_active(&self) -> Result<(), SessionError> {
        if *self.ended.lock().await {
            return Err(SessionError::NotStarted);
        }
        Ok(())
    }
}

impl Default for SimulatedSession {
    fn default() -> Self {
        Self::new(SimulatedSessionConfig::default())
    }
}

#[async_trait]
impl AutomationSession for SimulatedSession {
    fn session_id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    async fn gsm_call(&self, number: &CallerId, action: GsmCallAction) -> Result<(), SessionError> {
        self.ensure_active().await?;
        self.record(SessionOp::GsmCall {
            number: number.clone(),
            action,
        })
        .await;

        if self.config.fail_call_for.as_ref() == Some(number) {
            return Err(SessionError::Remote {
                error: "unknown error".to_string(),
                message: format!("Simulated failure for {number}"),
            });
        }
        Ok(())
    }

    async fn take_screenshot(&self) -> Result<ScreenshotArtifact, SessionError> {
        self.ensure_active().await?;
        self.record(SessionOp::Screenshot).await;

        if !self.config.screenshot_latency.is_zero() {
            tokio::time::sleep(self.config.screenshot_latency).await;
        }

        if self.config.fail_screenshots {
            return Err(SessionError::Remote {
                error: "unable to capture screen".to_string(),
                message: "Simulated screenshot failure".to_string(),
            });
        }
        Ok(ScreenshotArtifact::new(self.config.screenshot.clone()))
    }

    async fn lock(&self) -> Result<(), SessionError> {
        self.ensure_active().await?;
        self.record(SessionOp::Lock).await;
        Ok(())
    }

    async fn end(&self) -> Result<(), SessionError> {
        let mut ended = self.ended.lock().await;
        if !*ended {
            *ended = true;
            drop(ended);
            self.record(SessionOp::End).await;
        }
        Ok(())
    }
}
