use crate::models::*;
use async_trait::async_trait;

// ---------------------------------------------------------------------------
// Automation Session Trait
// ---------------------------------------------------------------------------

/// Errors that can occur while talking to the automation server.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Remote error ({error}): {message}")]
    Remote { error: String, message: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Session not started")]
    NotStarted,
    #[error("Session error: {0}")]
    Other(String),
}

/// A live device session through which call events are injected and the
/// display is captured.
///
/// Methods take `&self` so a single session can be shared between the call
/// loop and detached screenshot tasks.
#[async_trait]
pub trait AutomationSession: Send + Sync {
    /// Server-assigned session ID, once the session exists.
    fn session_id(&self) -> Option<String>;

    /// Inject a simulated GSM call event from `number`.
    async fn gsm_call(&self, number: &CallerId, action: GsmCallAction) -> Result<(), SessionError>;

    /// Capture the current display.
    async fn take_screenshot(&self) -> Result<ScreenshotArtifact, SessionError>;

    /// Lock the device screen.
    async fn lock(&self) -> Result<(), SessionError>;

    /// Release the session on the server. Calling it twice is a no-op.
    async fn end(&self) -> Result<(), SessionError>;
}
