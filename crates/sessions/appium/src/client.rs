use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use callsim_core::*;
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use crate::protocol::*;

/// Appium session adapter.
///
/// One instance owns one server-side session, created by [`AppiumSession::start`]
/// and released by [`AutomationSession::end`].
pub struct AppiumSession {
    http: reqwest::Client,
    base_url: String,
    session_id: String,
    ended: AtomicBool,
}

impl AppiumSession {
    /// Create a session on the server with the requested capabilities.
    pub async fn start(server: &ServerConfig, caps: &Capabilities) -> Result<Self, SessionError> {
        let http = reqwest::Client::builder()
            .timeout(server.request_timeout())
            .build()
            .map_err(|e| SessionError::ConnectionFailed(format!("HTTP client setup failed: {}", e)))?;
        let base_url = server.base_url().to_string();

        info!(
            url = %base_url,
            device = %caps.device_name,
            platform = %caps.platform_name,
            "Creating Appium session"
        );

        let body = NewSessionRequest::new(caps);
        let resp = send(&http, Method::POST, &format!("{}/session", base_url), Some(&body)).await?;
        let session_id = resp.new_session_id().ok_or_else(|| {
            SessionError::Protocol("New session response has no sessionId".to_string())
        })?;

        info!(session_id = %session_id, "Appium session started");

        Ok(Self {
            http,
            base_url,
            session_id,
            ended: AtomicBool::new(false),
        })
    }

    fn session_url(&self, suffix: &str) -> Result<String, SessionError> {
        if self.ended.load(Ordering::SeqCst) {
            return Err(SessionError::NotStarted);
        }
        Ok(format!("{}/session/{}{}", self.base_url, self.session_id, suffix))
    }

    async fn command<B: Serialize + ?Sized>(
        &self,
        method: Method,
        suffix: &str,
        body: Option<&B>,
    ) -> Result<WireResponse, SessionError> {
        let url = self.session_url(suffix)?;
        send(&self.http, method, &url, body).await
    }
}

/// Send one WebDriver command and unwrap its `value` envelope.
async fn send<B: Serialize + ?Sized>(
    http: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<&B>,
) -> Result<WireResponse, SessionError> {
    debug!(%method, %url, "WebDriver request");

    let mut req = http.request(method, url);
    if let Some(body) = body {
        req = req.json(body);
    }

    let resp = req
        .send()
        .await
        .map_err(|e| SessionError::ConnectionFailed(format!("Request to {} failed: {}", url, e)))?;
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| SessionError::ConnectionFailed(format!("Read error: {}", e)))?;

    let parsed: Option<WireResponse> = if text.trim().is_empty() {
        Some(WireResponse {
            session_id: None,
            value: Value::Null,
        })
    } else {
        serde_json::from_str(&text).ok()
    };

    match parsed {
        Some(wire) => {
            if let Some(err) = wire.error() {
                return Err(SessionError::Remote {
                    error: err.error,
                    message: err.message,
                });
            }
            if !status.is_success() {
                return Err(unexpected_status(status, &text));
            }
            Ok(wire)
        }
        None if status.is_success() => Err(SessionError::Protocol(format!(
            "Response is not a WebDriver payload: {}",
            text
        ))),
        None => Err(unexpected_status(status, &text)),
    }
}

fn unexpected_status(status: StatusCode, body: &str) -> SessionError {
    SessionError::Protocol(format!("HTTP {}: {}", status, body))
}

#[async_trait]
impl AutomationSession for AppiumSession {
    fn session_id(&self) -> Option<String> {
        if self.ended.load(Ordering::SeqCst) {
            None
        } else {
            Some(self.session_id.clone())
        }
    }

    async fn gsm_call(&self, number: &CallerId, action: GsmCallAction) -> Result<(), SessionError> {
        let body = GsmCallRequest {
            phone_number: number.to_string(),
            action,
        };
        self.command(Method::POST, "/appium/device/gsm_call", Some(&body))
            .await?;
        debug!(number = %number, action = %action, "GSM call sent");
        Ok(())
    }

    async fn take_screenshot(&self) -> Result<ScreenshotArtifact, SessionError> {
        let resp = self
            .command::<()>(Method::GET, "/screenshot", None)
            .await?;
        let encoded = resp
            .value
            .as_str()
            .ok_or_else(|| SessionError::Protocol("Screenshot value is not a string".to_string()))?;
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| SessionError::Protocol(format!("Screenshot is not valid base64: {}", e)))?;
        Ok(ScreenshotArtifact::new(bytes))
    }

    async fn lock(&self) -> Result<(), SessionError> {
        self.command(Method::POST, "/appium/device/lock", Some(&serde_json::json!({})))
            .await?;
        Ok(())
    }

    async fn end(&self) -> Result<(), SessionError> {
        if self.ended.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let url = format!("{}/session/{}", self.base_url, self.session_id);
        match send::<()>(&self.http, Method::DELETE, &url, None).await {
            Ok(_) => {
                info!(session_id = %self.session_id, "Appium session ended");
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.session_id, error = %e, "Failed to end Appium session");
                Err(e)
            }
        }
    }
}
