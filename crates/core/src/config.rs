use crate::models::{Capabilities, CallerIdList};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Errors raised while loading or rendering a run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

/// Where the automation server listens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebDriver endpoint root, e.g. `http://localhost:4723/wd/hub`.
    pub url: String,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4723/wd/hub".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl ServerConfig {
    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// The configured URL, parsed. Only `http` and `https` are accepted.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{} ({})", self.url, e)))?;
        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::InvalidUrl(format!(
                    "{} (unsupported scheme {other})",
                    self.url
                )))
            }
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!("{} (missing host)", self.url)));
        }
        Ok(url)
    }

    /// Point at another server. The timeout is kept from `self`.
    pub fn with_url(&self, url: &str) -> Result<Self, ConfigError> {
        let candidate = Self {
            url: url.to_string(),
            request_timeout_secs: self.request_timeout_secs,
        };
        let parsed = candidate.endpoint()?;
        Ok(Self {
            url: parsed.as_str().trim_end_matches('/').to_string(),
            ..candidate
        })
    }
}

/// Reference screens a screenshot is compared against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceImagesConfig {
    /// What the screen looks like when the call is let through.
    pub allowed: PathBuf,
    /// What the screen looks like when the call is blocked.
    pub blocked: PathBuf,
}

/// Parameters of one call-simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Numbers to dial, in processing order.
    pub caller_ids: CallerIdList,
    /// Pause between starting a call and requesting the screenshot.
    pub ring_delay_ms: u64,
    /// Directory screenshots are written into.
    pub output_dir: PathBuf,
    /// Screenshot file name prefix: `<prefix>-<caller id>.png`.
    pub file_prefix: String,
    /// Create `output_dir` before the run instead of assuming it exists.
    pub create_output_dir: bool,
    /// Lock the screen once before the first call.
    pub lock_device: bool,
    /// Optional CSV manifest of per-number outcomes.
    pub results_file: Option<PathBuf>,
    /// Classify each screenshot as allowed or blocked against these.
    pub reference_images: Option<ReferenceImagesConfig>,
    pub server: ServerConfig,
    pub capabilities: Capabilities,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            caller_ids: CallerIdList::default(),
            ring_delay_ms: 1500,
            output_dir: PathBuf::from("out"),
            file_prefix: "app1".to_string(),
            create_output_dir: false,
            lock_device: false,
            results_file: None,
            reference_images: None,
            server: ServerConfig::default(),
            capabilities: Capabilities::default(),
        }
    }
}

impl RunConfig {
    pub fn ring_delay(&self) -> Duration {
        Duration::from_millis(self.ring_delay_ms)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.server.endpoint()?;
        Ok(config)
    }

    /// Load a configuration file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "Loading run configuration");
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_builtin_run() {
        let config = RunConfig::default();
        assert_eq!(config.ring_delay(), Duration::from_millis(1500));
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.file_prefix, "app1");
        assert_eq!(config.caller_ids.len(), 20);
        assert_eq!(config.server.base_url(), "http://localhost:4723/wd/hub");
        assert!(!config.create_output_dir);
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = RunConfig::from_toml_str(
            r#"
            caller_ids = [8009423767, "6058844130"]
            ring_delay_ms = 250

            [server]
            request_timeout_secs = 5

            [capabilities]
            platform_version = "11"
            "#,
        )
        .unwrap();

        assert_eq!(config.caller_ids.len(), 2);
        assert_eq!(config.caller_ids.as_slice()[1].as_str(), "6058844130");
        assert_eq!(config.ring_delay_ms, 250);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.base_url(), "http://localhost:4723/wd/hub");
        assert_eq!(config.capabilities.platform_version, "11");
        assert_eq!(config.capabilities.automation_name, "UiAutomator2");
        assert_eq!(config.file_prefix, "app1");
    }

    #[test]
    fn test_capability_extras() {
        let config = RunConfig::from_toml_str(
            r#"
            [capabilities.extra]
            disableWindowAnimation = true
            "#,
        )
        .unwrap();
        assert_eq!(
            config.capabilities.extra.get("disableWindowAnimation"),
            Some(&serde_json::Value::Bool(true))
        );
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let config = RunConfig::default();
        let rendered = config.to_toml_string().unwrap();
        assert_eq!(RunConfig::from_toml_str(&rendered).unwrap(), config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "output_dir = \"shots\"\nfile_prefix = \"app2\"").unwrap();

        let config = RunConfig::load(file.path()).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("shots"));
        assert_eq!(config.file_prefix, "app2");
    }

    #[test]
    fn test_load_missing_file() {
        let err = RunConfig::load(Path::new("/nonexistent/callsim.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_server_url_parsing() {
        let base = ServerConfig {
            request_timeout_secs: 5,
            ..Default::default()
        };

        let server = base.with_url("http://10.0.0.5:4724/wd/hub/").unwrap();
        assert_eq!(server.base_url(), "http://10.0.0.5:4724/wd/hub");
        assert_eq!(server.request_timeout_secs, 5);

        let server = base.with_url("http://appium:4723").unwrap();
        assert_eq!(server.base_url(), "http://appium:4723");

        let server = base.with_url("http://[::1]/wd/hub").unwrap();
        assert_eq!(server.base_url(), "http://[::1]/wd/hub");

        let server = base.with_url("https://grid.example.com/wd/hub").unwrap();
        assert_eq!(server.endpoint().unwrap().host_str(), Some("grid.example.com"));

        assert!(base.with_url("localhost:4723").is_err());
        assert!(base.with_url("ftp://appium:4723").is_err());
        assert!(base.with_url("http://appium:notaport").is_err());
        assert!(base.with_url("http://:4723").is_err());
    }

    #[test]
    fn test_invalid_server_url_in_file_rejected() {
        let err = RunConfig::from_toml_str("[server]\nurl = \"not a url\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn test_reference_images_section() {
        let config = RunConfig::from_toml_str(
            r#"
            [reference_images]
            allowed = "reference_images/app1/allowed.png"
            blocked = "reference_images/app1/blocked.png"
            "#,
        )
        .unwrap();
        let refs = config.reference_images.unwrap();
        assert_eq!(refs.allowed, PathBuf::from("reference_images/app1/allowed.png"));
        assert_eq!(refs.blocked, PathBuf::from("reference_images/app1/blocked.png"));
        assert!(RunConfig::default().reference_images.is_none());
    }
}
