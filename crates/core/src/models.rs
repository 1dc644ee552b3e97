use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Caller IDs
// ---------------------------------------------------------------------------

/// A phone number in the text form sent to the device.
///
/// Numeric IDs are converted with their decimal representation. No format
/// validation is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallerId(String);

impl CallerId {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<u64> for CallerId {
    fn from(number: u64) -> Self {
        Self(number.to_string())
    }
}

impl From<&str> for CallerId {
    fn from(number: &str) -> Self {
        Self(number.to_string())
    }
}

impl From<String> for CallerId {
    fn from(number: String) -> Self {
        Self(number)
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl Serialize for CallerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for CallerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => CallerId::from(n),
            Raw::Text(s) => CallerId::from(s),
        })
    }
}

/// The numbers dialled when no list is configured.
pub const DEFAULT_CALLER_IDS: [u64; 20] = [
    8009423767, 6058844130, 8666257291, 8003535920, 8888996650, 3132631171, 8558440114,
    8882224227, 8442069035, 8665320423, 8558953393, 8003219637, 8662507212, 8889346489,
    8776478552, 7204563720, 8442068573, 8554197365, 8669145806, 8009460332,
];

/// Ordered caller list. Order is processing order; duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerIdList(Vec<CallerId>);

impl CallerIdList {
    pub fn new(ids: Vec<CallerId>) -> Self {
        Self(ids)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CallerId> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[CallerId] {
        &self.0
    }
}

impl Default for CallerIdList {
    fn default() -> Self {
        Self(DEFAULT_CALLER_IDS.iter().copied().map(CallerId::from).collect())
    }
}

impl<T: Into<CallerId>> FromIterator<T> for CallerIdList {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl<'a> IntoIterator for &'a CallerIdList {
    type Item = &'a CallerId;
    type IntoIter = std::slice::Iter<'a, CallerId>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// ---------------------------------------------------------------------------
// GSM
// ---------------------------------------------------------------------------

/// Action applied to a simulated GSM call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GsmCallAction {
    Call,
    Accept,
    Cancel,
    Hold,
}

impl GsmCallAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            GsmCallAction::Call => "call",
            GsmCallAction::Accept => "accept",
            GsmCallAction::Cancel => "cancel",
            GsmCallAction::Hold => "hold",
        }
    }
}

impl fmt::Display for GsmCallAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Screenshots
// ---------------------------------------------------------------------------

/// Image data captured from the device display.
#[derive(Debug, Clone)]
pub struct ScreenshotArtifact {
    pub bytes: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl ScreenshotArtifact {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Device capabilities requested when the session is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub platform_name: String,
    pub platform_version: String,
    pub device_name: String,
    /// Virtual device (emulator) to boot or attach to.
    pub avd: Option<String>,
    pub automation_name: String,
    /// Further capabilities, passed through unchanged.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            platform_name: "Android".to_string(),
            platform_version: "12".to_string(),
            device_name: "Pixel_4_API_30".to_string(),
            avd: Some("Pixel_4_API_30".to_string()),
            automation_name: "UiAutomator2".to_string(),
            extra: BTreeMap::new(),
        }
    }
}
