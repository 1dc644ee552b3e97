use callsim_core::{Capabilities, GsmCallAction};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Capability names defined by W3C WebDriver itself; everything else needs a
/// vendor prefix.
const W3C_CAPABILITIES: &[&str] = &[
    "acceptInsecureCerts",
    "browserName",
    "browserVersion",
    "pageLoadStrategy",
    "platformName",
    "proxy",
    "setWindowRect",
    "strictFileInteractability",
    "timeouts",
    "unhandledPromptBehavior",
];

const VENDOR_PREFIX: &str = "appium:";

/// Body of `POST /session`.
#[derive(Debug, Clone, Serialize)]
pub struct NewSessionRequest {
    pub capabilities: CapabilitiesRequest,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitiesRequest {
    pub always_match: Map<String, Value>,
    pub first_match: Vec<Map<String, Value>>,
}

impl NewSessionRequest {
    pub fn new(caps: &Capabilities) -> Self {
        Self {
            capabilities: CapabilitiesRequest {
                always_match: w3c_capabilities(caps),
                first_match: vec![Map::new()],
            },
        }
    }
}

/// Prefix a capability name with `appium:` unless it is standard or already
/// namespaced.
fn vendor_key(name: &str) -> String {
    if W3C_CAPABILITIES.contains(&name) || name.contains(':') {
        name.to_string()
    } else {
        format!("{VENDOR_PREFIX}{name}")
    }
}

/// Flatten [`Capabilities`] into a W3C `alwaysMatch` object.
pub fn w3c_capabilities(caps: &Capabilities) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("platformName".to_string(), Value::from(caps.platform_name.clone()));
    map.insert(vendor_key("platformVersion"), Value::from(caps.platform_version.clone()));
    map.insert(vendor_key("deviceName"), Value::from(caps.device_name.clone()));
    if let Some(avd) = &caps.avd {
        map.insert(vendor_key("avd"), Value::from(avd.clone()));
    }
    map.insert(vendor_key("automationName"), Value::from(caps.automation_name.clone()));
    for (name, value) in &caps.extra {
        map.insert(vendor_key(name), value.clone());
    }
    map
}

/// Body of `POST /session/{id}/appium/device/gsm_call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GsmCallRequest {
    pub phone_number: String,
    pub action: GsmCallAction,
}

/// Every WebDriver response wraps its payload in `value`. Legacy (JSONWP)
/// servers also put the session ID at the top level.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireResponse {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub value: Value,
}

/// `value` of a successful `POST /session`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSessionValue {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub capabilities: Value,
}

/// `value` of an error response.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    pub error: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub stacktrace: Option<String>,
}

impl WireResponse {
    /// The error payload, if this response carries one.
    pub fn error(&self) -> Option<WireError> {
        self.value
            .get("error")
            .and_then(|_| serde_json::from_value(self.value.clone()).ok())
    }

    /// Session ID from a new-session response, W3C or legacy shape.
    pub fn new_session_id(&self) -> Option<String> {
        serde_json::from_value::<NewSessionValue>(self.value.clone())
            .ok()
            .and_then(|v| v.session_id)
            .or_else(|| self.session_id.clone())
    }
}
