use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// JSON key the W3C protocol uses to tag a web element reference.
pub const ELEMENT_KEY: &str = "element-6066-11e4-a5e6-4a3f2d5a1e6a";

// ─── Locator ──────────────────────────────────────────────────────────────

/// How to find one element on the page.
///
/// `Id` and `Name` have no native W3C strategy, so they are rewritten into
/// attribute CSS selectors before being sent to the driver.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    Id(String),
    Name(String),
    Css(String),
    XPath(String),
}

impl Locator {
    pub fn id(value: impl Into<String>) -> Self {
        Locator::Id(value.into())
    }

    pub fn name(value: impl Into<String>) -> Self {
        Locator::Name(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        Locator::Css(value.into())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        Locator::XPath(value.into())
    }

    /// Match any element whose full text equals `text`.
    pub fn text(text: &str) -> Self {
        Locator::XPath(format!("//*[text()='{text}']"))
    }

    /// The `(using, value)` pair for a `POST /element` request body.
    pub fn to_w3c(&self) -> (&'static str, String) {
        match self {
            Locator::Id(v) => ("css selector", format!("[id=\"{}\"]", escape_css(v))),
            Locator::Name(v) => ("css selector", format!("[name=\"{}\"]", escape_css(v))),
            Locator::Css(v) => ("css selector", v.clone()),
            Locator::XPath(v) => ("xpath", v.clone()),
        }
    }

    pub(crate) fn request_body(&self) -> Value {
        let (using, value) = self.to_w3c();
        json!({ "using": using, "value": value })
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locator::Id(v) => write!(f, "id={v}"),
            Locator::Name(v) => write!(f, "name={v}"),
            Locator::Css(v) => write!(f, "css={v}"),
            Locator::XPath(v) => write!(f, "xpath={v}"),
        }
    }
}

fn escape_css(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

// ─── ElementId ────────────────────────────────────────────────────────────

/// Opaque handle to an element inside one browser session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementId(pub String);

impl ElementId {
    pub(crate) fn to_reference(&self) -> Value {
        json!({ ELEMENT_KEY: self.0 })
    }

    pub(crate) fn from_reference(value: &Value) -> Option<Self> {
        value
            .get(ELEMENT_KEY)
            .and_then(Value::as_str)
            .map(|s| ElementId(s.to_string()))
    }
}

// ─── ChromeOptions ────────────────────────────────────────────────────────

/// Capabilities sent with `POST /session`.
#[derive(Debug, Clone)]
pub struct ChromeOptions {
    pub args: Vec<String>,
    /// Custom Chrome binary (default: whatever chromedriver discovers)
    pub binary: Option<String>,
    pub page_load_timeout: Duration,
}

impl ChromeOptions {
    /// Options for an unattended container run.
    pub fn headless() -> Self {
        let mut opts = Self::windowed();
        opts.args.insert(0, "--headless=new".into());
        opts
    }

    pub fn windowed() -> Self {
        let args = [
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-gpu",
            "--disable-software-rasterizer",
            "--window-size=1920,1080",
            "--start-maximized",
            "--disable-extensions",
            "--disable-plugins",
            "--disable-images",
            "--disable-web-security",
            "--disable-features=VizDisplayCompositor",
            "--memory-pressure-off",
            "--log-level=3",
            "--silent",
        ];
        ChromeOptions {
            args: args.iter().map(|a| a.to_string()).collect(),
            binary: None,
            page_load_timeout: Duration::from_secs(30),
        }
    }

    pub(crate) fn to_capabilities(&self) -> Value {
        let mut chrome = json!({ "args": self.args });
        if let Some(binary) = &self.binary {
            chrome["binary"] = json!(binary);
        }
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": chrome,
                    "timeouts": {
                        "pageLoad": self.page_load_timeout.as_millis() as u64,
                        "implicit": 0,
                    },
                }
            }
        })
    }
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self::headless()
    }
}

// ─── Wire payloads ────────────────────────────────────────────────────────

/// Error body returned by the driver for any failed command.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WireError {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

/// Result of `POST /session`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub session_id: String,
    #[serde(default)]
    pub capabilities: Value,
}

/// Result of `GET /status`.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub message: String,
}

// ─── Tests ────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_and_name_become_attribute_selectors() {
        assert_eq!(
            Locator::id("identifierNext").to_w3c(),
            ("css selector", "[id=\"identifierNext\"]".to_string())
        );
        assert_eq!(
            Locator::name("Passwd").to_w3c(),
            ("css selector", "[name=\"Passwd\"]".to_string())
        );
    }

    #[test]
    fn ids_with_colons_survive_escaping() {
        let (_, value) = Locator::id(":2w.contentEl").to_w3c();
        assert_eq!(value, "[id=\":2w.contentEl\"]");
    }

    #[test]
    fn text_locator_is_exact_xpath() {
        assert_eq!(
            Locator::text("(未命名的圖層)").to_w3c(),
            ("xpath", "//*[text()='(未命名的圖層)']".to_string())
        );
    }

    #[test]
    fn element_reference_roundtrip() {
        let el = ElementId("abc".into());
        let value = el.to_reference();
        assert_eq!(value[ELEMENT_KEY], "abc");
        assert_eq!(ElementId::from_reference(&value), Some(el));
        assert_eq!(ElementId::from_reference(&json!({"other": 1})), None);
    }

    #[test]
    fn headless_capabilities_carry_args_and_timeouts() {
        let caps = ChromeOptions::headless().to_capabilities();
        let always = &caps["capabilities"]["alwaysMatch"];
        assert_eq!(always["browserName"], "chrome");
        let args = always["goog:chromeOptions"]["args"].as_array().unwrap();
        assert_eq!(args[0], "--headless=new");
        assert!(args.iter().any(|a| a == "--no-sandbox"));
        assert_eq!(always["timeouts"]["pageLoad"], 30_000);
        assert!(always["goog:chromeOptions"].get("binary").is_none());
    }

    #[test]
    fn windowed_has_no_headless_flag() {
        let opts = ChromeOptions::windowed();
        assert!(!opts.args.iter().any(|a| a.starts_with("--headless")));
    }
}
