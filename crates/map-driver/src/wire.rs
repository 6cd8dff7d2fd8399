use reqwest::{Client, Method};
use serde_json::Value;

use crate::types::WireError;
use crate::{DriverError, Result};

// ─── WireClient ───────────────────────────────────────────────────────────

/// Sends W3C WebDriver commands to one driver endpoint and unwraps the
/// `{"value": …}` envelope every response carries.
#[derive(Debug, Clone)]
pub(crate) struct WireClient {
    http: Client,
    base_url: String,
}

impl WireClient {
    pub(crate) fn new(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        WireClient { http, base_url }
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn get(&self, path: &str) -> Result<Value> {
        self.send(Method::GET, path, None).await
    }

    pub(crate) async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.send(Method::POST, path, Some(body)).await
    }

    pub(crate) async fn delete(&self, path: &str) -> Result<Value> {
        self.send(Method::DELETE, path, None).await
    }

    async fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        tracing::trace!(%method, %url, "webdriver command");

        let mut req = self.http.request(method, &url);
        if let Some(body) = body {
            req = req.json(&body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;

        let envelope: Value = serde_json::from_str(&text).map_err(|e| DriverError::Malformed {
            command: path.to_string(),
            detail: format!("{e} (HTTP {status})"),
        })?;
        let value = envelope.get("value").cloned().unwrap_or(Value::Null);

        if !status.is_success() || value.get("error").is_some() {
            return Err(into_driver_error(value, path));
        }
        Ok(value)
    }
}

fn into_driver_error(value: Value, path: &str) -> DriverError {
    let wire: WireError = match serde_json::from_value(value) {
        Ok(w) => w,
        Err(e) => {
            return DriverError::Malformed {
                command: path.to_string(),
                detail: format!("unreadable error body: {e}"),
            }
        }
    };
    match wire.error.as_str() {
        "no such element" | "stale element reference" | "element not interactable" => {
            DriverError::NoSuchElement(wire.message)
        }
        "no such alert" => DriverError::NoSuchAlert,
        "unexpected alert open" => DriverError::UnexpectedAlert(wire.message),
        "timeout" | "script timeout" => DriverError::Timeout {
            what: path.to_string(),
            waited_ms: 0,
        },
        _ => DriverError::Protocol {
            code: wire.error,
            message: wire.message,
        },
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
