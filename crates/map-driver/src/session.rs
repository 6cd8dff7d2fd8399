use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;

use crate::process::DriverProcess;
use crate::types::{ChromeOptions, ElementId, Locator, NewSession};
use crate::wire::WireClient;
use crate::{DriverError, Result};

/// Interval between presence checks in the provided `wait_*` helpers.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

const DRIVER_STARTUP: Duration = Duration::from_secs(20);

// ─── Browser ──────────────────────────────────────────────────────────────

/// One live browser session.
///
/// Every method takes `&self`: the session state lives in the driver, so a
/// handle can be borrowed by a step action and its recovery closure at the
/// same time. Frame switches are session-wide; callers that enter a frame
/// must call [`Browser::leave_frames`] before doing anything else.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;
    async fn refresh(&self) -> Result<()>;
    async fn current_url(&self) -> Result<String>;
    async fn page_source(&self) -> Result<String>;
    async fn execute(&self, script: &str) -> Result<Value>;

    /// Single lookup, no waiting.
    async fn find(&self, locator: &Locator) -> Result<ElementId>;
    async fn click(&self, element: &ElementId) -> Result<()>;
    async fn clear(&self, element: &ElementId) -> Result<()>;
    async fn send_keys(&self, element: &ElementId, text: &str) -> Result<()>;
    async fn text(&self, element: &ElementId) -> Result<String>;

    async fn enter_frame(&self, frame: &ElementId) -> Result<()>;
    /// Return to the top-level document.
    async fn leave_frames(&self) -> Result<()>;

    /// Accept the open alert and return its text; `NoSuchAlert` if none.
    async fn accept_alert(&self) -> Result<String>;

    /// End the session. Called exactly once per opened session.
    async fn quit(&self) -> Result<()>;

    // ── Provided helpers ─────────────────────────────────────────────────

    /// Poll until `locator` matches or `timeout` elapses.
    async fn wait_for(&self, locator: &Locator, timeout: Duration) -> Result<ElementId> {
        let started = Instant::now();
        loop {
            match self.find(locator).await {
                Ok(el) => return Ok(el),
                Err(e) if e.is_ui_timing() => {}
                Err(e) => return Err(e),
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout {
                    what: locator.to_string(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Try each locator in order, waiting up to `timeout_each` for each one.
    /// The first match wins; returns its index in `locators`.
    async fn wait_for_any(
        &self,
        locators: &[Locator],
        timeout_each: Duration,
    ) -> Result<(usize, ElementId)> {
        let mut last = None;
        for (i, locator) in locators.iter().enumerate() {
            match self.wait_for(locator, timeout_each).await {
                Ok(el) => return Ok((i, el)),
                Err(e) if e.is_ui_timing() => last = Some(e),
                Err(e) => return Err(e),
            }
        }
        Err(last.unwrap_or_else(|| DriverError::NoSuchElement("empty locator list".into())))
    }

    /// `wait_for` + `click`.
    async fn click_on(&self, locator: &Locator, timeout: Duration) -> Result<()> {
        let el = self.wait_for(locator, timeout).await?;
        self.click(&el).await
    }

    /// Accept an alert if one shows up within `timeout`. Absence is `Ok(None)`.
    async fn accept_alert_within(&self, timeout: Duration) -> Result<Option<String>> {
        let started = Instant::now();
        loop {
            match self.accept_alert().await {
                Ok(text) => return Ok(Some(text)),
                Err(DriverError::NoSuchAlert) => {}
                Err(e) => return Err(e),
            }
            if started.elapsed() >= timeout {
                return Ok(None);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait for `document.readyState == "complete"`.
    async fn wait_until_loaded(&self, timeout: Duration) -> Result<()> {
        let started = Instant::now();
        loop {
            let state = self.execute("return document.readyState").await?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout {
                    what: "document.readyState == complete".into(),
                    waited_ms: started.elapsed().as_millis(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until the current URL satisfies `accept`; returns that URL.
    async fn wait_for_url(
        &self,
        timeout: Duration,
        accept: for<'u> fn(&'u str) -> bool,
    ) -> Result<String> {
        let started = Instant::now();
        loop {
            let url = self.current_url().await?;
            if accept(&url) {
                return Ok(url);
            }
            if started.elapsed() >= timeout {
                return Err(DriverError::Timeout {
                    what: format!("url condition (last: {url})"),
                    waited_ms: started.elapsed().as_millis(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

// ─── SessionFactory ───────────────────────────────────────────────────────

/// Opens fresh, isolated browser sessions.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn Browser>>;
}

// ─── WebDriverSession ─────────────────────────────────────────────────────

/// A [`Browser`] backed by a real W3C WebDriver session.
pub struct WebDriverSession {
    wire: WireClient,
    id: String,
}

impl WebDriverSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn path(&self, suffix: &str) -> String {
        format!("/session/{}{}", self.id, suffix)
    }

    fn element_path(&self, element: &ElementId, suffix: &str) -> String {
        format!("/session/{}/element/{}{}", self.id, element.0, suffix)
    }
}

fn expect_string(value: Value, command: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(DriverError::Malformed {
            command: command.to_string(),
            detail: format!("expected string, got {other}"),
        }),
    }
}

#[async_trait]
impl Browser for WebDriverSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.wire.post(&self.path("/url"), json!({ "url": url })).await?;
        Ok(())
    }

    async fn refresh(&self) -> Result<()> {
        self.wire.post(&self.path("/refresh"), json!({})).await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        let v = self.wire.get(&self.path("/url")).await?;
        expect_string(v, "url")
    }

    async fn page_source(&self) -> Result<String> {
        let v = self.wire.get(&self.path("/source")).await?;
        expect_string(v, "source")
    }

    async fn execute(&self, script: &str) -> Result<Value> {
        self.wire
            .post(
                &self.path("/execute/sync"),
                json!({ "script": script, "args": [] }),
            )
            .await
    }

    async fn find(&self, locator: &Locator) -> Result<ElementId> {
        let v = self
            .wire
            .post(&self.path("/element"), locator.request_body())
            .await?;
        ElementId::from_reference(&v).ok_or_else(|| DriverError::Malformed {
            command: "element".into(),
            detail: format!("no element reference in {v}"),
        })
    }

    async fn click(&self, element: &ElementId) -> Result<()> {
        self.wire
            .post(&self.element_path(element, "/click"), json!({}))
            .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementId) -> Result<()> {
        self.wire
            .post(&self.element_path(element, "/clear"), json!({}))
            .await?;
        Ok(())
    }

    async fn send_keys(&self, element: &ElementId, text: &str) -> Result<()> {
        self.wire
            .post(&self.element_path(element, "/value"), json!({ "text": text }))
            .await?;
        Ok(())
    }

    async fn text(&self, element: &ElementId) -> Result<String> {
        let v = self.wire.get(&self.element_path(element, "/text")).await?;
        expect_string(v, "text")
    }

    async fn enter_frame(&self, frame: &ElementId) -> Result<()> {
        self.wire
            .post(&self.path("/frame"), json!({ "id": frame.to_reference() }))
            .await?;
        Ok(())
    }

    async fn leave_frames(&self) -> Result<()> {
        self.wire
            .post(&self.path("/frame"), json!({ "id": Value::Null }))
            .await?;
        Ok(())
    }

    async fn accept_alert(&self) -> Result<String> {
        let text = self
            .wire
            .get(&self.path("/alert/text"))
            .await
            .and_then(|v| expect_string(v, "alert/text"))?;
        self.wire.post(&self.path("/alert/accept"), json!({})).await?;
        Ok(text)
    }

    async fn quit(&self) -> Result<()> {
        self.wire.delete(&self.path("")).await?;
        tracing::debug!(session = %self.id, "webdriver session closed");
        Ok(())
    }
}

// ─── ChromeDriver ─────────────────────────────────────────────────────────

/// Owns a chromedriver endpoint and opens Chrome sessions against it.
///
/// ```rust,ignore
/// let driver = ChromeDriver::launch(Path::new("/usr/local/bin/chromedriver"), 9515,
///     ChromeOptions::headless()).await?;
/// let session = driver.open().await?;
/// session.goto("https://example.com").await?;
/// session.quit().await?;
/// driver.shutdown().await;
/// ```
pub struct ChromeDriver {
    wire: WireClient,
    options: ChromeOptions,
    process: Option<DriverProcess>,
}

impl ChromeDriver {
    /// Spawn `executable` on `port` and wait for it to accept sessions.
    pub async fn launch(executable: &Path, port: u16, options: ChromeOptions) -> Result<Self> {
        let wire = WireClient::new(reqwest::Client::new(), format!("http://127.0.0.1:{port}"));
        let mut process = DriverProcess::spawn(executable, port)?;
        process.wait_ready(&wire, DRIVER_STARTUP).await?;
        tracing::info!(driver = %executable.display(), port, "chromedriver started");
        Ok(ChromeDriver {
            wire,
            options,
            process: Some(process),
        })
    }

    /// Use a driver that is already listening at `base_url`.
    pub fn connect(base_url: &str, options: ChromeOptions) -> Self {
        ChromeDriver {
            wire: WireClient::new(reqwest::Client::new(), base_url),
            options,
            process: None,
        }
    }

    /// Stop the spawned driver process, if this handle owns one.
    pub async fn shutdown(self) {
        if let Some(process) = self.process {
            process.shutdown().await;
        }
    }
}

#[async_trait]
impl SessionFactory for ChromeDriver {
    async fn open(&self) -> Result<Box<dyn Browser>> {
        let v = self
            .wire
            .post("/session", self.options.to_capabilities())
            .await?;
        let created: NewSession =
            serde_json::from_value(v).map_err(|e| DriverError::Malformed {
                command: "session".into(),
                detail: e.to_string(),
            })?;
        tracing::debug!(session = %created.session_id, "webdriver session opened");
        Ok(Box::new(WebDriverSession {
            wire: self.wire.clone(),
            id: created.session_id,
        }))
    }
}

// ─── LazyChromeDriver ─────────────────────────────────────────────────────

/// Launches chromedriver on the first [`SessionFactory::open`] call, so runs
/// that never reach the browser never start one.
pub struct LazyChromeDriver {
    executable: PathBuf,
    port: u16,
    options: ChromeOptions,
    driver: OnceCell<ChromeDriver>,
}

impl LazyChromeDriver {
    pub fn new(executable: impl Into<PathBuf>, port: u16, options: ChromeOptions) -> Self {
        LazyChromeDriver {
            executable: executable.into(),
            port,
            options,
            driver: OnceCell::new(),
        }
    }

    pub fn is_started(&self) -> bool {
        self.driver.initialized()
    }

    /// Stop the driver if it was started.
    pub async fn shutdown(self) {
        if let Some(driver) = self.driver.into_inner() {
            driver.shutdown().await;
        }
    }
}

#[async_trait]
impl SessionFactory for LazyChromeDriver {
    async fn open(&self) -> Result<Box<dyn Browser>> {
        let driver = self
            .driver
            .get_or_try_init(|| {
                ChromeDriver::launch(&self.executable, self.port, self.options.clone())
            })
            .await?;
        driver.open().await
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────
