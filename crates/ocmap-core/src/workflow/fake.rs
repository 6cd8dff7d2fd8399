//! Scripted browser double for engine tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use map_driver::{Browser, DriverError, ElementId, Locator, SessionFactory};
use serde_json::{json, Value};

pub(crate) const UPLOAD_FRAME_ID: &str = "upload-frame-1";

const EDITOR_SOURCE: &str = r#"<html><body>
<div class="fFW7wc XKSfm-Sx9Kwc-bN97Pc"><iframe id="upload-frame-1" src="about:blank"></iframe></div>
</body></html>"#;

/// Shared between the factory and every browser it opens.
#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub opened: u32,
    pub quit: u32,
    pub frame_depth: i32,
    pub max_frame_depth: i32,
    pub depth_at_quit: Vec<i32>,
    pub refreshes: u32,
    pub visited: Vec<String>,
    pub clicks: Vec<String>,
    pub typed: Vec<(String, String)>,
    /// `find` calls per locator.
    pub lookups: HashMap<String, u32>,
    missing: HashSet<String>,
    flaky: HashMap<String, u32>,
    alerts: VecDeque<String>,
    broken_sessions: u32,
    failing_refreshes: u32,
}

impl FakeState {
    pub(crate) fn lookups_of(&self, locator: &Locator) -> u32 {
        self.lookups.get(&locator.to_string()).copied().unwrap_or(0)
    }

    pub(crate) fn clicked(&self, locator: &Locator) -> bool {
        self.clicks.contains(&locator.to_string())
    }

    pub(crate) fn typed_into(&self, locator: &Locator) -> Vec<String> {
        let key = locator.to_string();
        self.typed
            .iter()
            .filter(|(el, _)| *el == key)
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub(crate) fn pending_alerts(&self) -> usize {
        self.alerts.len()
    }
}

#[derive(Clone, Default)]
pub(crate) struct FakeSessions {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSessions {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// `locator` never matches.
    pub(crate) fn missing(self, locator: Locator) -> Self {
        self.state().missing.insert(locator.to_string());
        self
    }

    /// `locator` fails its first `failures` lookups.
    pub(crate) fn flaky(self, locator: Locator, failures: u32) -> Self {
        self.state().flaky.insert(locator.to_string(), failures);
        self
    }

    /// The next `n` sessions cannot find anything.
    pub(crate) fn broken_sessions(self, n: u32) -> Self {
        self.state().broken_sessions = n;
        self
    }

    /// The next `n` reloads error out.
    pub(crate) fn failing_refreshes(self, n: u32) -> Self {
        self.state().failing_refreshes = n;
        self
    }

    pub(crate) fn alert(self, text: &str) -> Self {
        self.state().alerts.push_back(text.to_string());
        self
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl SessionFactory for FakeSessions {
    async fn open(&self) -> map_driver::Result<Box<dyn Browser>> {
        let mut st = self.state();
        st.opened += 1;
        let broken = st.broken_sessions > 0;
        if broken {
            st.broken_sessions -= 1;
        }
        Ok(Box::new(FakeBrowser {
            state: self.state.clone(),
            broken,
        }))
    }
}

struct FakeBrowser {
    state: Arc<Mutex<FakeState>>,
    broken: bool,
}

impl FakeBrowser {
    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn goto(&self, url: &str) -> map_driver::Result<()> {
        self.state().visited.push(url.to_string());
        Ok(())
    }

    async fn refresh(&self) -> map_driver::Result<()> {
        let mut st = self.state();
        st.refreshes += 1;
        if st.failing_refreshes > 0 {
            st.failing_refreshes -= 1;
            return Err(DriverError::Protocol {
                code: "unknown error".into(),
                message: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        Ok(())
    }

    async fn current_url(&self) -> map_driver::Result<String> {
        Ok("https://www.google.com/maps/d/edit?mid=fake".into())
    }

    async fn page_source(&self) -> map_driver::Result<String> {
        Ok(EDITOR_SOURCE.into())
    }

    async fn execute(&self, _script: &str) -> map_driver::Result<Value> {
        Ok(json!("complete"))
    }

    async fn find(&self, locator: &Locator) -> map_driver::Result<ElementId> {
        let key = locator.to_string();
        let mut st = self.state();
        *st.lookups.entry(key.clone()).or_default() += 1;
        if self.broken || st.missing.contains(&key) {
            return Err(DriverError::NoSuchElement(key));
        }
        if let Some(left) = st.flaky.get_mut(&key) {
            if *left > 0 {
                *left -= 1;
                return Err(DriverError::NoSuchElement(key));
            }
        }
        Ok(ElementId(key))
    }

    async fn click(&self, element: &ElementId) -> map_driver::Result<()> {
        self.state().clicks.push(element.0.clone());
        Ok(())
    }

    async fn clear(&self, _element: &ElementId) -> map_driver::Result<()> {
        Ok(())
    }

    async fn send_keys(&self, element: &ElementId, text: &str) -> map_driver::Result<()> {
        self.state()
            .typed
            .push((element.0.clone(), text.to_string()));
        Ok(())
    }

    async fn text(&self, _element: &ElementId) -> map_driver::Result<String> {
        Ok("3 items".into())
    }

    async fn enter_frame(&self, _frame: &ElementId) -> map_driver::Result<()> {
        let mut st = self.state();
        st.frame_depth += 1;
        st.max_frame_depth = st.max_frame_depth.max(st.frame_depth);
        Ok(())
    }

    async fn leave_frames(&self) -> map_driver::Result<()> {
        self.state().frame_depth = 0;
        Ok(())
    }

    async fn accept_alert(&self) -> map_driver::Result<String> {
        self.state()
            .alerts
            .pop_front()
            .ok_or(DriverError::NoSuchAlert)
    }

    async fn quit(&self) -> map_driver::Result<()> {
        let mut st = self.state();
        st.quit += 1;
        let depth = st.frame_depth;
        st.depth_at_quit.push(depth);
        Ok(())
    }
}
