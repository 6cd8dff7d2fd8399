//! Layer-replacement state machine.
//!
//! One [`LayerUpdateJob`] per operating unit drives one browser session
//! through sign-in, edit mode, layer delete/rename, file import, column
//! binding, styling and a read-back. Each transition is a [`StepSpec`] with
//! its own retry budget and severity. Jobs run strictly one after another,
//! and every session opened is quit before the next job starts.

pub mod job;
pub mod selectors;
pub mod state;
pub mod steps;

#[cfg(test)]
pub(crate) mod fake;

use std::sync::Arc;
use std::time::Duration;

use map_driver::{Browser, SessionFactory};
use serde::Serialize;

use crate::error::{OcmapError, Result};
use crate::retry::{RetryPolicy, Sleeper};

pub use job::{layer_name, Credential, LayerUpdateJob};
pub use state::WorkflowState;
pub use steps::{Recovery, Severity, StepSpec};

// ---------------------------------------------------------------------------
// Waits
// ---------------------------------------------------------------------------

/// Upper bounds for element-presence polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waits {
    /// Input fields and the upload control.
    pub field: Duration,
    /// Buttons, links and menu entries.
    pub control: Duration,
    /// Document readiness and the post-login redirect.
    pub page: Duration,
    /// Confirmation dialog after a reload.
    pub alert: Duration,
}

impl Default for Waits {
    fn default() -> Self {
        Self {
            field: Duration::from_secs(10),
            control: Duration::from_secs(5),
            page: Duration::from_secs(15),
            alert: Duration::from_secs(10),
        }
    }
}

impl Waits {
    /// Single lookup, no polling.
    pub const fn none() -> Self {
        Self {
            field: Duration::ZERO,
            control: Duration::ZERO,
            page: Duration::ZERO,
            alert: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    pub oc: String,
    /// `Verified` or `Failed`.
    pub state: WorkflowState,
    /// Transition that exhausted its budget, for failed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<WorkflowState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Best-effort transitions that gave up without failing the job.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<WorkflowState>,
    /// Text read back from the layer's item list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<String>,
}

impl JobOutcome {
    fn new(oc: &str) -> Self {
        Self {
            oc: oc.to_string(),
            state: WorkflowState::Init,
            failed_at: None,
            reason: None,
            degraded: Vec::new(),
            items: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == WorkflowState::Verified
    }
}

/// Aggregate of one sequential run over several jobs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StageReport {
    pub outcomes: Vec<JobOutcome>,
}

impl StageReport {
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.oc.as_str())
            .collect()
    }

    pub fn failed(&self) -> Vec<&JobOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded()).collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(JobOutcome::succeeded)
    }

    /// Plain-text body for the failure notification.
    pub fn summary(&self) -> String {
        let mut out = String::from("Failed:\n");
        for o in self.failed() {
            let at = o.failed_at.map(|s| s.as_str()).unwrap_or("unknown");
            let reason = o.reason.as_deref().unwrap_or("");
            out.push_str(&format!("  {} at {at}: {reason}\n", o.oc));
        }
        out.push_str("Succeeded:\n");
        for oc in self.succeeded() {
            out.push_str(&format!("  {oc}\n"));
        }
        out
    }
}

// ---------------------------------------------------------------------------
// LayerWorkflowEngine
// ---------------------------------------------------------------------------

pub struct LayerWorkflowEngine<'a> {
    sessions: &'a dyn SessionFactory,
    retry: RetryPolicy,
    waits: Waits,
}

impl<'a> LayerWorkflowEngine<'a> {
    pub fn new(sessions: &'a dyn SessionFactory, sleeper: Arc<dyn Sleeper>, waits: Waits) -> Self {
        Self {
            sessions,
            retry: RetryPolicy::new(sleeper),
            waits,
        }
    }

    /// Run every job in order; one job's failure never stops the others.
    pub async fn run_all(&self, jobs: &[LayerUpdateJob]) -> StageReport {
        let mut report = StageReport::default();
        for job in jobs {
            let outcome = self.run_job(job).await;
            if outcome.succeeded() {
                tracing::info!(oc = %job.oc_id, layer = %job.layer_name, "layer updated");
            } else {
                tracing::error!(
                    oc = %job.oc_id,
                    at = ?outcome.failed_at,
                    reason = outcome.reason.as_deref().unwrap_or(""),
                    "layer update failed"
                );
            }
            report.outcomes.push(outcome);
        }
        report
    }

    /// Drive one job to `Verified` or `Failed`. The session opened for it is
    /// quit exactly once, whichever state the job ends in.
    pub async fn run_job(&self, job: &LayerUpdateJob) -> JobOutcome {
        let mut outcome = JobOutcome::new(&job.oc_id);
        tracing::info!(oc = %job.oc_id, layer = %job.layer_name, "starting layer update");

        let lease = match self.sign_in(job).await {
            Ok(lease) => lease,
            Err(reason) => {
                fail(&mut outcome, steps::LOGIN.target, reason);
                return outcome;
            }
        };
        transition(&mut outcome, steps::LOGIN.target);

        self.drive(lease.browser(), job, &mut outcome).await;
        lease.release().await;
        outcome
    }

    async fn sign_in(&self, job: &LayerUpdateJob) -> std::result::Result<SessionLease, String> {
        self.retry
            .execute(&steps::LOGIN.budget, move || async move {
                let session = self.sessions.open().await.map_err(OcmapError::from)?;
                let lease = SessionLease::new(&job.oc_id, session);
                let signed_in = self.login(lease.browser(), job).await;
                match signed_in {
                    Ok(()) => Ok::<_, OcmapError>(lease),
                    Err(e) => {
                        lease.release().await;
                        Err(e)
                    }
                }
            })
            .await
            .map_err(|e| e.to_string())
    }

    async fn drive(&self, b: &dyn Browser, job: &LayerUpdateJob, outcome: &mut JobOutcome) {
        for step in steps::EDITOR_STEPS {
            if step.target == WorkflowState::FileImported && !job.artifact_path.is_file() {
                let missing = OcmapError::ArtifactMissing {
                    oc: job.oc_id.clone(),
                    path: job.artifact_path.display().to_string(),
                };
                fail(outcome, step.target, missing.to_string());
                return;
            }

            match self.run_step(b, job, &step, outcome).await {
                Ok(()) => transition(outcome, step.target),
                Err(reason) if step.severity == Severity::BestEffort => {
                    tracing::warn!(oc = %job.oc_id, step = %step.target, reason = %reason, "best-effort step gave up, continuing");
                    outcome.degraded.push(step.target);
                    transition(outcome, step.target);
                }
                Err(reason) => {
                    fail(outcome, step.target, reason);
                    return;
                }
            }
        }
    }

    async fn run_step(
        &self,
        b: &dyn Browser,
        job: &LayerUpdateJob,
        step: &StepSpec,
        outcome: &mut JobOutcome,
    ) -> std::result::Result<(), String> {
        if !step.settle.is_zero() {
            self.pause(step.settle).await;
        }

        let attempt = move || async move {
            self.reset(b, step.prepare).await?;
            self.perform(b, job, step.target).await
        };
        let result = match step.recovery {
            Recovery::None => self.retry.execute(&step.budget, attempt).await,
            Recovery::ReloadAndDismiss => {
                self.retry
                    .execute_with_recovery(&step.budget, attempt, move || {
                        self.reset(b, Recovery::ReloadAndDismiss)
                    })
                    .await
            }
        };
        match result {
            Ok(items) => {
                if items.is_some() {
                    outcome.items = items;
                }
                Ok(())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    /// One attempt at the transition into `target`. Returns the layer's item
    /// text for the read-back step.
    async fn perform(
        &self,
        b: &dyn Browser,
        job: &LayerUpdateJob,
        target: WorkflowState,
    ) -> Result<Option<String>> {
        match target {
            WorkflowState::EditMode => self.enter_edit_mode(b).await?,
            WorkflowState::LayerDeleted => self.delete_layer(b).await?,
            WorkflowState::LayerRenamed => self.rename_layer(b, &job.layer_name).await?,
            WorkflowState::FileImported => self.import_file(b, job).await?,
            WorkflowState::ColumnsConfigured => self.bind_columns(b).await?,
            WorkflowState::ImportFinalized => self.finalize_import(b).await?,
            WorkflowState::Styled => self.style_layer(b).await?,
            WorkflowState::Verified => return self.read_items(b).await.map(Some),
            other => {
                return Err(OcmapError::InvalidConfig(format!(
                    "no editor action for state {other}"
                )))
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Step actions
    // -----------------------------------------------------------------------

    async fn login(&self, b: &dyn Browser, job: &LayerUpdateJob) -> Result<()> {
        let w = self.waits;
        b.goto(&job.login_url).await?;
        b.wait_until_loaded(w.page).await?;
        self.pause_secs(2).await;

        let (_, field) = b.wait_for_any(&selectors::identity_fields(), w.field).await?;
        b.clear(&field).await?;
        b.send_keys(&field, &job.credential.identity).await?;
        let (_, next) = b.wait_for_any(&selectors::identity_next(), w.control).await?;
        b.click(&next).await?;
        self.pause_secs(3).await;

        let (_, field) = b.wait_for_any(&selectors::secret_fields(), w.field).await?;
        b.clear(&field).await?;
        b.send_keys(&field, &job.credential.secret).await?;
        self.pause_secs(2).await;
        let (_, next) = b.wait_for_any(&selectors::secret_next(), w.control).await?;
        b.click(&next).await?;
        self.pause_secs(5).await;

        match b.wait_for_url(w.page, selectors::signed_in).await {
            Ok(url) => tracing::debug!(oc = %job.oc_id, url = %url, "signed in"),
            Err(e) => {
                tracing::warn!(oc = %job.oc_id, error = %e, "sign-in redirect not confirmed, continuing")
            }
        }
        Ok(())
    }

    async fn enter_edit_mode(&self, b: &dyn Browser) -> Result<()> {
        let (i, control) = b
            .wait_for_any(&selectors::edit_controls(), self.waits.control)
            .await?;
        b.click(&control).await?;
        tracing::debug!(locator = i, "edit mode entered");
        Ok(())
    }

    async fn delete_layer(&self, b: &dyn Browser) -> Result<()> {
        let w = self.waits.control;
        b.click_on(&selectors::layer_status(), w).await?;
        self.pause_secs(1).await;
        b.click_on(&selectors::layer_menu(), w).await?;
        self.pause_secs(1).await;
        b.click_on(&selectors::delete_layer_entry(), w).await?;
        self.pause_secs(2).await;
        b.click_on(&selectors::confirm_delete(), w).await?;
        Ok(())
    }

    async fn rename_layer(&self, b: &dyn Browser, name: &str) -> Result<()> {
        let w = self.waits;
        b.click_on(&selectors::unnamed_layer(), w.control).await?;
        self.pause_secs(2).await;
        let input = b.wait_for(&selectors::rename_input(), w.field).await?;
        b.clear(&input).await?;
        b.send_keys(&input, name).await?;
        self.pause_secs(1).await;
        b.click_on(&selectors::save_name(), w.control).await?;
        Ok(())
    }

    async fn import_file(&self, b: &dyn Browser, job: &LayerUpdateJob) -> Result<()> {
        let w = self.waits;
        b.click_on(&selectors::import_link(), w.control).await?;
        self.pause_secs(5).await;

        let source = b.page_source().await?;
        let frame_id = selectors::upload_frame_id(&source).ok_or_else(|| {
            map_driver::DriverError::NoSuchElement("upload dialog iframe".into())
        })?;
        let frame = b.wait_for(&selectors::upload_frame(&frame_id), w.field).await?;

        b.enter_frame(&frame).await?;
        let path = job.artifact_path.display().to_string();
        let uploaded = async {
            let input = b.wait_for(&selectors::file_input(), w.field).await?;
            b.send_keys(&input, &path).await
        }
        .await;
        let restored = b.leave_frames().await;
        uploaded?;
        restored?;
        tracing::debug!(oc = %job.oc_id, frame = %frame_id, "artifact handed to upload dialog");
        Ok(())
    }

    async fn bind_columns(&self, b: &dyn Browser) -> Result<()> {
        b.leave_frames().await?;
        let mut first = true;
        for locator in selectors::coordinate_columns() {
            if !first {
                self.pause_secs(1).await;
            }
            first = false;
            b.click_on(&locator, self.waits.control).await?;
        }
        Ok(())
    }

    async fn finalize_import(&self, b: &dyn Browser) -> Result<()> {
        let w = self.waits.control;
        b.click_on(&selectors::import_continue(), w).await?;
        self.pause_secs(3).await;
        b.click_on(&selectors::title_column(), w).await?;
        self.pause_secs(3).await;
        b.click_on(&selectors::import_done(), w).await?;
        Ok(())
    }

    async fn style_layer(&self, b: &dyn Browser) -> Result<()> {
        let w = self.waits.control;
        b.click_on(&selectors::style_link(), w).await?;
        b.click_on(&selectors::style_by_value(), w).await?;
        self.pause_secs(3).await;
        let (i, column) = b
            .wait_for_any(&selectors::style_priority_column(), w)
            .await?;
        b.click(&column).await?;
        if i > 0 {
            tracing::debug!("priority column is numeric-typed");
        }
        self.pause_secs(3).await;
        b.click_on(&selectors::style_close(), w).await?;
        Ok(())
    }

    async fn read_items(&self, b: &dyn Browser) -> Result<String> {
        let container = b.wait_for(&selectors::layer_items(), self.waits.control).await?;
        Ok(b.text(&container).await?)
    }

    async fn reset(&self, b: &dyn Browser, how: Recovery) -> Result<()> {
        match how {
            Recovery::None => Ok(()),
            Recovery::ReloadAndDismiss => self.reload_and_dismiss(b).await,
        }
    }

    /// Reload the editor and clear the "leave page?" dialog if it shows.
    async fn reload_and_dismiss(&self, b: &dyn Browser) -> Result<()> {
        b.leave_frames().await?;
        b.refresh().await?;
        self.pause(steps::RELOAD_SETTLE).await;
        if let Some(text) = b.accept_alert_within(self.waits.alert).await? {
            tracing::debug!(alert = %text, "dismissed dialog after reload");
        }
        self.pause_secs(1).await;
        Ok(())
    }

    async fn pause(&self, d: Duration) {
        self.retry.sleeper().sleep(d).await;
    }

    async fn pause_secs(&self, n: u64) {
        self.pause(Duration::from_secs(n)).await;
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn transition(outcome: &mut JobOutcome, to: WorkflowState) {
    tracing::info!(oc = %outcome.oc, from = %outcome.state, to = %to, "transition");
    outcome.state = to;
}

fn fail(outcome: &mut JobOutcome, at: WorkflowState, reason: String) {
    tracing::warn!(oc = %outcome.oc, from = %outcome.state, at = %at, reason = %reason, "job failed");
    outcome.state = WorkflowState::Failed;
    outcome.failed_at = Some(at);
    outcome.reason = Some(reason);
}

// ---------------------------------------------------------------------------
// SessionLease
// ---------------------------------------------------------------------------

/// Owns one open browser session. [`SessionLease::release`] quits it; a
/// lease dropped without being released quits its session on the runtime
/// in the background.
struct SessionLease {
    oc: String,
    session: Arc<dyn Browser>,
    released: bool,
}

impl SessionLease {
    fn new(oc: &str, session: Box<dyn Browser>) -> Self {
        Self {
            oc: oc.to_string(),
            session: Arc::from(session),
            released: false,
        }
    }

    fn browser(&self) -> &dyn Browser {
        self.session.as_ref()
    }

    async fn release(mut self) {
        self.released = true;
        quit(self.session.as_ref(), &self.oc).await;
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!(oc = %self.oc, "browser session dropped without release, quitting");
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let session = self.session.clone();
                let oc = std::mem::take(&mut self.oc);
                handle.spawn(async move { quit(session.as_ref(), &oc).await });
            }
            Err(_) => tracing::error!(oc = %self.oc, "no runtime to quit browser session on"),
        }
    }
}

async fn quit(session: &dyn Browser, oc: &str) {
    if let Err(e) = session.quit().await {
        tracing::warn!(oc, error = %e, "failed to quit browser session");
    }
}

#[cfg(test)]
mod tests;
