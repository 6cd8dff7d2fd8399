//! End-to-end run: data-availability check, backlog geocoding, artifact
//! collection and layer updates, in that order.
//!
//! Only the first step can abort the run. Later stage failures are reported
//! through the notifier and the run still completes.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use map_driver::{ChromeOptions, LazyChromeDriver, SessionFactory};
use serde::Serialize;

use crate::backlog::{BacklogProcessor, BacklogReport};
use crate::config::{Config, UnitConfig};
use crate::error::{OcmapError, Result};
use crate::export::{ArtifactDirectory, ReportExporter};
use crate::geocode::GeocodeResolver;
use crate::notify::{self, Notifier};
use crate::retry::{RetryBudget, RetryPolicy, Sleeper, TokioSleeper};
use crate::store::{RecordStore, SqliteStore};
use crate::workflow::{Credential, LayerUpdateJob, LayerWorkflowEngine, StageReport, Waits};

// ---------------------------------------------------------------------------
// PipelineOutcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineOutcome {
    /// Priority-list rows found for the run date.
    pub priority_rows: usize,
    /// The precondition never held; nothing else ran.
    pub aborted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlog: Option<BacklogReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_artifacts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<StageReport>,
}

impl PipelineOutcome {
    pub fn exit_code(&self) -> i32 {
        if self.aborted {
            1
        } else {
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Collaborators and settings for one run. Built once, never mutated.
pub struct Pipeline<'a> {
    pub store: &'a dyn RecordStore,
    pub resolver: &'a GeocodeResolver,
    pub exporter: &'a dyn ReportExporter,
    pub notifier: &'a dyn Notifier,
    pub sleeper: Arc<dyn Sleeper>,
    pub precondition: RetryBudget,
    pub units: &'a [UnitConfig],
    /// `None` when the credential env var is unset.
    pub credential: Option<Credential>,
    pub waits: Waits,
    pub today: NaiveDate,
}

impl<'a> Pipeline<'a> {
    /// All four steps. `sessions` is `None` when no browser driver is
    /// available, in which case the layer step is skipped.
    pub async fn run(&self, sessions: Option<&dyn SessionFactory>) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::default();

        // 1. data availability
        match self.check_precondition().await {
            Ok(rows) => outcome.priority_rows = rows,
            Err(e) => {
                tracing::error!(error = %e, "priority list never became available, aborting");
                notify::notify(
                    self.notifier,
                    "[ERROR] step 1 priority list unavailable",
                    &e.to_string(),
                )
                .await;
                outcome.aborted = true;
                return outcome;
            }
        }

        // 2. backlog geocoding
        outcome.backlog = self.geocode_backlog().await;

        // 3. artifacts
        let (jobs, missing) = self.layer_jobs(&[]);
        if !missing.is_empty() {
            notify::notify(
                self.notifier,
                "[ERROR] step 3 report artifacts missing",
                &format!("No report artifact for: {}", missing.join(", ")),
            )
            .await;
        }
        outcome.missing_artifacts = missing;

        // 4. layers
        outcome.layers = self.update_layers(sessions, &jobs).await;
        outcome
    }

    /// Wait for today's priority rows, warning on every empty check.
    pub async fn check_precondition(&self) -> Result<usize> {
        let policy = RetryPolicy::new(self.sleeper.clone());
        let max = self.precondition.max_attempts.max(1);
        let attempt = &std::sync::atomic::AtomicU32::new(0);
        let today = self.today;

        policy
            .execute(&self.precondition, move || async move {
                let n = attempt.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                let rows = self.store.count_priority_rows(today)?;
                if rows > 0 {
                    tracing::info!(rows, date = %today, "priority list available");
                    return Ok(rows);
                }
                tracing::warn!(attempt = n, max, date = %today, "priority list empty");
                notify::notify(
                    self.notifier,
                    &format!("[WARN] step 1 priority list empty (check {n}/{max})"),
                    &format!("No priority-list rows dated {today} yet."),
                )
                .await;
                Err(OcmapError::NoPriorityData(today.to_string()))
            })
            .await
            .map_err(|e| e.last)
    }

    pub async fn geocode_backlog(&self) -> Option<BacklogReport> {
        match BacklogProcessor::new(self.store, self.resolver)
            .process_backlog()
            .await
        {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::error!(error = %e, "backlog geocoding failed");
                notify::notify(
                    self.notifier,
                    "[ERROR] step 2 address geocoding failed",
                    &e.to_string(),
                )
                .await;
                None
            }
        }
    }

    /// One job per unit with a login URL (optionally only the `only` ids),
    /// plus the ids whose artifact is missing. Jobs are built for missing
    /// artifacts too; the engine fails them at the import step.
    pub fn layer_jobs(&self, only: &[String]) -> (Vec<LayerUpdateJob>, Vec<String>) {
        let mut jobs = Vec::new();
        let mut missing = Vec::new();
        let credential = self
            .credential
            .clone()
            .unwrap_or_else(|| Credential::new("", ""));

        for unit in self.units {
            if !only.is_empty() && !only.iter().any(|id| *id == unit.id) {
                continue;
            }
            if unit.login_url.trim().is_empty() {
                tracing::warn!(oc = %unit.id, "no login URL configured, skipping");
                continue;
            }
            if let Err(e) = self.exporter.artifact(&unit.id) {
                tracing::warn!(oc = %unit.id, error = %e, "report artifact missing");
                missing.push(unit.id.clone());
            }
            jobs.push(LayerUpdateJob::new(
                &unit.id,
                &unit.login_url,
                credential.clone(),
                self.exporter.artifact_path(&unit.id),
                self.today,
            ));
        }
        (jobs, missing)
    }

    pub async fn update_layers(
        &self,
        sessions: Option<&dyn SessionFactory>,
        jobs: &[LayerUpdateJob],
    ) -> Option<StageReport> {
        if jobs.is_empty() {
            tracing::info!("no operating units to update");
            return None;
        }
        let Some(sessions) = sessions else {
            tracing::warn!("browser driver not available, skipping layer updates");
            return None;
        };
        if self.credential.is_none() {
            notify::notify(
                self.notifier,
                "[ERROR] step 4 map layer update failed",
                "Map-account credential is not configured.",
            )
            .await;
            return None;
        }

        let engine = LayerWorkflowEngine::new(sessions, self.sleeper.clone(), self.waits);
        let report = engine.run_all(jobs).await;
        if !report.all_succeeded() {
            notify::notify(
                self.notifier,
                "[ERROR] step 4 map layer update failed",
                &report.summary(),
            )
            .await;
        }
        Some(report)
    }
}

// ---------------------------------------------------------------------------
// Wiring from config
// ---------------------------------------------------------------------------

/// Real collaborators for a project rooted at `root`.
pub struct Runtime {
    pub store: SqliteStore,
    pub resolver: GeocodeResolver,
    pub exporter: ArtifactDirectory,
    pub notifier: Box<dyn Notifier>,
    pub sleeper: Arc<dyn Sleeper>,
}

impl Runtime {
    pub fn from_config(root: &Path, config: &Config) -> Result<Self> {
        config.ensure_valid()?;
        let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
        Ok(Self {
            store: SqliteStore::open(&config.store_path(root))?,
            resolver: GeocodeResolver::from_config(&config.geocode, sleeper.clone())?,
            exporter: ArtifactDirectory::new(config.artifact_dir(root)),
            notifier: notify::from_config(&config.notifier)?,
            sleeper,
        })
    }

    pub fn pipeline<'a>(&'a self, config: &'a Config, today: NaiveDate) -> Pipeline<'a> {
        let credential = match config.credential() {
            Ok(secret) => Some(Credential::new(&config.workflow.identity, secret)),
            Err(e) => {
                tracing::warn!(error = %e, "layer updates will be skipped");
                None
            }
        };
        Pipeline {
            store: &self.store,
            resolver: &self.resolver,
            exporter: &self.exporter,
            notifier: self.notifier.as_ref(),
            sleeper: self.sleeper.clone(),
            precondition: config.precondition.budget(),
            units: &config.workflow.units,
            credential,
            waits: Waits {
                field: config.workflow.element_timeout(),
                ..Waits::default()
            },
            today,
        }
    }
}

/// Chromedriver for the configured binary, started on first use. `None`
/// when the binary does not exist.
pub fn browser_driver(config: &Config) -> Option<LazyChromeDriver> {
    let wf = &config.workflow;
    if !wf.driver_path.exists() {
        tracing::warn!(path = %wf.driver_path.display(), "browser driver binary not found");
        return None;
    }
    let options = if wf.headless {
        ChromeOptions::headless()
    } else {
        ChromeOptions::windowed()
    };
    Some(LazyChromeDriver::new(&wf.driver_path, wf.driver_port, options))
}

/// `ocmap run`: the full pipeline against the real collaborators.
pub async fn run_configured(root: &Path, config: &Config, today: NaiveDate) -> Result<PipelineOutcome> {
    let runtime = Runtime::from_config(root, config)?;
    let pipeline = runtime.pipeline(config, today);
    let driver = browser_driver(config);

    let outcome = pipeline
        .run(driver.as_ref().map(|d| d as &dyn SessionFactory))
        .await;

    if let Some(driver) = driver {
        driver.shutdown().await;
    }
    Ok(outcome)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
