use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use map_driver::SessionFactory;
use tempfile::TempDir;

use super::fake::FakeSessions;
use super::*;
use crate::paths;
use crate::retry::RecordingSleeper;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
}

fn job_for(dir: &Path, oc: &str, with_artifact: bool) -> LayerUpdateJob {
    let artifact = paths::artifact_path(dir, oc);
    if with_artifact {
        std::fs::create_dir_all(artifact.parent().unwrap()).unwrap();
        std::fs::write(&artifact, b"xlsx").unwrap();
    }
    LayerUpdateJob::new(
        oc,
        format!("https://accounts.example.test/signin?oc={oc}"),
        Credential::new("agent@example.test", "s3cret"),
        artifact,
        today(),
    )
}

async fn run_one(sessions: &FakeSessions, job: &LayerUpdateJob) -> (JobOutcome, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let engine = LayerWorkflowEngine::new(sessions, sleeper.clone(), Waits::none());
    (engine.run_job(job).await, sleeper)
}

#[tokio::test]
async fn happy_path_reaches_verified_with_one_session() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "ALEXY", true);
    let sessions = FakeSessions::new();

    let (outcome, sleeper) = run_one(&sessions, &job).await;

    assert_eq!(outcome.state, WorkflowState::Verified);
    assert!(outcome.succeeded());
    assert!(outcome.degraded.is_empty());
    assert_eq!(outcome.items.as_deref(), Some("3 items"));

    let st = sessions.state();
    assert_eq!((st.opened, st.quit), (1, 1));
    assert_eq!(st.depth_at_quit, vec![0]);
    assert_eq!(st.max_frame_depth, 1);
    assert_eq!(st.visited, vec![job.login_url.clone()]);
    assert_eq!(
        st.typed_into(&selectors::identity_fields()[0]),
        vec!["agent@example.test"]
    );
    assert_eq!(st.typed_into(&selectors::secret_fields()[0]), vec!["s3cret"]);
    assert_eq!(
        st.typed_into(&selectors::rename_input()),
        vec!["ALEXY_20261019_All"]
    );
    assert_eq!(
        st.typed_into(&selectors::file_input()),
        vec![job.artifact_path.display().to_string()]
    );
    assert!(st.clicked(&selectors::confirm_delete()));
    assert!(st.clicked(&selectors::import_done()));
    assert!(st.clicked(&selectors::style_priority_column()[0]));
    assert_eq!(st.lookups_of(&selectors::upload_frame(super::fake::UPLOAD_FRAME_ID)), 1);
    // single reload before the rename
    assert_eq!(st.refreshes, 1);
    assert!(sleeper.durations().contains(&steps::RELOAD_SETTLE));
}

#[tokio::test]
async fn delete_exhaustion_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "JULIAN", true);
    let sessions = FakeSessions::new().missing(selectors::layer_status());

    let (outcome, _) = run_one(&sessions, &job).await;

    assert_eq!(outcome.state, WorkflowState::Verified);
    assert_eq!(outcome.degraded, vec![WorkflowState::LayerDeleted]);
    let st = sessions.state();
    assert_eq!(st.lookups_of(&selectors::layer_status()), 10);
    assert!(!st.clicked(&selectors::confirm_delete()));
    assert_eq!(st.typed_into(&selectors::rename_input()).len(), 1);
}

#[tokio::test]
async fn import_exhaustion_fails_job_and_releases_session() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "KEVIN4584", true);
    let sessions = FakeSessions::new().missing(selectors::file_input());

    let (outcome, sleeper) = run_one(&sessions, &job).await;

    assert_eq!(outcome.state, WorkflowState::Failed);
    assert_eq!(outcome.failed_at, Some(WorkflowState::FileImported));
    assert!(outcome
        .reason
        .as_deref()
        .unwrap()
        .contains("gave up after 10 attempt(s)"));

    let st = sessions.state();
    assert_eq!(st.lookups_of(&selectors::file_input()), 10);
    // one reload before the rename, then one recovery between each attempt
    assert_eq!(st.refreshes, 1 + 9);
    assert_eq!((st.opened, st.quit), (1, 1));
    assert_eq!(st.depth_at_quit, vec![0]);
    assert_eq!(st.max_frame_depth, 1);
    assert!(!st.clicked(&selectors::coordinate_columns()[0]));

    let reload_settles = sleeper
        .durations()
        .iter()
        .filter(|d| **d == steps::RELOAD_SETTLE)
        .count();
    assert_eq!(reload_settles, 10);
}

#[tokio::test]
async fn flaky_import_recovers_after_reload() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "JACKYH", true);
    let sessions = FakeSessions::new().flaky(selectors::import_link(), 2);

    let (outcome, _) = run_one(&sessions, &job).await;

    assert!(outcome.succeeded());
    let st = sessions.state();
    assert_eq!(st.lookups_of(&selectors::import_link()), 3);
    assert_eq!(st.refreshes, 1 + 2);
}

#[tokio::test]
async fn failed_job_does_not_stop_the_next_unit() {
    let dir = TempDir::new().unwrap();
    let jobs = vec![
        job_for(dir.path(), "ANDERSON", false),
        job_for(dir.path(), "SIMONSH", true),
    ];
    let sessions = FakeSessions::new();
    let sleeper = Arc::new(RecordingSleeper::default());
    let engine = LayerWorkflowEngine::new(&sessions, sleeper, Waits::none());

    let report = engine.run_all(&jobs).await;

    assert!(!report.all_succeeded());
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].oc, "ANDERSON");
    assert_eq!(failed[0].failed_at, Some(WorkflowState::FileImported));
    assert!(failed[0]
        .reason
        .as_deref()
        .unwrap()
        .contains("report artifact missing"));
    assert_eq!(report.succeeded(), vec!["SIMONSH"]);

    let summary = report.summary();
    assert!(summary.contains("ANDERSON at file_imported"));
    assert!(summary.contains("Succeeded:\n  SIMONSH"));

    let st = sessions.state();
    assert_eq!((st.opened, st.quit), (2, 2));
    // the missing artifact is detected before the import control is touched
    assert_eq!(st.lookups_of(&selectors::import_link()), 1);
}

#[tokio::test]
async fn login_retries_with_a_fresh_session() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "SPANELY", true);
    let sessions = FakeSessions::new().broken_sessions(1);

    let (outcome, _) = run_one(&sessions, &job).await;

    assert!(outcome.succeeded());
    let st = sessions.state();
    assert_eq!((st.opened, st.quit), (2, 2));
    assert_eq!(st.visited.len(), 2);
}

#[tokio::test]
async fn login_exhaustion_fails_at_authenticated() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "WHITE5082", true);
    let sessions = FakeSessions::new().broken_sessions(2);

    let (outcome, _) = run_one(&sessions, &job).await;

    assert_eq!(outcome.state, WorkflowState::Failed);
    assert_eq!(outcome.failed_at, Some(WorkflowState::Authenticated));
    let st = sessions.state();
    assert_eq!((st.opened, st.quit), (2, 2));
    assert!(st.clicks.is_empty());
}

#[tokio::test]
async fn style_falls_back_to_numeric_column() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "SCOTT4162", true);
    let columns = selectors::style_priority_column();
    let sessions = FakeSessions::new().missing(columns[0].clone());

    let (outcome, _) = run_one(&sessions, &job).await;

    assert!(outcome.succeeded());
    assert!(outcome.degraded.is_empty());
    let st = sessions.state();
    assert!(!st.clicked(&columns[0]));
    assert!(st.clicked(&columns[1]));
}

#[tokio::test]
async fn style_exhaustion_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "ALEXY", true);
    let sessions = FakeSessions::new().missing(selectors::style_link());

    let (outcome, _) = run_one(&sessions, &job).await;

    assert_eq!(outcome.state, WorkflowState::Verified);
    assert_eq!(outcome.degraded, vec![WorkflowState::Styled]);
}

#[tokio::test]
async fn column_mapping_exhaustion_is_fatal() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "ALEXY", true);
    let sessions = FakeSessions::new().missing(selectors::coordinate_columns()[2].clone());

    let (outcome, _) = run_one(&sessions, &job).await;

    assert_eq!(outcome.failed_at, Some(WorkflowState::ColumnsConfigured));
    let st = sessions.state();
    assert_eq!((st.opened, st.quit), (1, 1));
    assert!(!st.clicked(&selectors::import_continue()));
}

#[tokio::test]
async fn edit_mode_exhaustion_is_fatal() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "ALEXY", true);
    let controls = selectors::edit_controls();
    let sessions = controls
        .iter()
        .cloned()
        .fold(FakeSessions::new(), FakeSessions::missing);

    let (outcome, _) = run_one(&sessions, &job).await;

    assert_eq!(outcome.state, WorkflowState::Failed);
    assert_eq!(outcome.failed_at, Some(WorkflowState::EditMode));
    let st = sessions.state();
    for control in &controls {
        assert_eq!(st.lookups_of(control), 10);
    }
    assert_eq!(st.lookups_of(&selectors::layer_status()), 0);
    assert_eq!((st.opened, st.quit), (1, 1));
}

#[tokio::test]
async fn rename_exhaustion_fails_job_and_releases_session() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "BEN4423", true);
    let sessions = FakeSessions::new().missing(selectors::unnamed_layer());

    let (outcome, sleeper) = run_one(&sessions, &job).await;

    assert_eq!(outcome.state, WorkflowState::Failed);
    assert_eq!(outcome.failed_at, Some(WorkflowState::LayerRenamed));
    assert!(outcome
        .reason
        .as_deref()
        .unwrap()
        .contains("gave up after 10 attempt(s)"));

    let st = sessions.state();
    assert_eq!(st.lookups_of(&selectors::unnamed_layer()), 10);
    // every attempt starts from a fresh reload
    assert_eq!(st.refreshes, 10);
    assert!(st.typed_into(&selectors::rename_input()).is_empty());
    assert_eq!(st.lookups_of(&selectors::import_link()), 0);
    assert_eq!((st.opened, st.quit), (1, 1));

    let reload_settles = sleeper
        .durations()
        .iter()
        .filter(|d| **d == steps::RELOAD_SETTLE)
        .count();
    assert_eq!(reload_settles, 10);
}

#[tokio::test]
async fn failed_reload_before_rename_is_retried() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "ALEXY", true);
    let sessions = FakeSessions::new().failing_refreshes(2);

    let (outcome, _) = run_one(&sessions, &job).await;

    assert!(outcome.succeeded());
    let st = sessions.state();
    assert_eq!(st.refreshes, 3);
    assert_eq!(
        st.typed_into(&selectors::rename_input()),
        vec!["ALEXY_20261019_All"]
    );
    assert_eq!((st.opened, st.quit), (1, 1));
}

#[tokio::test]
async fn reload_that_never_recovers_fails_at_rename() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "ALEXY", true);
    let sessions = FakeSessions::new().failing_refreshes(u32::MAX);

    let (outcome, _) = run_one(&sessions, &job).await;

    assert_eq!(outcome.failed_at, Some(WorkflowState::LayerRenamed));
    assert!(outcome
        .reason
        .as_deref()
        .unwrap()
        .contains("ERR_CONNECTION_RESET"));
    let st = sessions.state();
    assert_eq!(st.refreshes, 10);
    assert_eq!(st.lookups_of(&selectors::unnamed_layer()), 0);
    assert_eq!((st.opened, st.quit), (1, 1));
}

#[tokio::test]
async fn finalize_exhaustion_is_fatal() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "SIMONSH", true);
    let sessions = FakeSessions::new().missing(selectors::import_done());

    let (outcome, _) = run_one(&sessions, &job).await;

    assert_eq!(outcome.state, WorkflowState::Failed);
    assert_eq!(outcome.failed_at, Some(WorkflowState::ImportFinalized));
    let st = sessions.state();
    assert_eq!(st.lookups_of(&selectors::import_done()), 10);
    assert_eq!(st.lookups_of(&selectors::import_continue()), 10);
    assert_eq!(st.lookups_of(&selectors::style_link()), 0);
    assert_eq!((st.opened, st.quit), (1, 1));
    assert_eq!(st.depth_at_quit, vec![0]);
}

#[tokio::test]
async fn dropped_lease_still_quits_its_session() {
    let sessions = FakeSessions::new();
    let session = sessions.open().await.unwrap();

    drop(SessionLease::new("ALEXY", session));
    tokio::task::yield_now().await;

    let st = sessions.state();
    assert_eq!((st.opened, st.quit), (1, 1));
}

#[tokio::test]
async fn released_lease_quits_exactly_once() {
    let sessions = FakeSessions::new();
    let lease = SessionLease::new("ALEXY", sessions.open().await.unwrap());

    lease.release().await;
    tokio::task::yield_now().await;

    assert_eq!(sessions.state().quit, 1);
}

#[tokio::test]
async fn dialog_after_reload_is_dismissed() {
    let dir = TempDir::new().unwrap();
    let job = job_for(dir.path(), "ALEXY", true);
    let sessions = FakeSessions::new().alert("Leave site?");

    let (outcome, _) = run_one(&sessions, &job).await;

    assert!(outcome.succeeded());
    assert_eq!(sessions.state().pending_alerts(), 0);
}

#[test]
fn outcome_serializes_without_empty_fields() {
    let outcome = JobOutcome::new("ALEXY");
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["state"], "init");
    assert!(json.get("failed_at").is_none());
    assert!(json.get("degraded").is_none());
}
