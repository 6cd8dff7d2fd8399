pub mod backlog;
pub mod config;
pub mod geocode;
pub mod init;
pub mod layer_name;
pub mod layers;
pub mod run;

use anyhow::Context;
use ocmap_core::config::Config;
use std::future::Future;
use std::path::Path;

/// Load `.ocmap/config.yaml` under `root`, refusing configs that fail
/// validation.
pub fn load_config(root: &Path) -> anyhow::Result<Config> {
    Config::load_checked(root).context("failed to load config")
}

/// Run `fut` to completion on a fresh multi-threaded runtime.
pub fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    Ok(rt.block_on(fut))
}

pub fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}
