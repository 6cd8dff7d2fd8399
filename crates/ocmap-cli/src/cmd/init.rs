use anyhow::Context;
use ocmap_core::{config::Config, io, paths, store::SqliteStore};
use std::path::Path;

pub fn run(root: &Path) -> anyhow::Result<()> {
    println!("Initializing ocmap in: {}", root.display());

    // 1. .ocmap directory
    let dir = paths::ocmap_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    // 2. config.yaml if missing
    let config_path = paths::config_path(root);
    let config = if config_path.exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
        Config::load(root).context("failed to load existing config.yaml")?
    } else {
        let cfg = Config::default();
        cfg.save(root).context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
        cfg
    };

    // 3. record store schema (idempotent)
    let store_path = config.store_path(root);
    let existed = store_path.exists();
    SqliteStore::open(&store_path)
        .with_context(|| format!("failed to open record store {}", store_path.display()))?;
    println!(
        "  {} {}",
        if existed { "exists: " } else { "created:" },
        store_path.display()
    );

    // 4. artifact directory
    let artifacts = config.artifact_dir(root);
    io::ensure_dir(&artifacts)
        .with_context(|| format!("failed to create {}", artifacts.display()))?;

    println!("\nNext: add operating units under workflow.units in {}", paths::CONFIG_FILE);
    Ok(())
}
