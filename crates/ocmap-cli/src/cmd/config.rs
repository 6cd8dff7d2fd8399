use crate::output::print_json;
use anyhow::Context;
use clap::Subcommand;
use ocmap_core::config::{Config, WarnLevel};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Validate the config for common mistakes
    Validate,

    /// Print the effective config, defaults included
    Show,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Validate => validate(root, json),
        ConfigSubcommand::Show => show(root, json),
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn show(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = Config::load(root).context("failed to load config")?;
    if json {
        return print_json(&config);
    }

    let wf = &config.workflow;
    println!("Store:       {}", config.store_path(root).display());
    println!("Artifacts:   {}", config.artifact_dir(root).display());
    println!(
        "Geocoding:   {} -> {} (pause {}-{}s)",
        config.geocode.primary_url,
        config.geocode.secondary_url,
        config.geocode.secondary_delay.min_secs,
        config.geocode.secondary_delay.max_secs
    );
    println!(
        "Driver:      {} (port {}, headless: {})",
        wf.driver_path.display(),
        wf.driver_port,
        wf.headless
    );
    println!("Identity:    {}", if wf.identity.is_empty() { "-" } else { &wf.identity });
    println!("Credential:  ${}", wf.credential_env);
    println!("Units:       {}", wf.units.len());
    for unit in &wf.units {
        let url = if unit.login_url.is_empty() {
            "(no login url)"
        } else {
            unit.login_url.as_str()
        };
        println!("  {:<12} {url}", unit.id);
    }
    Ok(())
}
