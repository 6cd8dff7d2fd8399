use crate::cmd::block_on;
use crate::output::print_json;
use anyhow::Context;
use ocmap_core::config::Config;
use ocmap_core::geocode::{sanitize, GeocodeResolver};
use ocmap_core::retry::TokioSleeper;
use ocmap_core::types::GeocodeOutcome;
use ocmap_core::OcmapError;
use std::path::Path;
use std::sync::Arc;

pub fn run(root: &Path, address: &str, json: bool) -> anyhow::Result<()> {
    // Usable before `ocmap init`: fall back to the built-in provider settings.
    let config = match Config::load(root) {
        Ok(cfg) => cfg,
        Err(OcmapError::NotInitialized) => Config::default(),
        Err(e) => return Err(e).context("failed to load config"),
    };
    let resolver = GeocodeResolver::from_config(&config.geocode, Arc::new(TokioSleeper))
        .context("failed to build geocoder")?;
    let outcome = block_on(resolver.resolve(address))?;

    if json {
        return print_json(&serde_json::json!({
            "address": sanitize(address),
            "result": outcome,
        }));
    }

    match &outcome {
        GeocodeOutcome::Resolved(c) => {
            println!("latitude:  {}", c.latitude_str());
            println!("longitude: {}", c.longitude_str());
        }
        other => println!("{other}"),
    }
    Ok(())
}
