use crate::cmd::{block_on, load_config, today};
use crate::output::print_json;
use anyhow::Context;
use ocmap_core::pipeline::{self, PipelineOutcome};
use std::path::Path;

pub fn run(root: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let date = today();
    let outcome = block_on(pipeline::run_configured(root, &config, date))?
        .context("failed to set up pipeline")?;

    if json {
        print_json(&outcome)?;
    } else {
        print_summary(&outcome);
    }

    if outcome.aborted {
        anyhow::bail!("no priority-list rows dated {date}; run aborted");
    }
    Ok(())
}

fn print_summary(outcome: &PipelineOutcome) {
    println!("Priority rows: {}", outcome.priority_rows);
    if outcome.aborted {
        return;
    }
    match &outcome.backlog {
        Some(b) => println!(
            "Geocoding:     {} resolved, {} marked empty ({} outstanding)",
            b.resolved, b.unresolved, b.outstanding
        ),
        None => println!("Geocoding:     failed"),
    }
    if !outcome.missing_artifacts.is_empty() {
        println!("Missing:       {}", outcome.missing_artifacts.join(", "));
    }
    match &outcome.layers {
        Some(report) => {
            println!();
            super::layers::print_report(report);
        }
        None => println!("Layers:        skipped"),
    }
}
