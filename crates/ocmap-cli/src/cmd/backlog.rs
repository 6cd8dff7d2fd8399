use crate::cmd::{block_on, load_config};
use crate::output::print_json;
use anyhow::Context;
use ocmap_core::backlog::BacklogProcessor;
use ocmap_core::pipeline::Runtime;
use ocmap_core::store::RecordStore;
use std::path::Path;

pub fn run(root: &Path, count_only: bool, json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    let runtime = Runtime::from_config(root, &config).context("failed to open record store")?;

    if count_only {
        let outstanding = runtime.store.count_outstanding()?;
        if json {
            print_json(&serde_json::json!({ "outstanding": outstanding }))?;
        } else {
            println!("{outstanding}");
        }
        return Ok(());
    }

    let processor = BacklogProcessor::new(&runtime.store, &runtime.resolver);
    let report = block_on(processor.process_backlog())?.context("backlog geocoding failed")?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Processed {} of {} outstanding: {} resolved, {} marked empty ({} provider errors)",
            report.processed(),
            report.outstanding,
            report.resolved,
            report.unresolved,
            report.provider_errors
        );
    }
    Ok(())
}
