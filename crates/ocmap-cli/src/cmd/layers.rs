use crate::cmd::{block_on, load_config, today};
use crate::output::{print_json, print_table};
use anyhow::Context;
use map_driver::SessionFactory;
use ocmap_core::pipeline::{self, Runtime};
use ocmap_core::workflow::StageReport;
use ocmap_core::OcmapError;
use std::path::Path;

pub fn run(root: &Path, only: &[String], json: bool) -> anyhow::Result<()> {
    let config = load_config(root)?;
    for id in only {
        if config.workflow.unit(id).is_none() {
            return Err(OcmapError::UnknownUnit(id.clone()).into());
        }
    }
    config.credential()?;
    let driver = pipeline::browser_driver(&config).with_context(|| {
        format!(
            "browser driver not found at {}",
            config.workflow.driver_path.display()
        )
    })?;

    let runtime = Runtime::from_config(root, &config)?;
    let stages = runtime.pipeline(&config, today());
    let (jobs, missing) = stages.layer_jobs(only);
    for oc in &missing {
        eprintln!("warning: no report artifact for {oc}");
    }

    let report = block_on(async {
        let report = stages
            .update_layers(Some(&driver as &dyn SessionFactory), &jobs)
            .await;
        driver.shutdown().await;
        report
    })?
    .unwrap_or_default();

    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }

    let failed = report.failed().len();
    if failed > 0 {
        anyhow::bail!("{failed} layer update(s) failed");
    }
    Ok(())
}

pub(crate) fn print_report(report: &StageReport) {
    if report.outcomes.is_empty() {
        println!("No layers updated.");
        return;
    }
    let rows = report
        .outcomes
        .iter()
        .map(|o| {
            vec![
                o.oc.clone(),
                o.state.to_string(),
                o.failed_at.map(|s| s.to_string()).unwrap_or_default(),
                o.degraded
                    .iter()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
                o.reason.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["OC", "STATE", "FAILED AT", "DEGRADED", "REASON"], rows);
}
