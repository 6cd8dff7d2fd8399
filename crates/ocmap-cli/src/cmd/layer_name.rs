use crate::cmd::today;
use crate::output::print_json;
use chrono::NaiveDate;
use ocmap_core::paths;
use ocmap_core::workflow::layer_name;

pub fn run(oc: &str, date: Option<NaiveDate>, json: bool) -> anyhow::Result<()> {
    paths::validate_unit_id(oc)?;
    let name = layer_name(oc, date.unwrap_or_else(today));
    if json {
        print_json(&serde_json::json!({ "oc": oc, "layer_name": name }))?;
    } else {
        println!("{name}");
    }
    Ok(())
}
