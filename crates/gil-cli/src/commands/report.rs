//! The `gil report` command.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;

use gil_core::report::SimulationReport;

use super::simulate::print_summary;

pub fn execute(input: PathBuf, format: String) -> Result<()> {
    let report = SimulationReport::load_json(&input)?;
    tracing::info!(
        "report {} from {} ({} sessions)",
        report.id,
        report.created_at.format("%Y-%m-%d %H:%M:%S"),
        report.sessions.len(),
    );

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        "table" => {
            println!(
                "Item bank: {} ({} items)",
                report.item_bank.name, report.item_bank.item_count
            );
            print_summary(&report, &HashMap::new(), &HashMap::new());
        }
        other => anyhow::bail!("unknown format '{other}', expected table or json"),
    }
    Ok(())
}
