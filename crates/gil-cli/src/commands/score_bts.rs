//! The `gil score-bts` command.

use std::path::PathBuf;

use anyhow::Result;

use gil_core::bts::{BtsEngine, BtsInput};
use gil_core::config::load_config_from;
use gil_core::model::{check_percentage, BtsReport, BtsScore, CommunityStatistic};
use gil_core::EngineError;

/// Raw numbers for one BTS scoring request.
pub struct BtsArgs {
    pub own: f64,
    pub peer: f64,
    pub community_average: f64,
    pub samples: u32,
    pub accuracy: f64,
}

pub fn execute(args: BtsArgs, format: String, config_path: Option<PathBuf>) -> Result<()> {
    anyhow::ensure!(
        matches!(format.as_str(), "table" | "json"),
        "unknown format '{format}', expected table or json"
    );
    let config = load_config_from(config_path.as_deref())?;

    let input = BtsInput::new(BtsReport::new(args.own, args.peer)?, args.accuracy)?;
    let stats = CommunityStatistic {
        community_average: check_percentage("community_average", args.community_average)?,
        sample_count: args.samples,
        version: u64::from(args.samples),
        ..CommunityStatistic::empty("cli")
    };

    let engine = BtsEngine::new(&config.bts);
    match engine.compute(&input, &stats) {
        Ok(score) => {
            if format == "json" {
                println!("{}", serde_json::to_string_pretty(&score)?);
            } else {
                print_breakdown(&score, &config.bts);
            }
            Ok(())
        }
        Err(EngineError::InsufficientData {
            sample_count,
            required,
            ..
        }) => {
            if format == "json" {
                println!("null");
            } else {
                println!(
                    "Insufficient data: {sample_count} community sample(s), {required} required. \
                     BTS score deferred."
                );
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_breakdown(score: &BtsScore, config: &gil_core::config::BtsConfig) {
    use comfy_table::{Cell, Table};

    let mut table = Table::new();
    table.set_header(vec!["Component", "Points", "Max"]);
    let rows = [
        ("Information", score.information, config.information_max()),
        ("Prediction", score.prediction, config.prediction_max()),
        ("Accuracy", score.accuracy, config.accuracy_max()),
        ("Insight", score.insight, config.insight_max()),
        ("Total", score.total, config.total_max()),
    ];
    for (name, points, max) in rows {
        table.add_row(vec![
            Cell::new(name),
            Cell::new(format!("{points:.2}")),
            Cell::new(format!("{max:.1}")),
        ]);
    }

    println!("{table}");
    println!("Prediction error: {:.1}", score.prediction_error);
}
