//! gil CLI: the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gil", version, about = "Adaptive clinical assessment engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a cohort of clinicians with known abilities
    Simulate {
        /// Path to .toml item bank or directory
        #[arg(long)]
        item_bank: PathBuf,

        /// Clinical domain to assess
        #[arg(long)]
        domain: String,

        /// True abilities of the simulated clinicians (comma-separated)
        #[arg(long, allow_hyphen_values = true)]
        abilities: String,

        /// Max concurrent sessions
        #[arg(long, default_value = "4")]
        parallelism: usize,

        /// Profile snapshot to resume from and save back to
        #[arg(long)]
        profiles: Option<PathBuf>,

        /// Output directory for the JSON report
        #[arg(long)]
        output: Option<PathBuf>,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Show a saved simulation report
    Report {
        /// Path to a report JSON file
        #[arg(long)]
        input: PathBuf,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Score one self-assessment and peer prediction
    ScoreBts {
        /// Own assessment of the answer (0-100)
        #[arg(long)]
        own: f64,

        /// Predicted peer assessment (0-100)
        #[arg(long)]
        peer: f64,

        /// Community average own assessment (0-100)
        #[arg(long)]
        community_average: f64,

        /// Number of community samples behind the average
        #[arg(long)]
        samples: u32,

        /// Graded accuracy of the answer (0-100)
        #[arg(long)]
        accuracy: f64,

        /// Output format: table, json
        #[arg(long, default_value = "table")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate item bank TOML files
    Validate {
        /// Path to item bank file or directory
        #[arg(long)]
        item_bank: PathBuf,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example item bank
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gil=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            item_bank,
            domain,
            abilities,
            parallelism,
            profiles,
            output,
            format,
            config,
        } => {
            commands::simulate::execute(
                commands::simulate::SimulateArgs {
                    item_bank,
                    domain,
                    abilities,
                    parallelism,
                    profiles,
                    output,
                    format,
                },
                config,
            )
            .await
        }
        Commands::Report { input, format } => commands::report::execute(input, format),
        Commands::ScoreBts {
            own,
            peer,
            community_average,
            samples,
            accuracy,
            format,
            config,
        } => commands::score_bts::execute(
            commands::score_bts::BtsArgs {
                own,
                peer,
                community_average,
                samples,
                accuracy,
            },
            format,
            config,
        ),
        Commands::Validate { item_bank, config } => commands::validate::execute(item_bank, config),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
