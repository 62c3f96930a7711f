//! The `gil simulate` command.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use gil_core::config::load_config_from;
use gil_core::parser;
use gil_core::report::{ItemBankSummary, SimulationReport};
use gil_core::session::{
    AssessmentOrchestrator, Participant, ProgressReporter, SessionSummary, SubmissionOutcome,
};
use gil_store::{
    InMemoryCommunityStore, InMemoryItemBank, InMemoryProfileStore, InMemoryResponseStore,
    SimulatedRespondent,
};

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_session_start(&self, user_id: &str, domain: &str) {
        eprintln!("  Starting: {user_id} :: {domain}");
    }

    fn on_response(&self, user_id: &str, outcome: &SubmissionOutcome) {
        let update = &outcome.feedback.competence_update;
        eprintln!(
            "    {user_id} :: {} score {:.1} theta {:+.2} -> {:+.2} (se {:.3})",
            outcome.response.case_id,
            outcome.feedback.score,
            update.previous_theta,
            update.new_theta,
            update.standard_error,
        );
    }

    fn on_session_complete(&self, summary: &SessionSummary) {
        eprintln!(
            "  Done: {} [{}] {} items, theta {:+.2}",
            summary.user_id,
            summary.state,
            summary.items_administered,
            summary.final_profile.theta,
        );
    }

    fn on_session_error(&self, user_id: &str, error: &str) {
        eprintln!("  ERROR: {user_id}: {error}");
    }

    fn on_cohort_complete(&self, total: usize, completed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {completed}/{total} sessions finished, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub struct SimulateArgs {
    pub item_bank: PathBuf,
    pub domain: String,
    pub abilities: String,
    pub parallelism: usize,
    pub profiles: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub format: String,
}

pub async fn execute(args: SimulateArgs, config_path: Option<PathBuf>) -> Result<()> {
    let SimulateArgs {
        item_bank: item_bank_path,
        domain,
        abilities: abilities_str,
        parallelism,
        profiles: profiles_path,
        output,
        format,
    } = args;
    anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
    anyhow::ensure!(
        matches!(format.as_str(), "table" | "json"),
        "unknown format '{format}', expected table or json"
    );

    let abilities = parse_abilities(&abilities_str)?;
    let config = Arc::new(load_config_from(config_path.as_deref())?);

    let banks = parser::load_item_banks(&item_bank_path)?;
    anyhow::ensure!(
        !banks.is_empty(),
        "no item banks found at {}",
        item_bank_path.display()
    );
    let bank_summary = summarize_banks(&banks);

    let items = Arc::new(InMemoryItemBank::from_files(&banks));
    if items.domain_size(&domain) == 0 {
        tracing::warn!("no active items in domain '{domain}'");
    }

    let profiles = Arc::new(InMemoryProfileStore::new(config.irt.clone()));
    if let Some(path) = profiles_path.as_deref().filter(|p| p.exists()) {
        let loaded = profiles.load_snapshot(path).await?;
        tracing::info!("loaded {loaded} profile(s) from {}", path.display());
    }

    let orchestrator = AssessmentOrchestrator::new(
        items,
        profiles.clone(),
        Arc::new(InMemoryResponseStore::new()),
        Arc::new(InMemoryCommunityStore::new()),
        Arc::clone(&config),
    );

    let participants: Vec<Participant> = abilities
        .iter()
        .enumerate()
        .map(|(i, &theta)| Participant {
            user_id: format!("sim-{:02}", i + 1),
            domain: domain.clone(),
            respondent: Arc::new(SimulatedRespondent::new(theta)),
        })
        .collect();
    let true_thetas: HashMap<String, f64> = participants
        .iter()
        .zip(&abilities)
        .map(|(p, &theta)| (p.user_id.clone(), theta))
        .collect();

    tracing::info!(
        "gil v{}: simulating {} clinicians on '{}' ({} items)",
        env!("CARGO_PKG_VERSION"),
        participants.len(),
        domain,
        bank_summary.item_count,
    );

    let start = Instant::now();
    let mut sessions = orchestrator
        .run_cohort(participants, parallelism, &ConsoleReporter)
        .await?;
    sessions.sort_by(|a, b| a.user_id.cmp(&b.user_id));

    let mut refits = HashMap::new();
    for session in &sessions {
        let audit = orchestrator
            .audit_profile(&session.user_id, &session.domain)
            .await?;
        refits.insert(session.user_id.clone(), audit.refit_theta);
    }

    let report = SimulationReport::new(
        bank_summary,
        sessions,
        start.elapsed().as_millis() as u64,
    );

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_summary(&report, &true_thetas, &refits),
    }

    if let Some(path) = profiles_path {
        profiles.save_snapshot(&path).await?;
        tracing::info!("profiles saved to {}", path.display());
    }

    if let Some(dir) = output {
        std::fs::create_dir_all(&dir)?;
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
        let path = dir.join(format!("simulation-{timestamp}.json"));
        report.save_json(&path)?;
        tracing::info!("results saved to {}", path.display());
    }

    Ok(())
}

fn parse_abilities(s: &str) -> Result<Vec<f64>> {
    let abilities = s
        .split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| anyhow::anyhow!("invalid ability value: '{part}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!abilities.is_empty(), "at least one ability is required");
    Ok(abilities)
}

fn summarize_banks(banks: &[parser::ItemBankFile]) -> ItemBankSummary {
    match banks {
        [single] => ItemBankSummary::from(single),
        _ => ItemBankSummary {
            id: banks.iter().map(|b| b.id.as_str()).collect::<Vec<_>>().join("+"),
            name: banks.iter().map(|b| b.name.as_str()).collect::<Vec<_>>().join(", "),
            item_count: banks.iter().map(|b| b.items.len()).sum(),
        },
    }
}

/// Summary table. Clinicians missing from `true_thetas` or `refits` show a dash.
pub fn print_summary(
    report: &SimulationReport,
    true_thetas: &HashMap<String, f64>,
    refits: &HashMap<String, f64>,
) {
    use comfy_table::{Cell, Table};

    let signed = |v: Option<&f64>| v.map_or_else(|| "-".to_string(), |v| format!("{v:+.2}"));

    let mut table = Table::new();
    table.set_header(vec![
        "Clinician",
        "True θ",
        "Estimated θ",
        "Refit θ",
        "SE",
        "Items",
        "Mean score",
        "State",
    ]);

    for session in &report.sessions {
        let mean_score = if session.responses.is_empty() {
            0.0
        } else {
            session.responses.iter().map(|r| r.score).sum::<f64>() / session.responses.len() as f64
        };
        table.add_row(vec![
            Cell::new(&session.user_id),
            Cell::new(signed(true_thetas.get(&session.user_id))),
            Cell::new(format!("{:+.2}", session.final_profile.theta)),
            Cell::new(signed(refits.get(&session.user_id))),
            Cell::new(format!("{:.3}", session.final_profile.standard_error)),
            Cell::new(session.items_administered),
            Cell::new(format!("{mean_score:.1}")),
            Cell::new(session.state),
        ]);
    }

    println!("{table}");
    println!(
        "{}/{} sessions successful, BTS coverage {:.0}%",
        report.successful_sessions(),
        report.sessions.len(),
        report.stats.bts_coverage * 100.0,
    );
}
