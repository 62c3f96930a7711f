//! Simulation report with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parser::ItemBankFile;
use crate::session::SessionSummary;
use crate::statistics::{compute_session_stats, SessionStats};

/// A complete record of a cohort of adaptive sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the item bank the sessions drew from.
    pub item_bank: ItemBankSummary,
    /// Individual session results.
    pub sessions: Vec<SessionSummary>,
    /// Aggregate statistics.
    pub stats: SessionStats,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of an item bank (without the full item definitions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemBankSummary {
    pub id: String,
    pub name: String,
    pub item_count: usize,
}

impl From<&ItemBankFile> for ItemBankSummary {
    fn from(bank: &ItemBankFile) -> Self {
        Self {
            id: bank.id.clone(),
            name: bank.name.clone(),
            item_count: bank.items.len(),
        }
    }
}

impl SimulationReport {
    pub fn new(item_bank: ItemBankSummary, sessions: Vec<SessionSummary>, duration_ms: u64) -> Self {
        let stats = compute_session_stats(&sessions);
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            item_bank,
            sessions,
            stats,
            duration_ms,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: SimulationReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Sessions that ended in a successful terminal state.
    pub fn successful_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.state.is_successful()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IrtConfig;
    use crate::model::AbilityProfile;
    use crate::session::SessionState;

    fn summary(state: SessionState) -> SessionSummary {
        SessionSummary {
            session_id: Uuid::new_v4(),
            user_id: "sim-1".into(),
            domain: "cardiology".into(),
            state,
            items_administered: 0,
            final_profile: AbilityProfile::new("sim-1", "cardiology", &IrtConfig::default()),
            responses: vec![],
        }
    }

    #[test]
    fn save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.json");
        let report = SimulationReport::new(
            ItemBankSummary {
                id: "bank".into(),
                name: "Bank".into(),
                item_count: 3,
            },
            vec![summary(SessionState::Converged), summary(SessionState::ExhaustedBank)],
            12,
        );
        report.save_json(&path).unwrap();

        let loaded = SimulationReport::load_json(&path).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.sessions.len(), 2);
        assert_eq!(loaded.successful_sessions(), 1);
        assert_eq!(loaded.stats.outcomes["exhausted_bank"], 1);
    }

    #[test]
    fn load_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(SimulationReport::load_json(&path).is_err());
    }
}
