//! Community aggregates, peer comparison and session-level statistics.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::model::CommunityStatistic;
use crate::session::SessionSummary;

impl CommunityStatistic {
    /// Fold one sample into the running means.
    ///
    /// Returns a new snapshot so a store can swap the whole aggregate in one
    /// step; count, means and version always move together.
    pub fn with_sample(&self, own_assessment: f64, peer_prediction: f64) -> Self {
        let n = self.sample_count as f64 + 1.0;
        Self {
            case_id: self.case_id.clone(),
            community_average: self.community_average + (own_assessment - self.community_average) / n,
            mean_peer_prediction: self.mean_peer_prediction
                + (peer_prediction - self.mean_peer_prediction) / n,
            sample_count: self.sample_count + 1,
            version: self.version + 1,
        }
    }
}

/// Where one score sits among the other clinicians' scores on a case.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeerComparison {
    /// Share of peers scoring below, ties counted half (0-100).
    pub percentile: f64,
    pub avg_score: f64,
    pub your_score: f64,
}

/// Compare a score against peer scores for the same case.
///
/// With no peers yet the clinician sits at the 50th percentile of a
/// community made of themselves.
pub fn peer_comparison(your_score: f64, peer_scores: &[f64]) -> PeerComparison {
    if peer_scores.is_empty() {
        return PeerComparison {
            percentile: 50.0,
            avg_score: your_score,
            your_score,
        };
    }

    let n = peer_scores.len() as f64;
    let below = peer_scores.iter().filter(|&&s| s < your_score).count() as f64;
    let ties = peer_scores
        .iter()
        .filter(|&&s| (s - your_score).abs() < f64::EPSILON)
        .count() as f64;

    PeerComparison {
        percentile: 100.0 * (below + 0.5 * ties) / n,
        avg_score: peer_scores.iter().sum::<f64>() / n,
        your_score,
    }
}

/// Aggregate statistics across finished sessions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Per-domain statistics.
    pub per_domain: HashMap<String, DomainStats>,
    /// Session count per terminal state.
    pub outcomes: BTreeMap<String, usize>,
    pub total_responses: usize,
    /// Responses that received a BTS score.
    pub bts_scored: usize,
    /// `bts_scored / total_responses`, 0 when there are no responses.
    pub bts_coverage: f64,
}

/// Statistics for one clinical domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainStats {
    pub domain: String,
    pub sessions: usize,
    pub mean_theta: f64,
    pub mean_standard_error: f64,
    pub mean_items: f64,
    /// Mean clinical accuracy score over all responses.
    pub mean_score: f64,
}

/// Compute aggregate statistics from finished sessions.
pub fn compute_session_stats(sessions: &[SessionSummary]) -> SessionStats {
    let mut by_domain: HashMap<&str, Vec<&SessionSummary>> = HashMap::new();
    for s in sessions {
        by_domain.entry(s.domain.as_str()).or_default().push(s);
    }

    let per_domain = by_domain
        .into_iter()
        .map(|(domain, group)| {
            let n = group.len() as f64;
            let scores: Vec<f64> = group
                .iter()
                .flat_map(|s| s.responses.iter().map(|r| r.score))
                .collect();
            let mean_score = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<f64>() / scores.len() as f64
            };
            let stats = DomainStats {
                domain: domain.to_string(),
                sessions: group.len(),
                mean_theta: group.iter().map(|s| s.final_profile.theta).sum::<f64>() / n,
                mean_standard_error: group
                    .iter()
                    .map(|s| s.final_profile.standard_error)
                    .sum::<f64>()
                    / n,
                mean_items: group.iter().map(|s| s.items_administered as f64).sum::<f64>() / n,
                mean_score,
            };
            (domain.to_string(), stats)
        })
        .collect();

    let mut outcomes = BTreeMap::new();
    for s in sessions {
        *outcomes.entry(s.state.to_string()).or_insert(0) += 1;
    }

    let total_responses: usize = sessions.iter().map(|s| s.responses.len()).sum();
    let bts_scored = sessions
        .iter()
        .flat_map(|s| &s.responses)
        .filter(|r| r.bts_score.is_some())
        .count();
    let bts_coverage = if total_responses == 0 {
        0.0
    } else {
        bts_scored as f64 / total_responses as f64
    };

    SessionStats {
        per_domain,
        outcomes,
        total_responses,
        bts_scored,
        bts_coverage,
    }
}
