//! Simulated clinicians for cohort runs and tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use gil_core::irt;
use gil_core::model::{AbilityProfile, BtsReport, Confidence, DiagnosisEntry, DifferentialDiagnosis, Item};
use gil_core::session::Submission;
use gil_core::traits::Respondent;

/// A deterministic respondent with a fixed latent ability.
///
/// It answers correctly whenever the model gives it at least even odds on the
/// item. A correct answer lists the full reference differential in rank order
/// with critical diagnoses flagged; an incorrect one omits the rank-1 diagnosis.
pub struct SimulatedRespondent {
    true_theta: f64,
    report_bts: bool,
    call_count: AtomicU32,
}

impl SimulatedRespondent {
    pub fn new(true_theta: f64) -> Self {
        Self {
            true_theta,
            report_bts: true,
            call_count: AtomicU32::new(0),
        }
    }

    /// A respondent that never gives a self-assessment or peer prediction.
    pub fn without_bts(mut self) -> Self {
        self.report_bts = false;
        self
    }

    pub fn true_theta(&self) -> f64 {
        self.true_theta
    }

    /// Number of cases answered.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    fn differential(&self, item: &Item, correct: bool) -> DifferentialDiagnosis {
        let mut reference = item.reference_differential.clone();
        reference.sort_by_key(|r| r.rank);

        let entries = reference
            .iter()
            .filter(|r| correct || r.rank != 1)
            .map(|r| DiagnosisEntry {
                code: r.code.clone(),
                name: r.name.clone(),
                confidence: if r.rank == 1 { Confidence::High } else { Confidence::Medium },
                reasoning: None,
            })
            .collect();

        let critical_flagged = if correct {
            reference
                .iter()
                .filter(|r| r.is_critical)
                .map(|r| r.code.clone())
                .collect()
        } else {
            Vec::new()
        };

        DifferentialDiagnosis {
            entries,
            critical_flagged,
        }
    }
}

#[async_trait]
impl Respondent for SimulatedRespondent {
    async fn respond(&self, item: &Item, _profile: &AbilityProfile) -> anyhow::Result<Submission> {
        self.call_count.fetch_add(1, Ordering::Relaxed);

        let p = irt::probability(self.true_theta, &item.parameters);
        let correct = p >= 0.5;

        let bts_report = if self.report_bts {
            // Peers are modelled as an average clinician (theta 0).
            let peer = irt::probability(0.0, &item.parameters);
            Some(BtsReport::new(100.0 * p, 100.0 * peer)?)
        } else {
            None
        };

        let time_spent = (90.0 + 30.0 * item.parameters.difficulty).max(10.0) as u32;

        Ok(Submission {
            case_id: item.id.clone(),
            differential: self.differential(item, correct),
            bts_report,
            time_spent,
        })
    }
}
