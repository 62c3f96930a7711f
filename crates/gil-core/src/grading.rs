//! Clinical accuracy grading of a differential against the expert reference.

use serde::{Deserialize, Serialize};

use crate::config::GradingConfig;
use crate::model::{DifferentialDiagnosis, ReferenceDiagnosis};

/// Lowest credit for a listed diagnosis, however far from its reference rank.
const MIN_PROXIMITY: f64 = 0.5;
/// Credit lost per rank of displacement.
const PROXIMITY_STEP: f64 = 0.1;

/// Per-reference feedback shown to the clinician after grading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceFeedback {
    pub diagnosis_name: String,
    pub rank: u32,
    pub is_critical: bool,
    /// Whether the clinician listed this diagnosis.
    pub matched: bool,
}

/// Outcome of grading one differential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    /// Clinical accuracy on 0-100.
    pub score: f64,
    /// Leading diagnosis found and nothing critical missed.
    pub is_correct: bool,
    pub missed_critical: Vec<String>,
    pub reference: Vec<ReferenceFeedback>,
}

/// Grade a differential.
///
/// Each listed reference diagnosis earns its weight, discounted by how far
/// its position sits from the reference rank. Every critical diagnosis that
/// was neither listed nor flagged removes `critical_miss_penalty` of the
/// score. An empty reference grades as zero.
pub fn grade(
    differential: &DifferentialDiagnosis,
    reference: &[ReferenceDiagnosis],
    config: &GradingConfig,
) -> Grade {
    let total_weight: f64 = reference.iter().map(|r| r.weight.max(0.0)).sum();

    let mut earned = 0.0;
    let mut missed_critical = Vec::new();
    let mut feedback = Vec::with_capacity(reference.len());

    for dx in reference {
        let position = differential.position_of(&dx.code);
        if let Some(pos) = position {
            let displacement = (pos as f64 - dx.rank as f64).abs();
            let proximity = (1.0 - PROXIMITY_STEP * displacement).max(MIN_PROXIMITY);
            earned += dx.weight.max(0.0) * proximity;
        }
        if dx.is_critical && position.is_none() && !differential.is_flagged(&dx.code) {
            missed_critical.push(dx.code.clone());
        }
        feedback.push(ReferenceFeedback {
            diagnosis_name: dx.name.clone(),
            rank: dx.rank,
            is_critical: dx.is_critical,
            matched: position.is_some(),
        });
    }

    let base = if total_weight > 0.0 {
        earned / total_weight
    } else {
        0.0
    };
    let penalty = (1.0 - config.critical_miss_penalty * missed_critical.len() as f64).max(0.0);
    let score = (100.0 * base * penalty).clamp(0.0, 100.0);

    let leading_found = reference
        .iter()
        .filter(|dx| dx.rank == 1)
        .any(|dx| differential.position_of(&dx.code).is_some());
    let is_correct = leading_found && missed_critical.is_empty();

    Grade {
        score,
        is_correct,
        missed_critical,
        reference: feedback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Confidence, DiagnosisEntry};

    fn reference() -> Vec<ReferenceDiagnosis> {
        vec![
            ReferenceDiagnosis {
                code: "I21.4".into(),
                name: "NSTEMI".into(),
                rank: 1,
                weight: 2.0,
                is_critical: false,
            },
            ReferenceDiagnosis {
                code: "I71.0".into(),
                name: "Aortic dissection".into(),
                rank: 2,
                weight: 1.0,
                is_critical: true,
            },
            ReferenceDiagnosis {
                code: "K21.9".into(),
                name: "GERD".into(),
                rank: 3,
                weight: 1.0,
                is_critical: false,
            },
        ]
    }

    fn differential(codes: &[&str]) -> DifferentialDiagnosis {
        DifferentialDiagnosis {
            entries: codes
                .iter()
                .map(|c| DiagnosisEntry {
                    code: c.to_string(),
                    name: c.to_string(),
                    confidence: Confidence::Medium,
                    reasoning: None,
                })
                .collect(),
            critical_flagged: vec![],
        }
    }

    #[test]
    fn exact_match_scores_full_marks() {
        let grade = grade(
            &differential(&["I21.4", "I71.0", "K21.9"]),
            &reference(),
            &GradingConfig::default(),
        );
        assert!((grade.score - 100.0).abs() < 1e-9);
        assert!(grade.is_correct);
        assert!(grade.reference.iter().all(|r| r.matched));
    }

    #[test]
    fn displaced_entries_earn_partial_credit() {
        let grade = grade(
            &differential(&["I71.0", "I21.4", "K21.9"]),
            &reference(),
            &GradingConfig::default(),
        );
        // (2.0 * 0.9 + 1.0 * 0.9 + 1.0) / 4.0
        assert!((grade.score - 92.5).abs() < 1e-9);
        assert!(grade.is_correct);
    }

    #[test]
    fn missed_critical_is_penalised_and_incorrect() {
        let grade = grade(
            &differential(&["I21.4", "K21.9"]),
            &reference(),
            &GradingConfig::default(),
        );
        assert_eq!(grade.missed_critical, vec!["I71.0".to_string()]);
        assert!(!grade.is_correct);
        // base (2.0 + 1.0 * 0.9) / 4.0 = 0.725, then * 0.75
        assert!((grade.score - 54.375).abs() < 1e-9);
    }

    #[test]
    fn flagging_a_critical_avoids_the_penalty() {
        let mut dx = differential(&["I21.4", "K21.9"]);
        dx.critical_flagged.push("i71.0".into());
        let grade = grade(&dx, &reference(), &GradingConfig::default());
        assert!(grade.missed_critical.is_empty());
        assert!(grade.is_correct);
    }

    #[test]
    fn missing_leading_diagnosis_is_incorrect() {
        let grade = grade(
            &differential(&["I71.0", "K21.9"]),
            &reference(),
            &GradingConfig::default(),
        );
        assert!(!grade.is_correct);
        assert!(grade.score > 0.0);
    }

    #[test]
    fn empty_inputs_grade_zero() {
        let empty = grade(&differential(&[]), &[], &GradingConfig::default());
        assert_eq!(empty.score, 0.0);
        assert!(!empty.is_correct);

        let blank = grade(&differential(&[]), &reference(), &GradingConfig::default());
        assert_eq!(blank.score, 0.0);
        assert!(!blank.is_correct);
    }
}
