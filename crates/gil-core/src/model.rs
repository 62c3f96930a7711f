//! Core data model types for the assessment engine.
//!
//! Items and reference differentials are read-only inputs; ability profiles,
//! response records and community statistics are the state the engines
//! produce. Value objects check their ranges at construction.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::IrtConfig;
use crate::error::EngineError;

/// IRT parameters of a single item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IrtParameters {
    /// Location on the theta scale (b).
    pub difficulty: f64,
    /// Slope of the response curve (a). Must be positive.
    pub discrimination: f64,
    /// Lower asymptote (c). Absent means the 2PL model.
    #[serde(default)]
    pub guessing: Option<f64>,
}

impl IrtParameters {
    pub fn new(difficulty: f64, discrimination: f64) -> Self {
        Self {
            difficulty,
            discrimination,
            guessing: None,
        }
    }

    pub fn with_guessing(mut self, guessing: f64) -> Self {
        self.guessing = Some(guessing);
        self
    }

    /// Lower asymptote, 0 when the item has no guessing parameter.
    pub fn guessing_floor(&self) -> f64 {
        self.guessing.unwrap_or(0.0)
    }
}

/// One diagnosis of an expert reference differential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceDiagnosis {
    /// Diagnosis code (e.g. ICD-10).
    pub code: String,
    pub name: String,
    /// 1 = most likely.
    pub rank: u32,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// "Not-to-miss" diagnosis.
    #[serde(default)]
    pub is_critical: bool,
}

fn default_weight() -> f64 {
    1.0
}

/// A clinical case vignette with its IRT calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Unique case identifier.
    pub id: String,
    /// Short human-readable title.
    #[serde(default)]
    pub title: String,
    /// Clinical domain tag (e.g. "cardiology").
    pub domain: String,
    pub parameters: IrtParameters,
    /// Expert differential the response is graded against.
    #[serde(default)]
    pub reference_differential: Vec<ReferenceDiagnosis>,
    /// Retired items stay in the bank but are never selected.
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl Item {
    pub fn new(id: impl Into<String>, domain: impl Into<String>, parameters: IrtParameters) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            domain: domain.into(),
            parameters,
            reference_differential: Vec::new(),
            is_active: true,
        }
    }

    pub fn with_reference(mut self, reference: Vec<ReferenceDiagnosis>) -> Self {
        self.reference_differential = reference;
        self
    }
}

/// Self-reported certainty of a differential entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "high"),
            Confidence::Medium => write!(f, "medium"),
            Confidence::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Confidence::High),
            "medium" | "med" => Ok(Confidence::Medium),
            "low" => Ok(Confidence::Low),
            other => Err(format!("unknown confidence level: {other}")),
        }
    }
}

/// One line of a clinician's differential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisEntry {
    pub code: String,
    pub name: String,
    pub confidence: Confidence,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// A clinician's ranked differential diagnosis for a case.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DifferentialDiagnosis {
    /// Ordered most likely first.
    pub entries: Vec<DiagnosisEntry>,
    /// Codes the clinician explicitly flagged as not-to-miss.
    #[serde(default)]
    pub critical_flagged: Vec<String>,
}

impl DifferentialDiagnosis {
    /// 1-based position of a diagnosis code in the differential.
    pub fn position_of(&self, code: &str) -> Option<u32> {
        self.entries
            .iter()
            .position(|e| e.code.eq_ignore_ascii_case(code))
            .map(|i| i as u32 + 1)
    }

    pub fn is_flagged(&self, code: &str) -> bool {
        self.critical_flagged
            .iter()
            .any(|c| c.eq_ignore_ascii_case(code))
    }
}

/// Running ability estimate of one user in one domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityProfile {
    pub user_id: String,
    pub domain: String,
    /// Latent ability estimate.
    pub theta: f64,
    /// Uncertainty of `theta`. Never negative.
    pub standard_error: f64,
    /// Responses that have updated this profile.
    pub num_assessments: u32,
    pub last_updated: DateTime<Utc>,
}

impl AbilityProfile {
    /// A fresh profile with the configured prior.
    pub fn new(user_id: impl Into<String>, domain: impl Into<String>, irt: &IrtConfig) -> Self {
        Self {
            user_id: user_id.into(),
            domain: domain.into(),
            theta: irt.initial_theta,
            standard_error: irt.initial_se,
            num_assessments: 0,
            last_updated: Utc::now(),
        }
    }
}

#[derive(Deserialize)]
struct RawBtsReport {
    own_assessment: f64,
    peer_prediction: f64,
}

/// A user's self-assessment and prediction of the community answer, both on 0-100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBtsReport")]
pub struct BtsReport {
    own_assessment: f64,
    peer_prediction: f64,
}

impl BtsReport {
    pub fn new(own_assessment: f64, peer_prediction: f64) -> Result<Self, EngineError> {
        Ok(Self {
            own_assessment: check_percentage("own_assessment", own_assessment)?,
            peer_prediction: check_percentage("peer_prediction", peer_prediction)?,
        })
    }

    pub fn own_assessment(&self) -> f64 {
        self.own_assessment
    }

    pub fn peer_prediction(&self) -> f64 {
        self.peer_prediction
    }
}

impl TryFrom<RawBtsReport> for BtsReport {
    type Error = EngineError;

    fn try_from(raw: RawBtsReport) -> Result<Self, Self::Error> {
        BtsReport::new(raw.own_assessment, raw.peer_prediction)
    }
}

/// Reject values outside [0, 100].
pub fn check_percentage(field: &str, value: f64) -> Result<f64, EngineError> {
    if value.is_finite() && (0.0..=100.0).contains(&value) {
        Ok(value)
    } else {
        Err(EngineError::InvalidInput(format!(
            "{field} must lie in [0, 100], got {value}"
        )))
    }
}

/// Four-part peer-prediction score attached to one response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BtsScore {
    pub total: f64,
    pub information: f64,
    pub prediction: f64,
    pub accuracy: f64,
    pub insight: f64,
    /// |peer_prediction - community_average|
    pub prediction_error: f64,
}

/// Community aggregate of self-assessments for one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityStatistic {
    pub case_id: String,
    /// Mean own_assessment over all samples.
    pub community_average: f64,
    /// Mean peer_prediction over all samples.
    pub mean_peer_prediction: f64,
    pub sample_count: u32,
    /// Incremented on every recorded sample.
    pub version: u64,
}

impl CommunityStatistic {
    pub fn empty(case_id: impl Into<String>) -> Self {
        Self {
            case_id: case_id.into(),
            community_average: 0.0,
            mean_peer_prediction: 0.0,
            sample_count: 0,
            version: 0,
        }
    }
}

/// A scored, immutable response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub id: Uuid,
    pub case_id: String,
    pub user_id: String,
    pub domain: String,
    pub differential: DifferentialDiagnosis,
    #[serde(default)]
    pub bts_report: Option<BtsReport>,
    /// Seconds spent on the case.
    pub time_spent: u32,
    pub is_correct: bool,
    /// Clinical accuracy score (0-100).
    pub score: f64,
    /// Ability estimate after this response.
    pub theta_estimate: f64,
    /// Standard error after this response.
    pub standard_error: f64,
    #[serde(default)]
    pub bts_score: Option<BtsScore>,
    pub created_at: DateTime<Utc>,
}
