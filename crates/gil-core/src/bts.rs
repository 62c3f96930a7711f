//! Bayesian Truth Serum peer-prediction scoring.
//!
//! Rewards a clinician for predicting the community's answer well and for
//! self-assessments that are both informative and later borne out by the
//! objective accuracy score. Each component has a base ceiling of
//! [`BTS_COMPONENT_BASE`] points scaled by its configured weight; with the
//! default weights the components top out at 10 / 20 / 15 / 10 and the
//! total at 55.

use serde::{Deserialize, Serialize};

use crate::config::{BtsConfig, BTS_COMPONENT_BASE};
use crate::error::EngineError;
use crate::model::{check_percentage, BtsReport, BtsScore, CommunityStatistic};

/// The uninformative self-assessment.
const MIDPOINT: f64 = 50.0;

/// Everything the score needs from one response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BtsInput {
    pub report: BtsReport,
    /// Objective clinical accuracy of the response (0-100).
    pub accuracy_score: f64,
}

impl BtsInput {
    pub fn new(report: BtsReport, accuracy_score: f64) -> Result<Self, EngineError> {
        Ok(Self {
            report,
            accuracy_score: check_percentage("accuracy_score", accuracy_score)?,
        })
    }
}

/// BTS scoring bound to a validated configuration.
#[derive(Debug, Clone, Copy)]
pub struct BtsEngine<'a> {
    config: &'a BtsConfig,
}

impl<'a> BtsEngine<'a> {
    pub fn new(config: &'a BtsConfig) -> Self {
        Self { config }
    }

    /// Whether a case has enough community samples to be scored.
    pub fn is_ready(&self, stats: &CommunityStatistic) -> bool {
        stats.sample_count >= self.config.min_responses
    }

    /// Score one response against the community aggregate for its case.
    ///
    /// Fails with [`EngineError::InsufficientData`] until the case has
    /// `min_responses` samples; callers record no score in that case.
    pub fn compute(
        &self,
        input: &BtsInput,
        stats: &CommunityStatistic,
    ) -> Result<BtsScore, EngineError> {
        if !self.is_ready(stats) {
            return Err(EngineError::InsufficientData {
                case_id: stats.case_id.clone(),
                sample_count: stats.sample_count,
                required: self.config.min_responses,
            });
        }

        let own = input.report.own_assessment();
        let peer = input.report.peer_prediction();
        let accuracy = input.accuracy_score;
        let community = stats.community_average.clamp(0.0, 100.0);

        let prediction_error = (peer - community).abs();
        let information = self.information(own, accuracy);
        let prediction = self.prediction(prediction_error);
        let accuracy_component = self.config.accuracy_max() * accuracy / 100.0;
        let insight = self.insight(own, community, accuracy);

        let total = (information + prediction + accuracy_component + insight)
            .clamp(0.0, self.config.total_max());

        tracing::debug!(
            case = %stats.case_id,
            own,
            peer,
            community,
            total,
            "bts score computed"
        );

        Ok(BtsScore {
            total,
            information,
            prediction,
            accuracy: accuracy_component,
            insight,
            prediction_error,
        })
    }

    /// Divergence from the midpoint, credited only when accuracy lands
    /// strictly on the same side and scaled by how close the two are. An
    /// accuracy of exactly 50 confirms no direction.
    fn information(&self, own: f64, accuracy: f64) -> f64 {
        let own_side = own - MIDPOINT;
        let accuracy_side = accuracy - MIDPOINT;
        if own_side * accuracy_side <= 0.0 {
            return 0.0;
        }
        let divergence = own_side.abs() / MIDPOINT;
        let calibration = 1.0 - (own - accuracy).abs() / 100.0;
        (self.config.information_max() * divergence * calibration)
            .clamp(0.0, self.config.information_max())
    }

    /// Linear in the prediction error, zero at the configured ceiling.
    fn prediction(&self, prediction_error: f64) -> f64 {
        let closeness = 1.0 - prediction_error / self.config.prediction_error_ceiling;
        self.config.prediction_max() * closeness.clamp(0.0, 1.0)
    }

    /// Contrarian-but-right bonus: paid only when the self-assessment sits
    /// strictly closer to the realised accuracy than the crowd does.
    fn insight(&self, own: f64, community: f64, accuracy: f64) -> f64 {
        if (own - accuracy).abs() >= (community - accuracy).abs() {
            return 0.0;
        }
        let divergence =
            ((own - community).abs() / self.config.insight_divergence_scale).min(1.0);
        self.config.insight_max() * divergence * accuracy / 100.0
    }

    /// Sum of the component ceilings under the active weights.
    pub fn max_total(&self) -> f64 {
        BTS_COMPONENT_BASE * self.config.weights.sum()
    }
}
