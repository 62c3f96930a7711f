//! Item Response Theory engine.
//!
//! Three-parameter logistic model:
//!
//! ```text
//! P(θ) = c + (1 - c) / (1 + exp(-a(θ - b)))
//! ```
//!
//! Ability is re-estimated after every response by a Bayesian modal (MAP)
//! update: the current estimate `N(θ, se²)` acts as the prior, the single
//! response supplies the likelihood, and Fisher scoring finds the posterior
//! mode. The posterior precision is the prior precision plus the item's
//! Fisher information, so the standard error can only shrink.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::IrtConfig;
use crate::error::EngineError;
use crate::model::{AbilityProfile, IrtParameters, Item};

/// Probabilities are kept inside [ε, 1 - ε].
pub const PROBABILITY_EPSILON: f64 = 1e-9;

/// Discriminations at or below this are treated as corrupt.
pub const MIN_DISCRIMINATION: f64 = 1e-6;

/// Floor applied to a stored standard error before taking its reciprocal.
const MIN_STANDARD_ERROR: f64 = 1e-6;

const MAX_SCORING_ITERATIONS: usize = 25;
const SCORING_TOLERANCE: f64 = 1e-7;

/// Logistic function, evaluated without overflowing `exp`.
fn logistic(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let ex = x.exp();
        ex / (1.0 + ex)
    }
}

fn clamp_probability(p: f64) -> f64 {
    // f64::max discards NaN, so a NaN collapses to the lower bound.
    p.max(PROBABILITY_EPSILON).min(1.0 - PROBABILITY_EPSILON)
}

/// Probability of a correct response at ability `theta`.
pub fn probability(theta: f64, params: &IrtParameters) -> f64 {
    let c = params.guessing_floor();
    let z = params.discrimination * (theta - params.difficulty);
    clamp_probability(c + (1.0 - c) * logistic(z))
}

/// Fisher information of an item at ability `theta`.
///
/// `a² (P - c)² (1 - P) / ((1 - c)² P)`, which reduces to `a² P (1 - P)`
/// without guessing.
pub fn fisher_information(theta: f64, params: &IrtParameters) -> f64 {
    let a = params.discrimination;
    let c = params.guessing_floor();
    let p = probability(theta, params);
    let lifted = (p - c).max(0.0) / (1.0 - c);
    a * a * lifted * lifted * (1.0 - p) / p
}

/// Derivative of the log-likelihood of one observed response.
fn score_function(theta: f64, params: &IrtParameters, is_correct: bool) -> f64 {
    let a = params.discrimination;
    let c = params.guessing_floor();
    let p = probability(theta, params);
    let u = if is_correct { 1.0 } else { 0.0 };
    a * (u - p) * (p - c).max(0.0) / (p * (1.0 - c))
}

/// Reject parameters the model cannot score.
pub fn validate_item(item: &Item) -> Result<(), EngineError> {
    let params = &item.parameters;
    if !params.discrimination.is_finite() || params.discrimination <= MIN_DISCRIMINATION {
        return Err(EngineError::data_integrity(
            &item.id,
            format!(
                "discrimination must be positive, got {}",
                params.discrimination
            ),
        ));
    }
    if !params.difficulty.is_finite() {
        return Err(EngineError::data_integrity(
            &item.id,
            format!("difficulty must be finite, got {}", params.difficulty),
        ));
    }
    if let Some(c) = params.guessing {
        if !(c.is_finite() && (0.0..1.0).contains(&c)) {
            return Err(EngineError::data_integrity(
                &item.id,
                format!("guessing must lie in [0, 1), got {c}"),
            ));
        }
    }
    Ok(())
}

/// Result of one sequential ability update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AbilityUpdate {
    pub previous_theta: f64,
    pub theta: f64,
    pub previous_standard_error: f64,
    pub standard_error: f64,
    /// Fisher information the item contributed at the new estimate.
    pub information: f64,
}

/// Why adaptive testing stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Standard error target reached after the minimum number of items.
    Converged,
    /// Item cap reached.
    MaxItems,
}

/// IRT operations bound to a validated configuration.
#[derive(Debug, Clone, Copy)]
pub struct IrtEngine<'a> {
    config: &'a IrtConfig,
}

impl<'a> IrtEngine<'a> {
    pub fn new(config: &'a IrtConfig) -> Self {
        Self { config }
    }

    fn clamp_theta(&self, theta: f64) -> f64 {
        if theta.is_nan() {
            return self.config.initial_theta;
        }
        theta.clamp(self.config.theta_min, self.config.theta_max)
    }

    /// Posterior mode of `N(prior_mean, 1/prior_precision)` times the likelihood
    /// of `observations`, found by Fisher scoring.
    fn posterior_mode(
        &self,
        prior_mean: f64,
        prior_precision: f64,
        observations: &[(&IrtParameters, bool)],
    ) -> (f64, f64) {
        let mut theta = prior_mean;
        for _ in 0..MAX_SCORING_ITERATIONS {
            let mut gradient = -prior_precision * (theta - prior_mean);
            let mut information = prior_precision;
            for (params, is_correct) in observations {
                gradient += score_function(theta, params, *is_correct);
                information += fisher_information(theta, params);
            }
            let step = gradient / information;
            let next = self.clamp_theta(theta + step);
            let moved = (next - theta).abs();
            theta = next;
            if moved < SCORING_TOLERANCE {
                break;
            }
        }

        let information = prior_precision
            + observations
                .iter()
                .map(|(params, _)| fisher_information(theta, params))
                .sum::<f64>();
        (theta, information)
    }

    /// One sequential re-estimation step for a single observed response.
    pub fn estimate_update(
        &self,
        profile: &AbilityProfile,
        item: &Item,
        is_correct: bool,
    ) -> Result<AbilityUpdate, EngineError> {
        validate_item(item)?;

        let previous_theta = self.clamp_theta(profile.theta);
        let previous_se = if profile.standard_error.is_finite() {
            profile.standard_error.max(MIN_STANDARD_ERROR)
        } else {
            self.config.initial_se
        };
        let prior_precision = 1.0 / (previous_se * previous_se);

        let (theta, posterior_precision) = self.posterior_mode(
            previous_theta,
            prior_precision,
            &[(&item.parameters, is_correct)],
        );
        let standard_error = (1.0 / posterior_precision.sqrt()).min(previous_se);

        tracing::debug!(
            item = %item.id,
            is_correct,
            previous_theta,
            theta,
            previous_se,
            standard_error,
            "ability updated"
        );

        Ok(AbilityUpdate {
            previous_theta,
            theta,
            previous_standard_error: previous_se,
            standard_error,
            information: posterior_precision - prior_precision,
        })
    }

    /// Run [`estimate_update`](Self::estimate_update) and write the result back.
    pub fn apply_update(
        &self,
        profile: &mut AbilityProfile,
        item: &Item,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<AbilityUpdate, EngineError> {
        let update = self.estimate_update(profile, item, is_correct)?;
        profile.theta = update.theta;
        profile.standard_error = update.standard_error;
        profile.num_assessments += 1;
        profile.last_updated = now;
        Ok(update)
    }

    /// Re-estimate ability from a whole response history under the configured
    /// prior. Used to audit or resynchronise a stored profile.
    pub fn reestimate(&self, history: &[(&Item, bool)]) -> Result<(f64, f64), EngineError> {
        for (item, _) in history {
            validate_item(item)?;
        }
        let observations: Vec<(&IrtParameters, bool)> = history
            .iter()
            .map(|(item, is_correct)| (&item.parameters, *is_correct))
            .collect();

        let prior_precision = 1.0 / (self.config.initial_se * self.config.initial_se);
        let (theta, precision) =
            self.posterior_mode(self.config.initial_theta, prior_precision, &observations);
        Ok((theta, 1.0 / precision.sqrt()))
    }

    /// Pick the unanswered item in the profile's domain whose difficulty is
    /// closest to theta.
    ///
    /// Items failing [`validate_item`] are skipped with a warning. Ties on
    /// distance go to the item with the higher Fisher information, then to
    /// the lexicographically smallest id. `None` means the bank is exhausted
    /// for this session.
    pub fn select_next_item<'i>(
        &self,
        profile: &AbilityProfile,
        candidates: &'i [Item],
        answered_ids: &HashSet<String>,
    ) -> Option<&'i Item> {
        let theta = self.clamp_theta(profile.theta);

        candidates
            .iter()
            .filter(|item| item.is_active && item.domain == profile.domain)
            .filter(|item| !answered_ids.contains(&item.id))
            .filter(|item| match validate_item(item) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("skipping item: {e}");
                    false
                }
            })
            .map(|item| {
                let info = fisher_information(theta, &item.parameters);
                let distance = (item.parameters.difficulty - theta).abs();
                (item, info, distance)
            })
            .max_by(|(a, info_a, dist_a), (b, info_b, dist_b)| {
                dist_b
                    .total_cmp(dist_a)
                    .then_with(|| info_a.total_cmp(info_b))
                    .then_with(|| b.id.cmp(&a.id))
            })
            .map(|(item, _, _)| item)
    }

    /// Stopping rule over an explicit item count and standard error.
    pub fn stop_reason(&self, administered: u32, standard_error: f64) -> Option<StopReason> {
        if administered >= self.config.min_items && standard_error <= self.config.target_se {
            Some(StopReason::Converged)
        } else if administered >= self.config.max_items {
            Some(StopReason::MaxItems)
        } else {
            None
        }
    }

    /// Whether testing should stop for this profile.
    pub fn should_stop(&self, profile: &AbilityProfile) -> bool {
        self.stop_reason(profile.num_assessments, profile.standard_error)
            .is_some()
    }
}
