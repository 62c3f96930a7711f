//! Engine configuration, startup validation and loading.
//!
//! The configuration is built once at process start, validated, and then
//! handed to the engines by reference. Nothing inside the algorithmic core
//! reads the environment or the filesystem.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Base ceiling of every BTS component before weighting.
pub const BTS_COMPONENT_BASE: f64 = 10.0;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub irt: IrtConfig,
    #[serde(default)]
    pub bts: BtsConfig,
    #[serde(default)]
    pub grading: GradingConfig,
}

/// Adaptive testing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrtConfig {
    /// Minimum items before the standard-error target may stop a session.
    #[serde(default = "default_min_items")]
    pub min_items: u32,
    /// Hard cap on items per session.
    #[serde(default = "default_max_items")]
    pub max_items: u32,
    /// Standard error at which the estimate counts as converged.
    #[serde(default = "default_target_se")]
    pub target_se: f64,
    /// Theta assigned to a freshly created profile.
    #[serde(default)]
    pub initial_theta: f64,
    /// Standard error assigned to a freshly created profile.
    #[serde(default = "default_initial_se")]
    pub initial_se: f64,
    #[serde(default = "default_theta_min")]
    pub theta_min: f64,
    #[serde(default = "default_theta_max")]
    pub theta_max: f64,
}

fn default_min_items() -> u32 {
    3
}
fn default_max_items() -> u32 {
    10
}
fn default_target_se() -> f64 {
    0.35
}
fn default_initial_se() -> f64 {
    1.0
}
fn default_theta_min() -> f64 {
    -4.0
}
fn default_theta_max() -> f64 {
    4.0
}

impl Default for IrtConfig {
    fn default() -> Self {
        Self {
            min_items: default_min_items(),
            max_items: default_max_items(),
            target_se: default_target_se(),
            initial_theta: 0.0,
            initial_se: default_initial_se(),
            theta_min: default_theta_min(),
            theta_max: default_theta_max(),
        }
    }
}

/// Component weights for the Bayesian Truth Serum score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BtsWeights {
    #[serde(default = "default_weight_information")]
    pub information: f64,
    #[serde(default = "default_weight_prediction")]
    pub prediction: f64,
    #[serde(default = "default_weight_accuracy")]
    pub accuracy: f64,
    #[serde(default = "default_weight_insight")]
    pub insight: f64,
}

fn default_weight_information() -> f64 {
    1.0
}
fn default_weight_prediction() -> f64 {
    2.0
}
fn default_weight_accuracy() -> f64 {
    1.5
}
fn default_weight_insight() -> f64 {
    1.0
}

impl Default for BtsWeights {
    fn default() -> Self {
        Self {
            information: default_weight_information(),
            prediction: default_weight_prediction(),
            accuracy: default_weight_accuracy(),
            insight: default_weight_insight(),
        }
    }
}

impl BtsWeights {
    fn as_array(&self) -> [(&'static str, f64); 4] {
        [
            ("information", self.information),
            ("prediction", self.prediction),
            ("accuracy", self.accuracy),
            ("insight", self.insight),
        ]
    }

    /// Sum of the weights.
    pub fn sum(&self) -> f64 {
        self.information + self.prediction + self.accuracy + self.insight
    }
}

/// Peer-prediction scoring parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BtsConfig {
    /// Community samples required before a case can be BTS-scored.
    #[serde(default = "default_min_responses")]
    pub min_responses: u32,
    #[serde(default)]
    pub weights: BtsWeights,
    /// Prediction error at which the prediction component reaches zero.
    #[serde(default = "default_fifty")]
    pub prediction_error_ceiling: f64,
    /// Divergence from the community average that earns the full insight bonus.
    #[serde(default = "default_fifty")]
    pub insight_divergence_scale: f64,
}

fn default_min_responses() -> u32 {
    5
}
fn default_fifty() -> f64 {
    50.0
}

impl Default for BtsConfig {
    fn default() -> Self {
        Self {
            min_responses: default_min_responses(),
            weights: BtsWeights::default(),
            prediction_error_ceiling: default_fifty(),
            insight_divergence_scale: default_fifty(),
        }
    }
}

impl BtsConfig {
    pub fn information_max(&self) -> f64 {
        BTS_COMPONENT_BASE * self.weights.information
    }

    pub fn prediction_max(&self) -> f64 {
        BTS_COMPONENT_BASE * self.weights.prediction
    }

    pub fn accuracy_max(&self) -> f64 {
        BTS_COMPONENT_BASE * self.weights.accuracy
    }

    pub fn insight_max(&self) -> f64 {
        BTS_COMPONENT_BASE * self.weights.insight
    }

    /// Upper clamp bound for the total score under the active weights.
    pub fn total_max(&self) -> f64 {
        BTS_COMPONENT_BASE * self.weights.sum()
    }
}

/// Clinical accuracy grading parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingConfig {
    /// Fraction of the score removed per missed critical diagnosis.
    #[serde(default = "default_critical_penalty")]
    pub critical_miss_penalty: f64,
}

fn default_critical_penalty() -> f64 {
    0.25
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            critical_miss_penalty: default_critical_penalty(),
        }
    }
}

impl EngineConfig {
    /// Check every bound. Called once at startup; a failure is fatal.
    pub fn validate(&self) -> Result<(), EngineError> {
        let irt = &self.irt;
        let fail = |msg: String| -> Result<(), EngineError> { Err(EngineError::Configuration(msg)) };

        if irt.min_items == 0 {
            return fail("irt.min_items must be at least 1".into());
        }
        if irt.min_items > irt.max_items {
            return fail(format!(
                "irt.min_items ({}) exceeds irt.max_items ({})",
                irt.min_items, irt.max_items
            ));
        }
        if !(irt.target_se.is_finite() && irt.target_se > 0.0) {
            return fail(format!("irt.target_se must be positive, got {}", irt.target_se));
        }
        if !(irt.initial_se.is_finite() && irt.initial_se > 0.0) {
            return fail(format!(
                "irt.initial_se must be positive, got {}",
                irt.initial_se
            ));
        }
        if !(irt.theta_min.is_finite() && irt.theta_max.is_finite())
            || irt.theta_min >= irt.theta_max
        {
            return fail(format!(
                "theta range [{}, {}] is empty",
                irt.theta_min, irt.theta_max
            ));
        }
        if !(irt.theta_min..=irt.theta_max).contains(&irt.initial_theta) {
            return fail(format!(
                "irt.initial_theta ({}) lies outside [{}, {}]",
                irt.initial_theta, irt.theta_min, irt.theta_max
            ));
        }

        let bts = &self.bts;
        for (name, weight) in bts.weights.as_array() {
            if !(weight.is_finite() && weight >= 0.0) {
                return fail(format!("bts.weights.{name} must be a non-negative number"));
            }
        }
        if !(bts.prediction_error_ceiling.is_finite() && bts.prediction_error_ceiling > 0.0) {
            return fail("bts.prediction_error_ceiling must be positive".into());
        }
        if !(bts.insight_divergence_scale.is_finite() && bts.insight_divergence_scale > 0.0) {
            return fail("bts.insight_divergence_scale must be positive".into());
        }

        let penalty = self.grading.critical_miss_penalty;
        if !(0.0..=1.0).contains(&penalty) {
            return fail(format!(
                "grading.critical_miss_penalty must lie in [0, 1], got {penalty}"
            ));
        }

        Ok(())
    }
}

/// Load configuration from well-known paths and validate it.
///
/// Search order:
/// 1. `gil.toml` in the current directory
/// 2. `~/.config/gil/config.toml`
///
/// Environment overrides (`GIL_IRT_MIN_ITEMS`, `GIL_BTS_WEIGHT_PREDICTION`, ...)
/// are applied on top of the file.
pub fn load_config() -> Result<EngineConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<EngineConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from("gil.toml");
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<EngineConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;

    tracing::debug!(?config, "engine configuration loaded");
    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("gil"))
}

/// Apply `GIL_*` overrides using the given lookup.
fn apply_env_overrides<F>(config: &mut EngineConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
        raw.trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("invalid value for {key}: '{raw}'"))
    }

    if let Some(v) = lookup("GIL_IRT_MIN_ITEMS") {
        config.irt.min_items = parse("GIL_IRT_MIN_ITEMS", &v)?;
    }
    if let Some(v) = lookup("GIL_IRT_MAX_ITEMS") {
        config.irt.max_items = parse("GIL_IRT_MAX_ITEMS", &v)?;
    }
    if let Some(v) = lookup("GIL_IRT_TARGET_SE") {
        config.irt.target_se = parse("GIL_IRT_TARGET_SE", &v)?;
    }
    if let Some(v) = lookup("GIL_IRT_INITIAL_THETA") {
        config.irt.initial_theta = parse("GIL_IRT_INITIAL_THETA", &v)?;
    }
    if let Some(v) = lookup("GIL_BTS_MIN_RESPONSES") {
        config.bts.min_responses = parse("GIL_BTS_MIN_RESPONSES", &v)?;
    }

    let weights = &mut config.bts.weights;
    for (key, slot) in [
        ("GIL_BTS_WEIGHT_INFORMATION", &mut weights.information),
        ("GIL_BTS_WEIGHT_PREDICTION", &mut weights.prediction),
        ("GIL_BTS_WEIGHT_ACCURACY", &mut weights.accuracy),
        ("GIL_BTS_WEIGHT_INSIGHT", &mut weights.insight),
    ] {
        if let Some(v) = lookup(key) {
            *slot = parse(key, &v)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_match_platform_settings() {
        let config = EngineConfig::default();
        assert_eq!(config.irt.min_items, 3);
        assert_eq!(config.irt.max_items, 10);
        assert!((config.irt.target_se - 0.35).abs() < f64::EPSILON);
        assert_eq!(config.bts.min_responses, 5);
        assert!((config.bts.total_max() - 55.0).abs() < 1e-9);
        assert!((config.bts.prediction_max() - 20.0).abs() < 1e-9);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn min_above_max_is_configuration_error() {
        let mut config = EngineConfig::default();
        config.irt.min_items = 12;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
        assert!(err.to_string().contains("exceeds"));
    }

    #[test]
    fn negative_weight_rejected() {
        let mut config = EngineConfig::default();
        config.bts.weights.insight = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn initial_theta_outside_range_rejected() {
        let mut config = EngineConfig::default();
        config.irt.initial_theta = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let toml_str = r#"
[irt]
min_items = 5
max_items = 20

[bts.weights]
prediction = 3.0
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.irt.min_items, 5);
        assert_eq!(config.irt.max_items, 20);
        assert!((config.irt.target_se - 0.35).abs() < f64::EPSILON);
        assert!((config.bts.weights.prediction - 3.0).abs() < f64::EPSILON);
        assert!((config.bts.weights.accuracy - 1.5).abs() < f64::EPSILON);
        assert!((config.bts.total_max() - 65.0).abs() < 1e-9);
    }

    #[test]
    fn env_overrides_apply() {
        let env: HashMap<&str, &str> = [
            ("GIL_IRT_MAX_ITEMS", "15"),
            ("GIL_BTS_MIN_RESPONSES", "8"),
            ("GIL_BTS_WEIGHT_INSIGHT", "0.5"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        apply_env_overrides(&mut config, |k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.irt.max_items, 15);
        assert_eq!(config.bts.min_responses, 8);
        assert!((config.bts.weights.insight - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn env_override_with_garbage_fails() {
        let mut config = EngineConfig::default();
        let result = apply_env_overrides(&mut config, |k| {
            (k == "GIL_IRT_TARGET_SE").then(|| "tight".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn load_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gil.toml");
        std::fs::write(&path, "[irt]\nmin_items = 4\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.irt.min_items, 4);
    }

    #[test]
    fn load_rejects_invalid_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gil.toml");
        std::fs::write(&path, "[irt]\nmin_items = 11\nmax_items = 10\n").unwrap();
        let err = load_config_from(Some(&path)).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn load_missing_explicit_path_fails() {
        assert!(load_config_from(Some(Path::new("/nonexistent/gil.toml"))).is_err());
    }
}
