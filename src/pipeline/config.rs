//! Pipeline configuration files.
//!
//! A config is a versioned JSON document naming one strategy per stage.
//! Strategy choices are internally tagged enums, so an unknown name fails at
//! parse time rather than degrading to a no-op mid-run. Unknown keys are
//! rejected the same way:
//!
//! ```json
//! {
//!   "version": "0.1",
//!   "name": "house prices",
//!   "target": "price",
//!   "missing": { "method": "mean" },
//!   "features": { "transform": "onehot_encoding", "columns": ["city"] },
//!   "outliers": { "method": "iqr", "handling": "remove" },
//!   "split": { "test_fraction": 0.2, "seed": 42 },
//!   "model": { "strategy": "mean_baseline" }
//! }
//! ```

use super::orchestrator::Pipeline;
use crate::dataset::Value;
use crate::error::{PipelineError, Result, ResultExt as _};
use crate::stages::{
    Axis, DecisionTreeStrategy, DropStrategy, FeatureEngineer, FeatureSpec,
    FeatureTransformStrategy, FillStrategy, Iqr, LinearRegressionStrategy, LogTransform,
    MeanBaselineStrategy, MinMaxScale, MissingValueHandler, MissingValueStrategy,
    ModelBuildStrategy, ModelBuilder, OneHotEncode, OutlierDetector, OutlierHandling,
    OutlierStrategy, SimpleSplit, StandardScale, ZScore,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Current config version
pub const CONFIG_VERSION: &str = "0.1";

/// Root pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Config version for future migrations
    pub version: String,

    /// Human-readable pipeline name
    #[serde(default)]
    pub name: String,

    /// Column the model predicts
    pub target: String,

    pub missing: MissingConfig,
    pub features: FeatureConfig,
    pub outliers: OutlierConfig,

    #[serde(default)]
    pub split: SplitConfig,

    pub model: ModelConfig,
}

/// Missing-value stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case", deny_unknown_fields)]
pub enum MissingConfig {
    Drop {
        #[serde(default)]
        axis: Axis,

        /// Minimum non-missing cells to survive; absent means "no gaps"
        #[serde(default)]
        threshold: Option<usize>,
    },
    Mean,
    Median,
    Mode,
    Constant {
        #[serde(default)]
        value: Option<Value>,
    },
}

/// Keys the flattened sections accept; serde cannot deny unknown fields
/// next to `flatten`.
const FEATURE_KEYS: &[&str] = &["transform", "columns", "range"];
const OUTLIER_KEYS: &[&str] = &[
    "method",
    "handling",
    "columns",
    "threshold",
    "robust",
    "multiplier",
];

/// Feature engineering stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    #[serde(flatten)]
    pub transform: TransformConfig,
    pub columns: FeatureSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transform", rename_all = "snake_case")]
pub enum TransformConfig {
    Log,
    StandardScaling,
    MinmaxScaling {
        #[serde(default = "default_range")]
        range: (f64, f64),
    },
    OnehotEncoding,
}

/// Outlier stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    #[serde(flatten)]
    pub method: OutlierMethodConfig,
    pub handling: HandlingConfig,

    /// Columns to check; absent means every numeric column
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<FeatureSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum OutlierMethodConfig {
    Zscore {
        #[serde(default = "default_threshold")]
        threshold: f64,

        /// Median/MAD modified z-score instead of mean/std
        #[serde(default)]
        robust: bool,
    },
    Iqr {
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlingConfig {
    Remove,
    Cap,
}

/// Split stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SplitConfig {
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
        }
    }
}

/// Model stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case", deny_unknown_fields)]
pub enum ModelConfig {
    LinearRegression,
    DecisionTree {
        #[serde(default)]
        max_depth: Option<usize>,
    },
    MeanBaseline,
}

impl PipelineConfig {
    /// Load a pipeline config from a JSON file
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, otherwise as [`PipelineConfig::from_json`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config {}", path.display()))?;
        Self::from_json(&content)
    }

    /// Parse a pipeline config from a JSON string
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for malformed JSON, an unknown strategy name,
    /// an unknown key or a version other than [`CONFIG_VERSION`].
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: serde_json::Value =
            serde_json::from_str(json).context("parsing pipeline config")?;
        check_keys(&raw, "features", FEATURE_KEYS)?;
        check_keys(&raw, "outliers", OUTLIER_KEYS)?;
        let config: Self = serde_json::from_value(raw).context("parsing pipeline config")?;
        if config.version != CONFIG_VERSION {
            return Err(PipelineError::config(format!(
                "unsupported pipeline config version '{}', expected '{CONFIG_VERSION}'",
                config.version
            )));
        }
        Ok(config)
    }

    /// Serialize pipeline config to a JSON string
    ///
    /// # Errors
    ///
    /// Only if serialization itself fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Save pipeline config to a JSON file
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be written.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("writing pipeline config {}", path.display()))
    }

    /// Build the configured pipeline.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for parameters the strategies reject: a
    /// `constant` fill without a value, a bad min-max range, a non-positive
    /// outlier threshold, a test fraction outside (0, 1).
    pub fn build(&self) -> Result<Pipeline> {
        let outliers = OutlierDetector::from_boxed(self.outliers.method.strategy()?);
        let outliers = match &self.outliers.columns {
            Some(columns) => outliers.with_targets(columns.clone()),
            None => outliers,
        };
        Pipeline::builder()
            .missing_handler(MissingValueHandler::from_boxed(self.missing.strategy()?))
            .feature_engineer(
                FeatureEngineer::from_boxed(self.features.transform.strategy()?),
                self.features.columns.clone(),
            )
            .outlier_detector(outliers, self.outliers.handling.into())
            .split(SimpleSplit::new(self.split.test_fraction, self.split.seed)?)
            .model_builder(ModelBuilder::from_boxed(self.model.strategy()))
            .build()
            .with_context(|| format!("building pipeline '{}'", self.name))
    }
}

impl MissingConfig {
    fn strategy(&self) -> Result<Box<dyn MissingValueStrategy>> {
        let fill = match self {
            Self::Drop { axis, threshold } => {
                return Ok(Box::new(DropStrategy::new(*axis, *threshold)));
            }
            Self::Mean => FillStrategy::mean(),
            Self::Median => FillStrategy::median(),
            Self::Mode => FillStrategy::mode(),
            Self::Constant { value: Some(value) } => FillStrategy::constant(value.clone()),
            Self::Constant { value: None } => {
                return Err(PipelineError::config("constant fill needs a 'value'"));
            }
        };
        Ok(Box::new(fill))
    }
}

impl TransformConfig {
    fn strategy(&self) -> Result<Box<dyn FeatureTransformStrategy>> {
        let strategy: Box<dyn FeatureTransformStrategy> = match self {
            Self::Log => Box::new(LogTransform),
            Self::StandardScaling => Box::new(StandardScale),
            Self::MinmaxScaling { range: (low, high) } => Box::new(MinMaxScale::new(*low, *high)?),
            Self::OnehotEncoding => Box::new(OneHotEncode),
        };
        Ok(strategy)
    }
}

impl OutlierMethodConfig {
    fn strategy(&self) -> Result<Box<dyn OutlierStrategy>> {
        match *self {
            Self::Zscore { threshold, robust } => {
                if threshold.is_nan() || threshold <= 0.0 {
                    return Err(PipelineError::config(format!(
                        "z-score threshold must be positive, got {threshold}"
                    )));
                }
                let zscore = if robust {
                    ZScore::robust(threshold)
                } else {
                    ZScore::new(threshold)
                };
                Ok(Box::new(zscore))
            }
            Self::Iqr { multiplier } => {
                if multiplier.is_nan() || multiplier < 0.0 {
                    return Err(PipelineError::config(format!(
                        "IQR multiplier must be non-negative, got {multiplier}"
                    )));
                }
                Ok(Box::new(Iqr::with_multiplier(multiplier)))
            }
        }
    }
}

impl From<HandlingConfig> for OutlierHandling {
    fn from(handling: HandlingConfig) -> Self {
        match handling {
            HandlingConfig::Remove => Self::Remove,
            HandlingConfig::Cap => Self::Cap,
        }
    }
}

impl ModelConfig {
    fn strategy(self) -> Box<dyn ModelBuildStrategy> {
        match self {
            Self::LinearRegression => Box::new(LinearRegressionStrategy),
            Self::DecisionTree { max_depth } => Box::new(DecisionTreeStrategy::new(max_depth)),
            Self::MeanBaseline => Box::new(MeanBaselineStrategy),
        }
    }
}

fn check_keys(raw: &serde_json::Value, section: &str, allowed: &[&str]) -> Result<()> {
    let Some(fields) = raw.get(section).and_then(serde_json::Value::as_object) else {
        return Ok(());
    };
    match fields.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(PipelineError::config(format!(
            "unknown key '{key}' in '{section}', expected one of: {}",
            allowed.join(", ")
        ))),
        None => Ok(()),
    }
}

// Default value functions
fn default_range() -> (f64, f64) {
    (0.0, 1.0)
}

fn default_threshold() -> f64 {
    3.0
}

fn default_multiplier() -> f64 {
    1.5
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}
