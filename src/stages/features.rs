//! Feature engineering.
//!
//! Strategies rewrite the columns named by a [`FeatureSpec`]. The spec is
//! checked against the dataset when the transform runs, not when it is built,
//! so the same engine can be pointed at datasets with different schemas.
//!
//! | strategy            | targets      | fails with                          |
//! |---------------------|--------------|-------------------------------------|
//! | [`LogTransform`]    | numeric      | `Domain` if any value is below -1   |
//! | [`StandardScale`]   | numeric      | `Domain` on zero variance           |
//! | [`MinMaxScale`]     | numeric      | `Domain` on a constant column       |
//! | [`OneHotEncode`]    | categorical  | `InvalidConfiguration` on name clash|
//!
//! Statistics are always recomputed from the input being transformed, then
//! applied as Polars expressions. Missing cells pass through untouched and are
//! left out of statistics.

use super::report::{Stage, StageOutput, StageRecorder};
use crate::dataset::{ColumnKind, TabularDataset};
use crate::error::{PipelineError, Result, StageWarning};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// The columns a feature strategy acts on.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSpec(Vec<String>);

impl FeatureSpec {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self(columns.into_iter().map(Into::into).collect())
    }

    pub fn columns(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the spec against a dataset's actual columns.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] for an empty spec, a
    /// duplicated name, or a name the dataset does not have.
    pub fn validate(&self, dataset: &TabularDataset) -> Result<()> {
        if self.0.is_empty() {
            return Err(PipelineError::config("feature spec names no columns"));
        }
        let mut seen = HashSet::new();
        for name in &self.0 {
            if !seen.insert(name.as_str()) {
                return Err(PipelineError::config(format!(
                    "feature spec lists column '{name}' more than once"
                )));
            }
            if !dataset.contains(name) {
                return Err(PipelineError::config(format!(
                    "feature spec column '{name}' not found in dataset"
                )));
            }
        }
        Ok(())
    }
}

/// Behaviour contract for feature transforms.
pub trait FeatureTransformStrategy: Send + Sync {
    fn describe(&self) -> String;

    /// Transform the columns named by `features`.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for a bad feature spec, `TypeMismatch` for a
    /// column of the wrong kind, `Domain` for a violated numeric precondition.
    fn transform(
        &self,
        dataset: TabularDataset,
        features: &FeatureSpec,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<TabularDataset>;
}

/// Rewrite each targeted numeric column in place. `prepare` sees the column
/// name and its values and returns the expression that replaces it.
fn map_numeric_features(
    dataset: TabularDataset,
    features: &FeatureSpec,
    warnings: &mut Vec<StageWarning>,
    mut prepare: impl FnMut(&str, &Float64Chunked) -> Result<Expr>,
) -> Result<TabularDataset> {
    features.validate(&dataset)?;
    let mut exprs = Vec::with_capacity(features.columns().len());
    for name in features.columns() {
        let values = dataset.numeric(name)?;
        let missing = values.null_count();
        if missing > 0 {
            warnings.push(StageWarning::for_column(
                name.as_str(),
                format!("{missing} missing value(s) passed through untransformed"),
            ));
        }
        exprs.push(prepare(name, values)?.alias(name.as_str()));
    }
    dataset.with_exprs(exprs)
}

/// `ln(1 + x)`, tolerating zeros but not values below -1.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTransform;

impl FeatureTransformStrategy for LogTransform {
    fn describe(&self) -> String {
        "log".to_owned()
    }

    fn transform(
        &self,
        dataset: TabularDataset,
        features: &FeatureSpec,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<TabularDataset> {
        map_numeric_features(dataset, features, warnings, |name, values| {
            if let Some(min) = values.min()
                && min < -1.0
            {
                return Err(PipelineError::domain(
                    name,
                    format!("value {min} is below -1; log(1 + x) is undefined"),
                ));
            }
            Ok(col(name).log1p())
        })
    }
}

/// Z-score scaling with the population standard deviation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardScale;

impl FeatureTransformStrategy for StandardScale {
    fn describe(&self) -> String {
        "standard_scaling".to_owned()
    }

    fn transform(
        &self,
        dataset: TabularDataset,
        features: &FeatureSpec,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<TabularDataset> {
        map_numeric_features(dataset, features, warnings, |name, values| {
            let (Some(mean), Some(std)) = (values.mean(), values.std(0)) else {
                return Err(PipelineError::domain(name, "no values to compute mean/std"));
            };
            if std == 0.0 {
                return Err(PipelineError::domain(
                    name,
                    "standard deviation is zero; cannot scale",
                ));
            }
            Ok((col(name) - lit(mean)) / lit(std))
        })
    }
}

/// Rescale into `[low, high]` using each column's own min and max.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinMaxScale {
    low: f64,
    high: f64,
}

impl MinMaxScale {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] unless both bounds are
    /// finite and `low < high`.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(PipelineError::config(format!(
                "min-max range must satisfy low < high, got ({low}, {high})"
            )));
        }
        Ok(Self { low, high })
    }

    pub fn range(&self) -> (f64, f64) {
        (self.low, self.high)
    }
}

impl Default for MinMaxScale {
    fn default() -> Self {
        Self {
            low: 0.0,
            high: 1.0,
        }
    }
}

impl FeatureTransformStrategy for MinMaxScale {
    fn describe(&self) -> String {
        format!("minmax_scaling({}, {})", self.low, self.high)
    }

    fn transform(
        &self,
        dataset: TabularDataset,
        features: &FeatureSpec,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<TabularDataset> {
        let (low, high) = (self.low, self.high);
        map_numeric_features(dataset, features, warnings, move |name, values| {
            let (Some(min), Some(max)) = (values.min(), values.max()) else {
                return Err(PipelineError::domain(name, "no values to compute min/max"));
            };
            if min == max {
                return Err(PipelineError::domain(
                    name,
                    format!("column is constant ({min}); cannot rescale"),
                ));
            }
            Ok((col(name) - lit(min)) / lit(max - min) * lit(high - low) + lit(low))
        })
    }
}

/// Drop-first one-hot encoding over the sorted observed categories.
///
/// A column with k categories becomes k-1 `0/1` columns named
/// `<column>_<category>`, appended after the remaining columns. A row of the
/// first category is all zeros; a missing label gives missing indicators.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneHotEncode;

impl FeatureTransformStrategy for OneHotEncode {
    fn describe(&self) -> String {
        "onehot_encoding".to_owned()
    }

    fn transform(
        &self,
        dataset: TabularDataset,
        features: &FeatureSpec,
        _warnings: &mut Vec<StageWarning>,
    ) -> Result<TabularDataset> {
        features.validate(&dataset)?;
        let mut created = HashSet::new();
        let mut indicators = Vec::new();
        for name in features.columns() {
            let series = dataset.require(name)?;
            if ColumnKind::of(series) != ColumnKind::Categorical {
                return Err(PipelineError::type_mismatch(
                    name.as_str(),
                    ColumnKind::Categorical.as_str(),
                    ColumnKind::Numeric.as_str(),
                ));
            }
            let categories = series.drop_nulls().unique()?.sort(SortOptions::default())?;
            for category in categories.str()?.into_iter().flatten().skip(1) {
                let indicator = format!("{name}_{category}");
                let clashes = dataset.contains(&indicator) && !features.contains(&indicator);
                if clashes || !created.insert(indicator.clone()) {
                    return Err(PipelineError::config(format!(
                        "one-hot column '{indicator}' already exists"
                    )));
                }
                // comparing a missing label yields null, so gaps stay gaps
                indicators.push(
                    col(name.as_str())
                        .eq(lit(category))
                        .cast(DataType::Float64)
                        .alias(indicator),
                );
            }
        }
        let exprs: Vec<Expr> = dataset
            .column_names()
            .into_iter()
            .filter(|n| !features.contains(n))
            .map(col)
            .chain(indicators)
            .collect();
        dataset.select_exprs(exprs)
    }
}

/// Stage engine for feature engineering.
pub struct FeatureEngineer {
    strategy: Box<dyn FeatureTransformStrategy>,
}

impl FeatureEngineer {
    pub fn new(strategy: impl FeatureTransformStrategy + 'static) -> Self {
        Self {
            strategy: Box::new(strategy),
        }
    }

    pub fn from_boxed(strategy: Box<dyn FeatureTransformStrategy>) -> Self {
        Self { strategy }
    }

    pub fn set_strategy(&mut self, strategy: impl FeatureTransformStrategy + 'static) {
        self.set_boxed_strategy(Box::new(strategy));
    }

    pub fn set_boxed_strategy(&mut self, strategy: Box<dyn FeatureTransformStrategy>) {
        tracing::debug!(
            from = %self.strategy.describe(),
            to = %strategy.describe(),
            "switching feature engineering strategy"
        );
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> &dyn FeatureTransformStrategy {
        self.strategy.as_ref()
    }

    /// Apply the held strategy to the columns in `features`.
    ///
    /// # Errors
    ///
    /// Propagates the strategy's error unchanged.
    pub fn execute(
        &self,
        dataset: TabularDataset,
        features: &FeatureSpec,
    ) -> Result<StageOutput<TabularDataset>> {
        let recorder = StageRecorder::begin(
            Stage::FeatureEngineering,
            format!("{}[{}]", self.strategy.describe(), features.columns().join(", ")),
            dataset.n_rows(),
            dataset.n_columns(),
        );
        let mut warnings = Vec::new();
        let output = self.strategy.transform(dataset, features, &mut warnings)?;
        let report = recorder.finish(output.n_rows(), output.n_columns(), warnings);
        Ok(StageOutput { output, report })
    }
}

impl std::fmt::Debug for FeatureEngineer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureEngineer")
            .field("strategy", &self.strategy.describe())
            .finish()
    }
}
