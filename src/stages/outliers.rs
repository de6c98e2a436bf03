//! Outlier detection and handling.
//!
//! A strategy flags cells column by column; [`OutlierDetector::detect`] turns
//! that into an [`OutlierMask`] with the same shape as the dataset. Handling
//! then consumes the mask:
//!
//! - `remove` drops every row where any targeted column is flagged.
//! - `cap` clips each targeted column to its own 1st/99th percentile. This
//!   does **not** look at the mask: capping is percentile clipping, so values
//!   the strategy did not flag can still move and flagged values inside the
//!   percentile band stay as they are.
//!
//! Targeted columns default to every numeric column.

use super::features::FeatureSpec;
use super::report::{Stage, StageOutput, StageRecorder};
use crate::dataset::{ColumnKind, TabularDataset};
use crate::error::{PipelineError, Result, StageWarning};
use polars::prelude::*;

const CAP_LOWER_QUANTILE: f64 = 0.01;
const CAP_UPPER_QUANTILE: f64 = 0.99;

/// Consistency constant relating MAD to the standard deviation of a normal
/// distribution.
const MODIFIED_Z_SCALE: f64 = 0.6745;

/// Relates the mean absolute deviation to the standard deviation, used when
/// the MAD is zero.
const MEAN_AD_SCALE: f64 = 1.253_314;

/// Behaviour contract for outlier detection.
pub trait OutlierStrategy: Send + Sync {
    fn describe(&self) -> String;

    /// Flag the cells of one numeric column. Missing cells are never flagged.
    fn flag_column(&self, values: &Float64Chunked) -> Vec<bool>;

    /// Flag every numeric column of `dataset`; categorical columns come back
    /// all-false.
    fn detect(&self, dataset: &TabularDataset) -> OutlierMask {
        OutlierMask {
            columns: dataset
                .series()
                .map(|s| {
                    let flags = match s.f64() {
                        Ok(values) => self.flag_column(values),
                        Err(_) => vec![false; s.len()],
                    };
                    (s.name().to_string(), flags)
                })
                .collect(),
        }
    }
}

/// Same-shape boolean table, true where a cell is an outlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlierMask {
    columns: Vec<(String, Vec<bool>)>,
}

impl OutlierMask {
    pub fn column(&self, name: &str) -> Option<&[bool]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, flags)| flags.as_slice())
    }

    pub fn is_flagged(&self, column: &str, row: usize) -> bool {
        self.column(column)
            .and_then(|flags| flags.get(row).copied())
            .unwrap_or(false)
    }

    pub fn flagged_count(&self) -> usize {
        self.columns
            .iter()
            .map(|(_, flags)| flags.iter().filter(|&&f| f).count())
            .sum()
    }

    /// Per-row "any of these columns flagged".
    pub fn rows_flagged(&self, targets: &[String]) -> Vec<bool> {
        let rows = self.columns.first().map_or(0, |(_, f)| f.len());
        (0..rows)
            .map(|row| targets.iter().any(|t| self.is_flagged(t, row)))
            .collect()
    }

    fn restrict_to(mut self, targets: &[String]) -> Self {
        for (name, flags) in &mut self.columns {
            if !targets.contains(name) {
                flags.iter_mut().for_each(|f| *f = false);
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Center {
    Mean,
    Median,
}

/// Z-score detection.
///
/// [`ZScore::new`] flags `|x - mean| / std > threshold` using the column's own
/// mean and sample standard deviation. [`ZScore::robust`] uses the modified
/// z-score `0.6745 |x - median| / MAD` instead, which is not dragged along by
/// the outlier it is trying to find.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZScore {
    threshold: f64,
    center: Center,
}

impl ZScore {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            center: Center::Mean,
        }
    }

    pub fn robust(threshold: f64) -> Self {
        Self {
            threshold,
            center: Center::Median,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `(center, scale, factor)` with `score = factor * |x - center| / scale`.
    fn location_scale(&self, values: &Float64Chunked) -> Option<(f64, f64, f64)> {
        match self.center {
            Center::Mean => {
                let mean = values.mean()?;
                let std = values.std(1)?;
                (std > 0.0).then_some((mean, std, 1.0))
            }
            Center::Median => {
                let median = values.median()?;
                let deviations = values.apply_values(move |v| (v - median).abs());
                let mad = deviations.median()?;
                if mad > 0.0 {
                    return Some((median, mad, MODIFIED_Z_SCALE));
                }
                let mean_ad = deviations.mean()?;
                (mean_ad > 0.0).then_some((median, MEAN_AD_SCALE * mean_ad, 1.0))
            }
        }
    }
}

impl Default for ZScore {
    fn default() -> Self {
        Self::new(3.0)
    }
}

impl OutlierStrategy for ZScore {
    fn describe(&self) -> String {
        match self.center {
            Center::Mean => format!("zscore({})", self.threshold),
            Center::Median => format!("robust_zscore({})", self.threshold),
        }
    }

    fn flag_column(&self, values: &Float64Chunked) -> Vec<bool> {
        let Some((center, scale, factor)) = self.location_scale(values) else {
            return vec![false; values.len()];
        };
        values
            .into_iter()
            .map(|v| v.is_some_and(|x| factor * (x - center).abs() / scale > self.threshold))
            .collect()
    }
}

/// Interquartile-range fences: flags `x < Q1 - k*IQR` or `x > Q3 + k*IQR`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Iqr {
    multiplier: f64,
}

impl Iqr {
    pub fn with_multiplier(multiplier: f64) -> Self {
        Self { multiplier }
    }

    /// Lower and upper fences for a column's present values.
    pub fn fences(&self, values: &Float64Chunked) -> Option<(f64, f64)> {
        let q1 = values.quantile(0.25, QuantileMethod::Linear).ok()??;
        let q3 = values.quantile(0.75, QuantileMethod::Linear).ok()??;
        let iqr = q3 - q1;
        Some((q1 - self.multiplier * iqr, q3 + self.multiplier * iqr))
    }
}

impl Default for Iqr {
    fn default() -> Self {
        Self::with_multiplier(1.5)
    }
}

impl OutlierStrategy for Iqr {
    fn describe(&self) -> String {
        format!("iqr({})", self.multiplier)
    }

    fn flag_column(&self, values: &Float64Chunked) -> Vec<bool> {
        let Some((lower, upper)) = self.fences(values) else {
            return vec![false; values.len()];
        };
        values
            .into_iter()
            .map(|v| v.is_some_and(|x| x < lower || x > upper))
            .collect()
    }
}

/// What to do with detected outliers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutlierHandling {
    Remove,
    Cap,
    /// A handling name nobody recognised; kept so it can be reported.
    Unrecognised(String),
}

impl OutlierHandling {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "remove" => Self::Remove,
            "cap" => Self::Cap,
            _ => Self::Unrecognised(name.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Remove => "remove",
            Self::Cap => "cap",
            Self::Unrecognised(name) => name,
        }
    }
}

/// Clip a column to its own percentile band.
fn cap_expr(name: &str) -> Expr {
    let expr = col(name);
    let lower = expr
        .clone()
        .quantile(lit(CAP_LOWER_QUANTILE), QuantileMethod::Linear);
    let upper = expr
        .clone()
        .quantile(lit(CAP_UPPER_QUANTILE), QuantileMethod::Linear);
    expr.clip(lower, upper).alias(name)
}

/// Stage engine for outlier handling.
pub struct OutlierDetector {
    strategy: Box<dyn OutlierStrategy>,
    targets: Option<FeatureSpec>,
    strict: bool,
}

impl OutlierDetector {
    pub fn new(strategy: impl OutlierStrategy + 'static) -> Self {
        Self::from_boxed(Box::new(strategy))
    }

    pub fn from_boxed(strategy: Box<dyn OutlierStrategy>) -> Self {
        Self {
            strategy,
            targets: None,
            strict: false,
        }
    }

    /// Limit detection and handling to these columns.
    #[must_use]
    pub fn with_targets(mut self, targets: FeatureSpec) -> Self {
        self.targets = Some(targets);
        self
    }

    /// Fail on an unrecognised handling method instead of passing through.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn set_strategy(&mut self, strategy: impl OutlierStrategy + 'static) {
        self.set_boxed_strategy(Box::new(strategy));
    }

    pub fn set_boxed_strategy(&mut self, strategy: Box<dyn OutlierStrategy>) {
        tracing::debug!(
            from = %self.strategy.describe(),
            to = %strategy.describe(),
            "switching outlier detection strategy"
        );
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> &dyn OutlierStrategy {
        self.strategy.as_ref()
    }

    fn target_columns(&self, dataset: &TabularDataset) -> Result<Vec<String>> {
        let Some(spec) = &self.targets else {
            return Ok(dataset.names_of_kind(ColumnKind::Numeric));
        };
        spec.validate(dataset)?;
        for name in spec.columns() {
            dataset.numeric(name)?;
        }
        Ok(spec.columns().to_vec())
    }

    /// Flag outliers in the targeted columns.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` for unknown target columns, `TypeMismatch` for a
    /// categorical target.
    pub fn detect(&self, dataset: &TabularDataset) -> Result<OutlierMask> {
        let targets = self.target_columns(dataset)?;
        Ok(self.strategy.detect(dataset).restrict_to(&targets))
    }

    /// Detect, then handle outliers with `method`.
    ///
    /// # Errors
    ///
    /// As [`OutlierDetector::detect`]; in strict mode also
    /// `InvalidConfiguration` for an unrecognised method.
    pub fn execute(
        &self,
        dataset: TabularDataset,
        method: &OutlierHandling,
    ) -> Result<StageOutput<TabularDataset>> {
        let recorder = StageRecorder::begin(
            Stage::Outliers,
            format!("{}+{}", self.strategy.describe(), method.as_str()),
            dataset.n_rows(),
            dataset.n_columns(),
        );
        let mut warnings = Vec::new();
        let targets = self.target_columns(&dataset)?;

        let output = match method {
            OutlierHandling::Remove => {
                let mask = self.strategy.detect(&dataset).restrict_to(&targets);
                tracing::debug!(flagged = mask.flagged_count(), "outliers detected");
                let keep: Vec<bool> = mask.rows_flagged(&targets).iter().map(|f| !f).collect();
                dataset.filter_rows(&keep)?
            }
            OutlierHandling::Cap => {
                dataset.with_exprs(targets.iter().map(String::as_str).map(cap_expr).collect())?
            }
            OutlierHandling::Unrecognised(name) => {
                if self.strict {
                    return Err(PipelineError::config(format!(
                        "unknown outlier handling method '{name}'"
                    )));
                }
                warnings.push(StageWarning::new(format!(
                    "unknown outlier handling method '{name}'; no outlier handling performed"
                )));
                dataset
            }
        };

        let report = recorder.finish(output.n_rows(), output.n_columns(), warnings);
        Ok(StageOutput { output, report })
    }
}

impl std::fmt::Debug for OutlierDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutlierDetector")
            .field("strategy", &self.strategy.describe())
            .field("targets", &self.targets)
            .field("strict", &self.strict)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;
    use crate::dataset::{categorical_series, dense_series, numeric_series};

    fn spiky() -> TabularDataset {
        TabularDataset::new(vec![
            dense_series("v", [10.0, 12.0, 11.0, 13.0, 1000.0]),
            categorical_series("k", [Some("a"), Some("b"), Some("a"), Some("b"), Some("a")]),
        ])
        .unwrap()
    }

    fn flags(strategy: &dyn OutlierStrategy, values: &[f64]) -> Vec<bool> {
        strategy.flag_column(&Float64Chunked::from_slice("v".into(), values))
    }

    fn present(ds: &TabularDataset, name: &str) -> Vec<f64> {
        ds.numeric(name).unwrap().into_iter().flatten().collect()
    }

    #[test]
    fn test_robust_zscore_flags_only_the_spike() {
        let f = flags(&ZScore::robust(3.0), &[10.0, 12.0, 11.0, 13.0, 1000.0]);
        assert_eq!(f, vec![false, false, false, false, true]);
    }

    #[test]
    fn test_classic_zscore_is_bounded_on_small_samples() {
        // With n = 5 the largest attainable sample z-score is (n-1)/sqrt(n) ~ 1.79,
        // so a threshold of 3 cannot fire; a lower threshold isolates the spike.
        let values = [10.0, 12.0, 11.0, 13.0, 1000.0];
        assert!(flags(&ZScore::new(3.0), &values).iter().all(|f| !f));
        assert_eq!(
            flags(&ZScore::new(1.5), &values),
            vec![false, false, false, false, true]
        );
    }

    #[test]
    fn test_classic_zscore_on_larger_sample() {
        let mut values = vec![10.0; 30];
        values.extend([11.0, 9.0, 10.5, 9.5]);
        values.push(100.0);
        let f = flags(&ZScore::new(3.0), &values);
        assert_eq!(f.iter().filter(|&&x| x).count(), 1);
        assert_eq!(f.last(), Some(&true));
    }

    #[test]
    fn test_zscore_constant_column_flags_nothing() {
        assert!(flags(&ZScore::new(1.0), &[4.0, 4.0, 4.0]).iter().all(|f| !f));
        let mut robust = vec![5.0; 4];
        robust.push(100.0);
        assert_eq!(flags(&ZScore::robust(3.0), &robust).last(), Some(&true));
    }

    #[test]
    fn test_iqr_fences() {
        let f = flags(&Iqr::default(), &[1.0, 2.0, 3.0, 4.0, 100.0, -50.0]);
        assert_eq!(f, vec![false, false, false, false, true, true]);
    }

    #[test]
    fn test_mask_shape_and_missing() {
        let ds = TabularDataset::new(vec![
            numeric_series("v", [Some(1.0), None, Some(2.0), Some(1.5), Some(99.0)]),
            categorical_series("k", [Some("a"); 5]),
        ])
        .unwrap();
        let mask = OutlierDetector::new(Iqr::default()).detect(&ds).unwrap();
        assert_eq!(mask.column("v").unwrap().len(), 5);
        assert_eq!(mask.column("k").unwrap(), &[false; 5]);
        assert!(!mask.is_flagged("v", 1));
        assert!(mask.is_flagged("v", 4));
    }

    #[test]
    fn test_remove_drops_flagged_rows() {
        let out = OutlierDetector::new(ZScore::robust(3.0))
            .execute(spiky(), &OutlierHandling::Remove)
            .unwrap()
            .output;
        assert_eq!(out.n_rows(), 4);
        assert_eq!(present(&out, "v"), vec![10.0, 12.0, 11.0, 13.0]);
        assert_eq!(out.require("k").unwrap().len(), 4);
    }

    #[test]
    fn test_cap_uses_percentiles_not_mask() {
        let values: Vec<f64> = (0..=100).map(f64::from).collect();
        let ds = TabularDataset::new(vec![dense_series("v", values)]).unwrap();
        // IQR flags nothing in a uniform ramp, yet capping still clips the tails.
        let detector = OutlierDetector::new(Iqr::default());
        assert_eq!(detector.detect(&ds).unwrap().flagged_count(), 0);
        let out = detector.execute(ds, &OutlierHandling::Cap).unwrap().output;
        let v = present(&out, "v");
        assert_eq!(v.len(), 101);
        assert_eq!(v.first(), Some(&1.0));
        assert_eq!(v.last(), Some(&99.0));
    }

    #[test]
    fn test_targets_restrict_handling() {
        let ds = TabularDataset::new(vec![
            dense_series("a", [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 50.0]),
            dense_series("b", [1.0, 1.0, 1.0, 1.0, 1.0, 90.0, 1.0]),
        ])
        .unwrap();
        let out = OutlierDetector::new(ZScore::robust(3.0))
            .with_targets(FeatureSpec::new(["a"]))
            .execute(ds, &OutlierHandling::Remove)
            .unwrap()
            .output;
        assert_eq!(out.n_rows(), 6);
        assert!(present(&out, "b").contains(&90.0));
    }

    #[test]
    fn test_categorical_target_is_type_mismatch() {
        let err = OutlierDetector::new(Iqr::default())
            .with_targets(FeatureSpec::new(["k"]))
            .detect(&spiky())
            .unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
    }

    #[test]
    fn test_unknown_handling_passes_through_with_warning() {
        let staged = OutlierDetector::new(Iqr::default())
            .execute(spiky(), &OutlierHandling::parse("trim"))
            .unwrap();
        assert_eq!(staged.output, spiky());
        assert_eq!(staged.report.warnings.len(), 1);

        let err = OutlierDetector::new(Iqr::default())
            .strict()
            .execute(spiky(), &OutlierHandling::parse("trim"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_set_strategy() {
        let mut detector = OutlierDetector::new(ZScore::default());
        detector.set_strategy(Iqr::default());
        assert_eq!(detector.strategy().describe(), "iqr(1.5)");
    }
}
