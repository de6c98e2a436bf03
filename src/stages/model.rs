//! Model building.
//!
//! A [`ModelBuildStrategy`] fits a model on the training partition and hands
//! back a [`TrainedModel`], an opaque handle exposing only `predict`. The
//! fitted handle remembers the feature columns it was trained on and matches
//! prediction input by name, so column order does not matter but the column
//! set does.

use super::report::{Stage, StageOutput, StageRecorder};
use crate::dataset::{self, ColumnKind, TabularDataset};
use crate::error::{PipelineError, Result, StageWarning};
use linfa::prelude::*;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use linfa_trees::DecisionTree;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::{ChunkAgg, ChunkVar, Series};
use std::collections::HashSet;

/// A fitted model.
pub trait TrainedModel: Send + Sync {
    fn describe(&self) -> String;

    /// Feature columns, in training order.
    fn feature_names(&self) -> &[String];

    /// Predict one value per row of `features`.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` when the column set differs from training;
    /// `Domain` or `TypeMismatch` for cells the model cannot consume.
    fn predict(&self, features: &TabularDataset) -> Result<Vec<f64>>;
}

impl std::fmt::Debug for dyn TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("model", &self.describe())
            .field("features", &self.feature_names())
            .finish()
    }
}

/// Behaviour contract for model building.
pub trait ModelBuildStrategy: Send + Sync {
    fn describe(&self) -> String;

    /// Whether the strategy copes with categorical feature columns itself.
    fn encodes_categoricals(&self) -> bool {
        false
    }

    /// Fit on validated training data: no missing cells, numeric target.
    fn build(
        &self,
        features: &TabularDataset,
        target: &[f64],
        warnings: &mut Vec<StageWarning>,
    ) -> Result<Box<dyn TrainedModel>>;
}

/// Training-time column layout, used to line prediction input up by name.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FeatureLayout {
    names: Vec<String>,
}

impl FeatureLayout {
    fn of(dataset: &TabularDataset) -> Self {
        Self {
            names: dataset.column_names().into_iter().map(str::to_owned).collect(),
        }
    }

    fn check(&self, dataset: &TabularDataset) -> Result<()> {
        let expected: HashSet<&str> = self.names.iter().map(String::as_str).collect();
        let given: HashSet<&str> = dataset.column_names().into_iter().collect();
        let mut missing: Vec<&str> = expected.difference(&given).copied().collect();
        let mut unexpected: Vec<&str> = given.difference(&expected).copied().collect();
        if missing.is_empty() && unexpected.is_empty() {
            return Ok(());
        }
        missing.sort_unstable();
        unexpected.sort_unstable();
        Err(PipelineError::config(format!(
            "prediction columns differ from training: missing [{}], unexpected [{}]",
            missing.join(", "),
            unexpected.join(", ")
        )))
    }

    /// Row-major design matrix in training column order.
    ///
    /// Polars and linfa link different `ndarray` majors, so the matrix is
    /// filled from the column buffers instead of `DataFrame::to_ndarray`.
    fn matrix(&self, dataset: &TabularDataset) -> Result<Array2<f64>> {
        self.check(dataset)?;
        let columns = self
            .names
            .iter()
            .map(|name| dataset::complete_values(dataset.require(name)?))
            .collect::<Result<Vec<_>>>()?;
        Ok(Array2::from_shape_fn(
            (dataset.n_rows(), columns.len()),
            |(row, col)| columns[col][row],
        ))
    }
}

/// Ordinary least squares on standardised features.
///
/// Features are scaled with the training mean and population standard
/// deviation; the same transform is replayed on prediction input. A feature
/// that is constant over the training rows is left out of the fit (a zero
/// coefficient) with a warning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinearRegressionStrategy;

enum LinearFit {
    Ols(FittedLinearRegression<f64>),
    /// Every feature was constant: predict the training mean.
    Intercept(f64),
}

struct LinearModel {
    layout: FeatureLayout,
    /// Layout positions of the non-constant features
    active: Vec<usize>,
    means: Array1<f64>,
    scales: Array1<f64>,
    fit: LinearFit,
}

fn standardise(mut x: Array2<f64>, means: &Array1<f64>, scales: &Array1<f64>) -> Array2<f64> {
    x -= means;
    x /= scales;
    x
}

impl LinearModel {
    fn design(&self, features: &TabularDataset) -> Result<Array2<f64>> {
        let raw = self.layout.matrix(features)?.select(Axis(1), &self.active);
        Ok(standardise(raw, &self.means, &self.scales))
    }
}

impl TrainedModel for LinearModel {
    fn describe(&self) -> String {
        let intercept = match &self.fit {
            LinearFit::Ols(fitted) => fitted.intercept(),
            LinearFit::Intercept(mean) => *mean,
        };
        format!("linear_regression(intercept={intercept:.4})")
    }

    fn feature_names(&self) -> &[String] {
        &self.layout.names
    }

    fn predict(&self, features: &TabularDataset) -> Result<Vec<f64>> {
        let x = self.design(features)?;
        Ok(match &self.fit {
            LinearFit::Ols(fitted) => fitted.predict(&x).to_vec(),
            LinearFit::Intercept(mean) => vec![*mean; x.nrows()],
        })
    }
}

impl ModelBuildStrategy for LinearRegressionStrategy {
    fn describe(&self) -> String {
        "linear_regression".to_owned()
    }

    fn build(
        &self,
        features: &TabularDataset,
        target: &[f64],
        warnings: &mut Vec<StageWarning>,
    ) -> Result<Box<dyn TrainedModel>> {
        let layout = FeatureLayout::of(features);
        let mut active = Vec::with_capacity(layout.names.len());
        let mut means = Vec::with_capacity(layout.names.len());
        let mut scales = Vec::with_capacity(layout.names.len());
        for (idx, name) in layout.names.iter().enumerate() {
            let values = features.numeric(name)?;
            match (values.mean(), values.std(0)) {
                (Some(mean), Some(std)) if std > 0.0 => {
                    active.push(idx);
                    means.push(mean);
                    scales.push(std);
                }
                _ => warnings.push(StageWarning::for_column(
                    name.as_str(),
                    "constant feature; left out of the fit",
                )),
            }
        }

        let targets = Array1::from(target.to_vec());
        let mut model = LinearModel {
            layout,
            active,
            means: Array1::from(means),
            scales: Array1::from(scales),
            fit: LinearFit::Intercept(targets.mean().unwrap_or(0.0)),
        };
        if model.active.is_empty() {
            return Ok(Box::new(model));
        }

        let dataset = Dataset::new(model.design(features)?, targets);
        let fitted = LinearRegression::default()
            .fit(&dataset)
            .map_err(|e| PipelineError::Model(format!("linear regression fit failed: {e}")))?;
        model.fit = LinearFit::Ols(fitted);
        Ok(Box::new(model))
    }
}

/// Decision tree classifier over integral, non-negative target labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionTreeStrategy {
    max_depth: Option<usize>,
}

impl DecisionTreeStrategy {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self { max_depth }
    }

    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }
}

impl Default for DecisionTreeStrategy {
    fn default() -> Self {
        Self::new(Some(8))
    }
}

struct TreeModel {
    layout: FeatureLayout,
    max_depth: Option<usize>,
    tree: DecisionTree<f64, usize>,
}

impl TrainedModel for TreeModel {
    fn describe(&self) -> String {
        DecisionTreeStrategy::new(self.max_depth).describe()
    }

    fn feature_names(&self) -> &[String] {
        &self.layout.names
    }

    fn predict(&self, features: &TabularDataset) -> Result<Vec<f64>> {
        let x = self.layout.matrix(features)?;
        Ok(self.tree.predict(&x).iter().map(|&label| label as f64).collect())
    }
}

impl ModelBuildStrategy for DecisionTreeStrategy {
    fn describe(&self) -> String {
        match self.max_depth {
            Some(depth) => format!("decision_tree(max_depth={depth})"),
            None => "decision_tree".to_owned(),
        }
    }

    fn build(
        &self,
        features: &TabularDataset,
        target: &[f64],
        _warnings: &mut Vec<StageWarning>,
    ) -> Result<Box<dyn TrainedModel>> {
        let layout = FeatureLayout::of(features);
        let x = layout.matrix(features)?;
        let labels = target
            .iter()
            .map(|&t| {
                if t.is_finite() && t >= 0.0 && t.fract() == 0.0 {
                    Ok(t as usize)
                } else {
                    Err(PipelineError::Model(format!(
                        "decision tree needs non-negative integral labels, found {t}"
                    )))
                }
            })
            .collect::<Result<Vec<usize>>>()?;
        let dataset = Dataset::new(x, Array1::from(labels));
        let tree = DecisionTree::params()
            .max_depth(self.max_depth)
            .fit(&dataset)
            .map_err(|e| PipelineError::Model(format!("decision tree fit failed: {e}")))?;
        Ok(Box::new(TreeModel {
            layout,
            max_depth: self.max_depth,
            tree,
        }))
    }
}

/// Predicts the training-target mean for every row. Ignores feature values,
/// so categorical features are accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MeanBaselineStrategy;

struct MeanModel {
    layout: FeatureLayout,
    mean: f64,
}

impl TrainedModel for MeanModel {
    fn describe(&self) -> String {
        format!("mean_baseline({})", self.mean)
    }

    fn feature_names(&self) -> &[String] {
        &self.layout.names
    }

    fn predict(&self, features: &TabularDataset) -> Result<Vec<f64>> {
        self.layout.check(features)?;
        Ok(vec![self.mean; features.n_rows()])
    }
}

impl ModelBuildStrategy for MeanBaselineStrategy {
    fn describe(&self) -> String {
        "mean_baseline".to_owned()
    }

    fn encodes_categoricals(&self) -> bool {
        true
    }

    fn build(
        &self,
        features: &TabularDataset,
        target: &[f64],
        _warnings: &mut Vec<StageWarning>,
    ) -> Result<Box<dyn TrainedModel>> {
        let mean = Array1::from(target.to_vec())
            .mean()
            .ok_or_else(|| PipelineError::Model("cannot fit a baseline on zero rows".to_owned()))?;
        Ok(Box::new(MeanModel {
            layout: FeatureLayout::of(features),
            mean,
        }))
    }
}

/// Stage engine for model building.
pub struct ModelBuilder {
    strategy: Box<dyn ModelBuildStrategy>,
}

impl ModelBuilder {
    pub fn new(strategy: impl ModelBuildStrategy + 'static) -> Self {
        Self::from_boxed(Box::new(strategy))
    }

    pub fn from_boxed(strategy: Box<dyn ModelBuildStrategy>) -> Self {
        Self { strategy }
    }

    pub fn set_strategy(&mut self, strategy: impl ModelBuildStrategy + 'static) {
        self.set_boxed_strategy(Box::new(strategy));
    }

    pub fn set_boxed_strategy(&mut self, strategy: Box<dyn ModelBuildStrategy>) {
        tracing::debug!(
            from = %self.strategy.describe(),
            to = %strategy.describe(),
            "switching model build strategy"
        );
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> &dyn ModelBuildStrategy {
        self.strategy.as_ref()
    }

    fn validate(&self, features: &TabularDataset, target: &Series) -> Result<Vec<f64>> {
        if target.len() != features.n_rows() {
            return Err(PipelineError::config(format!(
                "target '{}' has {} rows, features have {}",
                target.name(),
                target.len(),
                features.n_rows()
            )));
        }
        if features.n_rows() == 0 {
            return Err(PipelineError::Model("no training rows left to fit on".to_owned()));
        }
        for series in features.series() {
            match ColumnKind::of(series) {
                ColumnKind::Categorical if !self.strategy.encodes_categoricals() => {
                    return Err(PipelineError::type_mismatch(
                        series.name().as_str(),
                        ColumnKind::Numeric.as_str(),
                        ColumnKind::Categorical.as_str(),
                    ));
                }
                _ if series.null_count() > 0 => {
                    return Err(PipelineError::domain(
                        series.name().as_str(),
                        format!(
                            "{} missing values must be handled before modelling",
                            series.null_count()
                        ),
                    ));
                }
                _ => {}
            }
        }
        dataset::complete_values(target)
    }

    /// Fit the held strategy on `features` and `target`.
    ///
    /// # Errors
    ///
    /// `Model` when there are no training rows; `TypeMismatch` for a
    /// categorical target, or categorical features the strategy cannot
    /// encode; `Domain` for missing values; otherwise the strategy's error
    /// unchanged.
    pub fn execute(
        &self,
        features: &TabularDataset,
        target: &Series,
    ) -> Result<StageOutput<Box<dyn TrainedModel>>> {
        let recorder = StageRecorder::begin(
            Stage::ModelBuild,
            self.strategy.describe(),
            features.n_rows(),
            features.n_columns(),
        );
        let target_values = self.validate(features, target)?;
        let mut warnings = Vec::new();
        let model = self.strategy.build(features, &target_values, &mut warnings)?;
        tracing::debug!(model = %model.describe(), "model fitted");
        let report = recorder.finish(features.n_rows(), features.n_columns(), warnings);
        Ok(StageOutput {
            output: model,
            report,
        })
    }
}

impl std::fmt::Debug for ModelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBuilder")
            .field("strategy", &self.strategy.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;
    use crate::dataset::{categorical_series, dense_series, numeric_series};
    use crate::stages::{DropStrategy, MissingValueHandler};

    fn linear_data() -> (TabularDataset, Series) {
        let x1 = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0];
        let x2 = [1.0, 0.0, 3.0, 1.0, 2.0, 5.0, 4.0, 2.0];
        let y: Vec<f64> = x1
            .iter()
            .zip(&x2)
            .map(|(a, b)| 2.0 * a - 3.0 * b + 1.0)
            .collect();
        let features =
            TabularDataset::new(vec![dense_series("x1", x1), dense_series("x2", x2)]).unwrap();
        (features, dense_series("y", y))
    }

    #[test]
    fn test_linear_regression_recovers_plane() {
        let (features, target) = linear_data();
        let model = ModelBuilder::new(LinearRegressionStrategy)
            .execute(&features, &target)
            .unwrap()
            .output;
        let predicted = model.predict(&features).unwrap();
        for (p, t) in predicted.iter().zip(dataset::complete_values(&target).unwrap()) {
            assert!((p - t).abs() < 1e-6, "{p} vs {t}");
        }
    }

    #[test]
    fn test_constant_feature_is_left_out_of_fit() {
        let features = TabularDataset::new(vec![
            dense_series("a", [1.0, 2.0, 3.0, 4.0]),
            dense_series("city_b", [0.0, 0.0, 0.0, 0.0]),
        ])
        .unwrap();
        let target = dense_series("y", [3.0, 5.0, 7.0, 9.0]);
        let staged = ModelBuilder::new(LinearRegressionStrategy)
            .execute(&features, &target)
            .unwrap();
        assert_eq!(staged.report.warnings.len(), 1);
        assert_eq!(staged.report.warnings[0].column.as_deref(), Some("city_b"));

        let model = staged.output;
        assert_eq!(model.feature_names().len(), 2);
        let predicted = model.predict(&features).unwrap();
        for (p, t) in predicted.iter().zip([3.0, 5.0, 7.0, 9.0]) {
            assert!((p - t).abs() < 1e-6, "{p} vs {t}");
        }
    }

    #[test]
    fn test_all_constant_features_predict_the_mean() {
        let features = TabularDataset::new(vec![dense_series("k", [2.0, 2.0, 2.0])]).unwrap();
        let model = ModelBuilder::new(LinearRegressionStrategy)
            .execute(&features, &dense_series("y", [1.0, 2.0, 6.0]))
            .unwrap()
            .output;
        assert_eq!(model.predict(&features).unwrap(), vec![3.0; 3]);
    }

    #[test]
    fn test_predict_matches_columns_by_name() {
        let (features, target) = linear_data();
        let model = ModelBuilder::new(LinearRegressionStrategy)
            .execute(&features, &target)
            .unwrap()
            .output;
        let reordered = features.select(&["x2", "x1"]).unwrap();
        assert_eq!(
            model.predict(&reordered).unwrap().len(),
            features.n_rows()
        );

        let missing = features.select(&["x1"]).unwrap();
        assert!(matches!(
            model.predict(&missing),
            Err(PipelineError::InvalidConfiguration(_))
        ));

        let mut extra = features.clone();
        extra.push_column(dense_series("x3", [0.0; 8])).unwrap();
        assert!(matches!(
            model.predict(&extra),
            Err(PipelineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_decision_tree_learns_threshold() {
        let x: Vec<f64> = (0..10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|&v| if v < 5.0 { 0.0 } else { 1.0 }).collect();
        let features = TabularDataset::new(vec![dense_series("x", x)]).unwrap();
        let target = dense_series("label", y.clone());
        let model = ModelBuilder::new(DecisionTreeStrategy::new(Some(3)))
            .execute(&features, &target)
            .unwrap()
            .output;
        assert_eq!(model.predict(&features).unwrap(), y);
    }

    #[test]
    fn test_decision_tree_rejects_fractional_labels() {
        let features = TabularDataset::new(vec![dense_series("x", [1.0, 2.0])]).unwrap();
        let target = dense_series("y", [0.5, 1.0]);
        let err = ModelBuilder::new(DecisionTreeStrategy::default())
            .execute(&features, &target)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Model(_)));
    }

    #[test]
    fn test_empty_training_rows_are_rejected() {
        // every row has a gap, so dropping rows leaves nothing to fit on
        let gappy = TabularDataset::new(vec![
            numeric_series("x", [Some(1.0), None, Some(3.0)]),
            numeric_series("label", [None, Some(1.0), None]),
        ])
        .unwrap();
        let mut emptied = MissingValueHandler::new(DropStrategy::rows())
            .execute(gappy)
            .unwrap()
            .output;
        assert_eq!(emptied.n_rows(), 0);
        let target = emptied.remove_column("label").unwrap();

        for builder in [
            ModelBuilder::new(DecisionTreeStrategy::default()),
            ModelBuilder::new(LinearRegressionStrategy),
            ModelBuilder::new(MeanBaselineStrategy),
        ] {
            let err = builder.execute(&emptied, &target).unwrap_err();
            assert!(matches!(err, PipelineError::Model(_)), "{err}");
        }
    }

    #[test]
    fn test_mean_baseline_accepts_categoricals() {
        let features = TabularDataset::new(vec![categorical_series(
            "city",
            [Some("a"), Some("b"), Some("a")],
        )])
        .unwrap();
        let target = dense_series("y", [1.0, 2.0, 6.0]);
        let model = ModelBuilder::new(MeanBaselineStrategy)
            .execute(&features, &target)
            .unwrap()
            .output;
        assert_eq!(model.predict(&features).unwrap(), vec![3.0; 3]);
        assert_eq!(model.feature_names(), ["city".to_owned()]);
    }

    #[test]
    fn test_categorical_feature_is_type_mismatch() {
        let features =
            TabularDataset::new(vec![categorical_series("c", [Some("a"), Some("b")])]).unwrap();
        let err = ModelBuilder::new(LinearRegressionStrategy)
            .execute(&features, &dense_series("y", [1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
        assert_eq!(err.column(), Some("c"));
    }

    #[test]
    fn test_categorical_target_is_type_mismatch() {
        let features = TabularDataset::new(vec![dense_series("x", [1.0, 2.0])]).unwrap();
        let target = categorical_series("y", [Some("lo"), Some("hi")]);
        let err = ModelBuilder::new(MeanBaselineStrategy)
            .execute(&features, &target)
            .unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_values_are_domain_errors() {
        let features = TabularDataset::new(vec![numeric_series("x", [Some(1.0), None])]).unwrap();
        let err = ModelBuilder::new(LinearRegressionStrategy)
            .execute(&features, &dense_series("y", [1.0, 2.0]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Domain { .. }));

        let features = TabularDataset::new(vec![dense_series("x", [1.0, 2.0])]).unwrap();
        let err = ModelBuilder::new(MeanBaselineStrategy)
            .execute(&features, &numeric_series("y", [Some(1.0), None]))
            .unwrap_err();
        assert_eq!(err.column(), Some("y"));
    }

    #[test]
    fn test_set_strategy() {
        let mut builder = ModelBuilder::new(MeanBaselineStrategy);
        builder.set_strategy(DecisionTreeStrategy::new(None));
        assert_eq!(builder.strategy().describe(), "decision_tree");
        assert!(!builder.strategy().encodes_categoricals());
    }
}
