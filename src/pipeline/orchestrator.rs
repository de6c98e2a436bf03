//! Runs the five stage engines in their fixed order.

use crate::dataset::TabularDataset;
use crate::error::{PipelineError, Result, StageWarning};
use crate::evaluation::{self, Evaluation};
use crate::stages::{
    DataSplitter, FeatureEngineer, FeatureSpec, FeatureTransformStrategy, MissingValueHandler,
    MissingValueStrategy, ModelBuildStrategy, ModelBuilder, OutlierDetector, OutlierHandling,
    OutlierStrategy, Split, SplitStrategy, StageReport, TrainedModel,
};
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Where a run has got to. A run only moves forward; any stage error ends it
/// in the state it had reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Ingested,
    MissingHandled,
    Engineered,
    OutliersHandled,
    Split,
    Built,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ingested => "ingested",
            Self::MissingHandled => "missing_handled",
            Self::Engineered => "engineered",
            Self::OutliersHandled => "outliers_handled",
            Self::Split => "split",
            Self::Built => "built",
        };
        f.write_str(name)
    }
}

/// Receives stage reports as a run progresses.
pub trait PipelineObserver: Send + Sync {
    fn on_stage(&self, state: PipelineState, report: &StageReport);
}

impl<F> PipelineObserver for F
where
    F: Fn(PipelineState, &StageReport) + Send + Sync,
{
    fn on_stage(&self, state: PipelineState, report: &StageReport) {
        self(state, report);
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Number of rows ingested
    pub rows_before: usize,

    /// Number of columns ingested, target included
    pub columns_before: usize,

    pub train_rows: usize,
    pub test_rows: usize,

    /// Feature columns the model was trained on
    pub feature_columns: usize,

    /// Description of the fitted model
    pub model: String,

    /// One report per stage, in execution order
    pub stages: Vec<StageReport>,

    /// Time taken for the whole run
    #[serde(skip)]
    pub duration: Duration,
}

impl RunReport {
    pub fn warnings(&self) -> impl Iterator<Item = &StageWarning> {
        self.stages.iter().flat_map(|s| s.warnings.iter())
    }

    pub fn warning_count(&self) -> usize {
        self.stages.iter().map(|s| s.warnings.len()).sum()
    }

    /// Create a summary message
    pub fn summary(&self) -> String {
        format!(
            "Pipeline completed: {} rows x {} columns in, train {} / test {} rows, {} features, {}, {} warning(s), {:.2}s",
            self.rows_before,
            self.columns_before,
            self.train_rows,
            self.test_rows,
            self.feature_columns,
            self.model,
            self.warning_count(),
            self.duration.as_secs_f64()
        )
    }
}

/// Everything a successful run produces.
#[derive(Debug)]
pub struct PipelineRun {
    pub model: Box<dyn TrainedModel>,
    pub split: Split,
    pub report: RunReport,
}

impl PipelineRun {
    /// Score the model on the held-out partition.
    ///
    /// # Errors
    ///
    /// Propagates prediction errors; `Domain` if the test target has gaps.
    pub fn evaluate(&self) -> Result<Evaluation> {
        evaluation::evaluate(
            self.model.as_ref(),
            &self.split.test_features,
            &self.split.test_target,
        )
    }
}

/// The composed pipeline: missing values, feature engineering, outliers,
/// split, model build.
pub struct Pipeline {
    missing: MissingValueHandler,
    features: FeatureEngineer,
    feature_spec: FeatureSpec,
    outliers: OutlierDetector,
    outlier_handling: OutlierHandling,
    splitter: DataSplitter,
    model: ModelBuilder,
    observer: Option<Box<dyn PipelineObserver>>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn missing_mut(&mut self) -> &mut MissingValueHandler {
        &mut self.missing
    }

    pub fn features_mut(&mut self) -> &mut FeatureEngineer {
        &mut self.features
    }

    pub fn outliers_mut(&mut self) -> &mut OutlierDetector {
        &mut self.outliers
    }

    pub fn splitter_mut(&mut self) -> &mut DataSplitter {
        &mut self.splitter
    }

    pub fn model_mut(&mut self) -> &mut ModelBuilder {
        &mut self.model
    }

    pub fn set_feature_spec(&mut self, spec: FeatureSpec) {
        self.feature_spec = spec;
    }

    pub fn set_outlier_handling(&mut self, handling: OutlierHandling) {
        self.outlier_handling = handling;
    }

    pub fn set_observer(&mut self, observer: impl PipelineObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    fn record(&self, reports: &mut Vec<StageReport>, state: PipelineState, report: StageReport) {
        tracing::debug!(state = %state, "pipeline state reached");
        if let Some(observer) = &self.observer {
            observer.on_stage(state, &report);
        }
        reports.push(report);
    }

    /// Run every stage on `dataset`, predicting `target`.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if `target` is not a column; otherwise the first
    /// stage error, unchanged. Nothing is rolled back.
    pub fn run(&self, dataset: TabularDataset, target: &str) -> Result<PipelineRun> {
        let start = Instant::now();
        if !dataset.contains(target) {
            return Err(PipelineError::config(format!(
                "target column '{target}' not found"
            )));
        }
        let rows_before = dataset.n_rows();
        let columns_before = dataset.n_columns();
        tracing::info!(rows_before, columns_before, target, "pipeline run started");

        let mut reports = Vec::with_capacity(5);

        let (dataset, report) = self.missing.execute(dataset)?.into_parts();
        self.record(&mut reports, PipelineState::MissingHandled, report);

        let (dataset, report) = self
            .features
            .execute(dataset, &self.feature_spec)?
            .into_parts();
        self.record(&mut reports, PipelineState::Engineered, report);

        let (dataset, report) = self
            .outliers
            .execute(dataset, &self.outlier_handling)?
            .into_parts();
        self.record(&mut reports, PipelineState::OutliersHandled, report);

        let (split, report) = self.splitter.execute(dataset, target)?.into_parts();
        self.record(&mut reports, PipelineState::Split, report);

        let (model, report) = self
            .model
            .execute(&split.train_features, &split.train_target)?
            .into_parts();
        self.record(&mut reports, PipelineState::Built, report);

        let report = RunReport {
            rows_before,
            columns_before,
            train_rows: split.train_len(),
            test_rows: split.test_len(),
            feature_columns: split.train_features.n_columns(),
            model: model.describe(),
            stages: reports,
            duration: start.elapsed(),
        };
        tracing::info!("{}", report.summary());
        Ok(PipelineRun {
            model,
            split,
            report,
        })
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("missing", &self.missing)
            .field("features", &self.features)
            .field("feature_spec", &self.feature_spec)
            .field("outliers", &self.outliers)
            .field("outlier_handling", &self.outlier_handling)
            .field("splitter", &self.splitter)
            .field("model", &self.model)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

/// Assembles a [`Pipeline`]; every stage must be given.
#[derive(Default)]
pub struct PipelineBuilder {
    missing: Option<MissingValueHandler>,
    features: Option<(FeatureEngineer, FeatureSpec)>,
    outliers: Option<(OutlierDetector, OutlierHandling)>,
    splitter: Option<DataSplitter>,
    model: Option<ModelBuilder>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn missing(self, strategy: impl MissingValueStrategy + 'static) -> Self {
        self.missing_handler(MissingValueHandler::new(strategy))
    }

    #[must_use]
    pub fn missing_handler(mut self, handler: MissingValueHandler) -> Self {
        self.missing = Some(handler);
        self
    }

    #[must_use]
    pub fn features(
        self,
        strategy: impl FeatureTransformStrategy + 'static,
        spec: FeatureSpec,
    ) -> Self {
        self.feature_engineer(FeatureEngineer::new(strategy), spec)
    }

    #[must_use]
    pub fn feature_engineer(mut self, engineer: FeatureEngineer, spec: FeatureSpec) -> Self {
        self.features = Some((engineer, spec));
        self
    }

    #[must_use]
    pub fn outliers(
        self,
        strategy: impl OutlierStrategy + 'static,
        handling: OutlierHandling,
    ) -> Self {
        self.outlier_detector(OutlierDetector::new(strategy), handling)
    }

    #[must_use]
    pub fn outlier_detector(mut self, detector: OutlierDetector, handling: OutlierHandling) -> Self {
        self.outliers = Some((detector, handling));
        self
    }

    #[must_use]
    pub fn split(self, strategy: impl SplitStrategy + 'static) -> Self {
        self.splitter(DataSplitter::new(strategy))
    }

    #[must_use]
    pub fn splitter(mut self, splitter: DataSplitter) -> Self {
        self.splitter = Some(splitter);
        self
    }

    #[must_use]
    pub fn model(self, strategy: impl ModelBuildStrategy + 'static) -> Self {
        self.model_builder(ModelBuilder::new(strategy))
    }

    #[must_use]
    pub fn model_builder(mut self, builder: ModelBuilder) -> Self {
        self.model = Some(builder);
        self
    }

    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] naming the first stage
    /// that was never configured.
    pub fn build(self) -> Result<Pipeline> {
        fn require<T>(stage: Option<T>, name: &str) -> Result<T> {
            stage.ok_or_else(|| PipelineError::config(format!("pipeline has no {name} stage")))
        }
        let missing = require(self.missing, "missing-value")?;
        let (features, feature_spec) = require(self.features, "feature engineering")?;
        let (outliers, outlier_handling) = require(self.outliers, "outlier")?;
        let splitter = require(self.splitter, "split")?;
        let model = require(self.model, "model build")?;
        Ok(Pipeline {
            missing,
            features,
            feature_spec,
            outliers,
            outlier_handling,
            splitter,
            model,
            observer: None,
        })
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;
    use crate::dataset::{categorical_series, dense_series, numeric_series};
    use crate::stages::{
        FillStrategy, Iqr, MeanBaselineStrategy, OneHotEncode, SimpleSplit, Stage, StandardScale,
    };
    use std::sync::{Arc, Mutex};

    fn houses() -> TabularDataset {
        TabularDataset::new(vec![
            numeric_series(
                "area",
                [Some(50.0), Some(60.0), None, Some(80.0), Some(90.0), Some(70.0), Some(65.0), Some(75.0), Some(85.0), Some(55.0)],
            ),
            categorical_series(
                "city",
                [Some("a"), Some("b"), Some("a"), Some("c"), Some("b"), Some("a"), Some("c"), Some("b"), Some("a"), Some("c")],
            ),
            dense_series(
                "price",
                [100.0, 120.0, 130.0, 160.0, 180.0, 140.0, 130.0, 150.0, 170.0, 110.0],
            ),
        ])
        .unwrap()
    }

    fn pipeline() -> Pipeline {
        Pipeline::builder()
            .missing(FillStrategy::mean())
            .features(OneHotEncode, FeatureSpec::new(["city"]))
            .outliers(Iqr::default(), OutlierHandling::Remove)
            .split(SimpleSplit::new(0.2, 42).unwrap())
            .model(MeanBaselineStrategy)
            .build()
            .unwrap()
    }

    #[test]
    fn test_run_threads_all_stages() {
        let run = pipeline().run(houses(), "price").unwrap();
        let stages: Vec<Stage> = run.report.stages.iter().map(|r| r.stage).collect();
        assert_eq!(
            stages,
            vec![
                Stage::MissingValues,
                Stage::FeatureEngineering,
                Stage::Outliers,
                Stage::Split,
                Stage::ModelBuild
            ]
        );
        assert_eq!(run.report.test_rows, 2);
        assert_eq!(run.report.train_rows, 8);
        // area + city_b + city_c
        assert_eq!(run.report.feature_columns, 3);
        assert!(run.report.summary().contains("10 rows"));
    }

    #[test]
    fn test_observer_sees_each_state() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut pipeline = pipeline();
        pipeline.set_observer(move |state: PipelineState, _: &StageReport| {
            sink.lock().unwrap().push(state);
        });
        pipeline.run(houses(), "price").unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                PipelineState::MissingHandled,
                PipelineState::Engineered,
                PipelineState::OutliersHandled,
                PipelineState::Split,
                PipelineState::Built
            ]
        );
    }

    #[test]
    fn test_stage_error_aborts_run() {
        let mut pipeline = pipeline();
        pipeline.features_mut().set_strategy(StandardScale);
        let err = pipeline.run(houses(), "price").unwrap_err();
        assert!(matches!(err, PipelineError::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_target_is_invalid() {
        let err = pipeline().run(houses(), "rent").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_builder_requires_every_stage() {
        let err = Pipeline::builder()
            .missing(FillStrategy::mean())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("feature engineering"));
    }

    #[test]
    fn test_evaluate_on_held_out() {
        let run = pipeline().run(houses(), "price").unwrap();
        let scores = run.evaluate().unwrap();
        assert_eq!(scores.rows, 2);
        assert!(scores.mse >= 0.0);
    }
}
