//! Per-stage execution reports.
//!
//! Each stage engine returns what it did alongside its output instead of
//! writing to a process-wide logger only. The orchestrator folds these into
//! the run report.

use crate::error::StageWarning;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// The five pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MissingValues,
    FeatureEngineering,
    Outliers,
    Split,
    ModelBuild,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingValues => "missing_values",
            Self::FeatureEngineering => "feature_engineering",
            Self::Outliers => "outliers",
            Self::Split => "split",
            Self::ModelBuild => "model_build",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a single stage invocation did.
#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage: Stage,

    /// Description of the strategy that ran, e.g. `fill(mean)`
    pub strategy: String,

    pub rows_before: usize,
    pub columns_before: usize,
    pub rows_after: usize,
    pub columns_after: usize,

    /// Non-fatal conditions raised while running
    #[serde(serialize_with = "serialize_warnings")]
    pub warnings: Vec<StageWarning>,

    #[serde(skip)]
    pub duration: Duration,
}

fn serialize_warnings<S>(warnings: &[StageWarning], serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(warnings.iter().map(ToString::to_string))
}

impl StageReport {
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} via {}: rows {} -> {}, columns {} -> {}, {} warning(s)",
            self.stage,
            self.strategy,
            self.rows_before,
            self.rows_after,
            self.columns_before,
            self.columns_after,
            self.warnings.len()
        )
    }
}

/// A stage's output together with its report.
#[derive(Debug)]
pub struct StageOutput<T> {
    pub output: T,
    pub report: StageReport,
}

impl<T> StageOutput<T> {
    pub fn into_parts(self) -> (T, StageReport) {
        (self.output, self.report)
    }
}

/// Captures the "before" shape and start time of a stage invocation.
pub(crate) struct StageRecorder {
    stage: Stage,
    strategy: String,
    rows_before: usize,
    columns_before: usize,
    start: Instant,
}

impl StageRecorder {
    pub(crate) fn begin(stage: Stage, strategy: String, rows: usize, columns: usize) -> Self {
        tracing::info!(stage = %stage, strategy = %strategy, rows, columns, "stage started");
        Self {
            stage,
            strategy,
            rows_before: rows,
            columns_before: columns,
            start: Instant::now(),
        }
    }

    pub(crate) fn finish(
        self,
        rows_after: usize,
        columns_after: usize,
        warnings: Vec<StageWarning>,
    ) -> StageReport {
        for warning in &warnings {
            tracing::warn!(stage = %self.stage, strategy = %self.strategy, "{warning}");
        }
        let report = StageReport {
            stage: self.stage,
            strategy: self.strategy,
            rows_before: self.rows_before,
            columns_before: self.columns_before,
            rows_after,
            columns_after,
            warnings,
            duration: self.start.elapsed(),
        };
        tracing::info!(stage = %report.stage, "{}", report.summary());
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_builds_report() {
        let recorder = StageRecorder::begin(Stage::Outliers, "zscore(3)".to_owned(), 10, 2);
        let report = recorder.finish(8, 2, vec![StageWarning::new("unknown method 'trim'")]);
        assert_eq!(report.stage, Stage::Outliers);
        assert_eq!(report.rows_before, 10);
        assert_eq!(report.rows_after, 8);
        assert!(report.has_warnings());
        assert!(report.summary().contains("rows 10 -> 8"));
    }

    #[test]
    fn test_report_serializes_warnings_as_text() {
        let report = StageRecorder::begin(Stage::Split, "simple".to_owned(), 5, 1).finish(
            5,
            1,
            vec![StageWarning::for_column("a", "odd")],
        );
        let json = serde_json::to_string(&report).expect("serializable");
        assert!(json.contains("\"stage\":\"split\""));
        assert!(json.contains("[a] odd"));
    }
}
