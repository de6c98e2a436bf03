//! Missing-value remediation.
//!
//! [`MissingValueHandler`] holds one [`MissingValueStrategy`] and delegates to
//! it. Two strategies ship:
//!
//! - [`DropStrategy`]: remove rows or columns that carry too few values.
//! - [`FillStrategy`]: impute with mean, median, mode or a constant.
//!
//! An unrecognised fill method is not fatal by default: the dataset passes
//! through untouched and a [`StageWarning`] is recorded. Build the strategy
//! with [`FillStrategy::strict`] to turn that into
//! [`PipelineError::InvalidConfiguration`] instead.

use super::report::{Stage, StageOutput, StageRecorder};
use crate::dataset::{self, ColumnKind, TabularDataset, Value};
use crate::error::{PipelineError, Result, StageWarning};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Behaviour contract for missing-value strategies.
pub trait MissingValueStrategy: Send + Sync {
    /// Short description used in reports, e.g. `fill(mean)`.
    fn describe(&self) -> String;

    /// Return a dataset with missing values handled in the targeted columns.
    ///
    /// # Errors
    ///
    /// Strategy-specific; see the implementations.
    fn handle(
        &self,
        dataset: TabularDataset,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<TabularDataset>;
}

/// Which dimension [`DropStrategy`] removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    #[default]
    Rows,
    Columns,
}

/// Drop rows or columns with missing values.
///
/// With a threshold, a row/column survives when it has at least `threshold`
/// non-missing cells. Without one, any missing cell drops it. Survivors keep
/// their order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DropStrategy {
    axis: Axis,
    threshold: Option<usize>,
}

impl DropStrategy {
    pub fn new(axis: Axis, threshold: Option<usize>) -> Self {
        Self { axis, threshold }
    }

    pub fn rows() -> Self {
        Self::new(Axis::Rows, None)
    }

    pub fn columns() -> Self {
        Self::new(Axis::Columns, None)
    }

    fn required(&self, total: usize) -> usize {
        self.threshold.unwrap_or(total)
    }
}

impl MissingValueStrategy for DropStrategy {
    fn describe(&self) -> String {
        let axis = match self.axis {
            Axis::Rows => "rows",
            Axis::Columns => "columns",
        };
        match self.threshold {
            Some(t) => format!("drop({axis}, threshold={t})"),
            None => format!("drop({axis})"),
        }
    }

    fn handle(
        &self,
        dataset: TabularDataset,
        _warnings: &mut Vec<StageWarning>,
    ) -> Result<TabularDataset> {
        match self.axis {
            Axis::Rows => {
                let required =
                    u32::try_from(self.required(dataset.n_columns())).unwrap_or(u32::MAX);
                let present = dataset
                    .column_names()
                    .into_iter()
                    .map(|name| col(name).is_not_null().cast(DataType::UInt32))
                    .reduce(|acc, cell| acc + cell);
                let Some(present) = present else {
                    return Ok(dataset);
                };
                TabularDataset::from_lazy(dataset.lazy().filter(present.gt_eq(lit(required))))
            }
            Axis::Columns => {
                let height = dataset.n_rows();
                let required = self.required(height);
                let keep: Vec<&str> = dataset
                    .series()
                    .filter(|s| height - s.null_count() >= required)
                    .map(|s| s.name().as_str())
                    .collect();
                dataset.select(&keep)
            }
        }
    }
}

/// Imputation method for [`FillStrategy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillMethod {
    Mean,
    Median,
    Mode,
    Constant,
    /// A method name nobody recognised; kept so it can be reported.
    Unrecognised(String),
}

impl FillMethod {
    /// Map a method name onto a method. Never fails: unknown names become
    /// [`FillMethod::Unrecognised`].
    pub fn parse(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "mean" => Self::Mean,
            "median" => Self::Median,
            "mode" => Self::Mode,
            "constant" => Self::Constant,
            _ => Self::Unrecognised(name.to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Constant => "constant",
            Self::Unrecognised(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Statistic {
    Mean,
    Median,
    Mode,
}

/// Fill missing cells.
///
/// `mean` and `median` are computed from the dataset being filled and touch
/// numeric columns only. `mode` fills every column. `constant` fills every
/// missing cell with the literal.
#[derive(Debug, Clone, PartialEq)]
pub struct FillStrategy {
    method: FillMethod,
    constant: Option<Value>,
    strict: bool,
}

impl FillStrategy {
    pub fn new(method: FillMethod) -> Self {
        Self {
            method,
            constant: None,
            strict: false,
        }
    }

    pub fn from_name(name: &str) -> Self {
        Self::new(FillMethod::parse(name))
    }

    pub fn mean() -> Self {
        Self::new(FillMethod::Mean)
    }

    pub fn median() -> Self {
        Self::new(FillMethod::Median)
    }

    pub fn mode() -> Self {
        Self::new(FillMethod::Mode)
    }

    pub fn constant(value: impl Into<Value>) -> Self {
        Self {
            method: FillMethod::Constant,
            constant: Some(value.into()),
            strict: false,
        }
    }

    /// Fail on an unrecognised method instead of degrading to a no-op.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn method(&self) -> &FillMethod {
        &self.method
    }

    fn fill_with_statistic(
        dataset: TabularDataset,
        warnings: &mut Vec<StageWarning>,
        statistic: Statistic,
    ) -> Result<TabularDataset> {
        let mut exprs = Vec::with_capacity(dataset.n_columns());
        for series in dataset.series() {
            let name = series.name().as_str();
            let expr = col(name);
            let kind = ColumnKind::of(series);
            if series.null_count() == 0
                || (kind == ColumnKind::Categorical && statistic != Statistic::Mode)
            {
                exprs.push(expr);
                continue;
            }
            if series.null_count() == series.len() {
                warnings.push(StageWarning::for_column(
                    name,
                    "column is entirely missing; left unfilled",
                ));
                exprs.push(expr);
                continue;
            }
            let filled = match statistic {
                Statistic::Mean => expr.clone().fill_null(expr.mean()),
                Statistic::Median => expr.clone().fill_null(expr.median()),
                Statistic::Mode => match dataset::most_frequent(series)? {
                    Some((value, _)) => expr.fill_null(value.to_expr()),
                    None => expr,
                },
            };
            exprs.push(filled);
        }
        dataset.select_exprs(exprs)
    }

    fn fill_constant(dataset: TabularDataset, value: &Value) -> Result<TabularDataset> {
        let mut exprs = Vec::with_capacity(dataset.n_columns());
        for series in dataset.series() {
            let name = series.name().as_str();
            if series.null_count() == 0 {
                exprs.push(col(name));
                continue;
            }
            let literal = match (ColumnKind::of(series), value) {
                (ColumnKind::Numeric, Value::Number(n)) => lit(*n),
                (ColumnKind::Numeric, Value::Text(text)) => match text.trim().parse::<f64>() {
                    Ok(n) => lit(n),
                    Err(_) => {
                        return Err(PipelineError::type_mismatch(
                            name,
                            "numeric literal",
                            format!("text literal '{text}'"),
                        ));
                    }
                },
                (ColumnKind::Categorical, literal) => lit(literal.to_string()),
            };
            exprs.push(col(name).fill_null(literal));
        }
        dataset.select_exprs(exprs)
    }
}

impl MissingValueStrategy for FillStrategy {
    fn describe(&self) -> String {
        match (&self.method, &self.constant) {
            (FillMethod::Constant, Some(v)) => format!("fill(constant={v})"),
            (method, _) => format!("fill({})", method.as_str()),
        }
    }

    fn handle(
        &self,
        dataset: TabularDataset,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<TabularDataset> {
        match &self.method {
            FillMethod::Mean => Self::fill_with_statistic(dataset, warnings, Statistic::Mean),
            FillMethod::Median => Self::fill_with_statistic(dataset, warnings, Statistic::Median),
            FillMethod::Mode => Self::fill_with_statistic(dataset, warnings, Statistic::Mode),
            FillMethod::Constant => {
                let value = self.constant.as_ref().ok_or_else(|| {
                    PipelineError::config("fill method 'constant' requires a constant value")
                })?;
                Self::fill_constant(dataset, value)
            }
            FillMethod::Unrecognised(name) => {
                if self.strict {
                    return Err(PipelineError::config(format!(
                        "unknown fill method '{name}'"
                    )));
                }
                warnings.push(StageWarning::new(format!(
                    "unknown fill method '{name}'; no missing values handled"
                )));
                Ok(dataset)
            }
        }
    }
}

/// Stage engine for missing-value handling.
pub struct MissingValueHandler {
    strategy: Box<dyn MissingValueStrategy>,
}

impl MissingValueHandler {
    pub fn new(strategy: impl MissingValueStrategy + 'static) -> Self {
        Self {
            strategy: Box::new(strategy),
        }
    }

    pub fn from_boxed(strategy: Box<dyn MissingValueStrategy>) -> Self {
        Self { strategy }
    }

    pub fn set_strategy(&mut self, strategy: impl MissingValueStrategy + 'static) {
        self.set_boxed_strategy(Box::new(strategy));
    }

    pub fn set_boxed_strategy(&mut self, strategy: Box<dyn MissingValueStrategy>) {
        tracing::debug!(
            from = %self.strategy.describe(),
            to = %strategy.describe(),
            "switching missing-value strategy"
        );
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> &dyn MissingValueStrategy {
        self.strategy.as_ref()
    }

    /// Run the held strategy.
    ///
    /// # Errors
    ///
    /// Propagates the strategy's error unchanged.
    pub fn execute(&self, dataset: TabularDataset) -> Result<StageOutput<TabularDataset>> {
        let recorder = StageRecorder::begin(
            Stage::MissingValues,
            self.strategy.describe(),
            dataset.n_rows(),
            dataset.n_columns(),
        );
        let mut warnings = Vec::new();
        let output = self.strategy.handle(dataset, &mut warnings)?;
        let report = recorder.finish(output.n_rows(), output.n_columns(), warnings);
        Ok(StageOutput { output, report })
    }
}

impl std::fmt::Debug for MissingValueHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissingValueHandler")
            .field("strategy", &self.strategy.describe())
            .finish()
    }
}
