//! In-memory tabular data threaded through the pipeline.
//!
//! A [`TabularDataset`] owns a Polars [`DataFrame`] whose columns are either
//! numeric (`Float64`) or categorical (`String`); both allow missing cells.
//! Any other Polars type is normalised on the way in: integers and booleans
//! become `Float64` (with `NaN` read as missing), everything else is rendered
//! as text.
//!
//! Stages take a dataset by value and hand back a new one, so a dataset is
//! only ever owned by the stage currently working on it.
//!
//! ```
//! use tabprep::dataset::{TabularDataset, categorical_series, numeric_series};
//!
//! let ds = TabularDataset::new(vec![
//!     numeric_series("area", [Some(120.0), None, Some(80.0)]),
//!     categorical_series("city", [Some("Ames"), Some("Boone"), None]),
//! ])?;
//! assert_eq!(ds.n_rows(), 3);
//! assert_eq!(ds.missing_count(), 2);
//! # Ok::<(), tabprep::error::PipelineError>(())
//! ```

use crate::error::{PipelineError, Result};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Semantic type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl ColumnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Categorical => "categorical",
        }
    }

    /// Kind of a normalised column.
    pub fn of(series: &Series) -> Self {
        if series.dtype() == &DataType::Float64 {
            Self::Numeric
        } else {
            Self::Categorical
        }
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A literal cell value, used for constant fills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// The value as a Polars literal.
    pub fn to_expr(&self) -> Expr {
        match self {
            Self::Number(n) => lit(*n),
            Self::Text(s) => lit(s.clone()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

/// Numeric column that may have gaps.
pub fn numeric_series(
    name: impl Into<PlSmallStr>,
    values: impl IntoIterator<Item = Option<f64>>,
) -> Series {
    let values: Vec<Option<f64>> = values.into_iter().collect();
    Series::new(name.into(), values)
}

/// Numeric column without missing cells.
pub fn dense_series(name: impl Into<PlSmallStr>, values: impl IntoIterator<Item = f64>) -> Series {
    let values: Vec<f64> = values.into_iter().collect();
    Series::new(name.into(), values)
}

pub fn categorical_series<S: Into<String>>(
    name: impl Into<PlSmallStr>,
    values: impl IntoIterator<Item = Option<S>>,
) -> Series {
    let values: Vec<Option<String>> = values.into_iter().map(|v| v.map(Into::into)).collect();
    Series::new(name.into(), values)
}

/// Numeric cells of a column, or `TypeMismatch` for a categorical one.
///
/// # Errors
///
/// Returns [`PipelineError::TypeMismatch`] if the column is categorical.
pub fn numeric_values(series: &Series) -> Result<&Float64Chunked> {
    if ColumnKind::of(series) != ColumnKind::Numeric {
        return Err(PipelineError::type_mismatch(
            series.name().as_str(),
            ColumnKind::Numeric.as_str(),
            ColumnKind::Categorical.as_str(),
        ));
    }
    Ok(series.f64()?)
}

/// Values of a numeric column that must not have gaps, in row order.
///
/// # Errors
///
/// `TypeMismatch` for a categorical column, `Domain` if any cell is missing.
pub fn complete_values(series: &Series) -> Result<Vec<f64>> {
    let values = numeric_values(series)?;
    let missing = values.null_count();
    if missing > 0 {
        return Err(PipelineError::domain(
            series.name().as_str(),
            format!("{missing} missing values must be handled before modelling"),
        ));
    }
    Ok(values.into_no_null_iter().collect())
}

/// Most frequent present value and its count. Ties go to the smallest value.
///
/// # Errors
///
/// `DataProcessing` if Polars cannot count the column.
pub fn most_frequent(series: &Series) -> Result<Option<(Value, usize)>> {
    let counts = series
        .drop_nulls()
        .with_name("value".into())
        .value_counts(true, false, "counts".into(), false)?;
    let tally = counts
        .column("counts")?
        .as_materialized_series()
        .cast(&DataType::UInt64)?;
    let tally = tally.u64()?;
    let Some(top) = tally.get(0) else {
        return Ok(None);
    };

    // value_counts leaves equal counts in no particular order
    let tied = counts
        .column("value")?
        .as_materialized_series()
        .filter(&tally.equal(top))?
        .sort(SortOptions::default())?;
    let value = match ColumnKind::of(series) {
        ColumnKind::Numeric => tied.f64()?.get(0).map(Value::Number),
        ColumnKind::Categorical => tied.str()?.get(0).map(|s| Value::Text(s.to_owned())),
    };
    Ok(value.map(|v| (v, top as usize)))
}

fn normalise(column: &Column) -> Result<Column> {
    let series = column.as_materialized_series();
    let dtype = series.dtype();
    if dtype == &DataType::Float64 || dtype.is_primitive_numeric() || dtype.is_bool() {
        let cast = series.cast(&DataType::Float64)?;
        let values = cast.f64()?;
        let values = values.set(&values.is_nan(), None)?;
        Ok(values.into_series().into_column())
    } else if dtype == &DataType::String {
        Ok(column.clone())
    } else {
        Ok(series.cast(&DataType::String)?.into_column())
    }
}

/// Rows of named, typed columns backed by a Polars frame.
#[derive(Debug, Clone, Default)]
pub struct TabularDataset {
    df: DataFrame,
}

impl PartialEq for TabularDataset {
    fn eq(&self, other: &Self) -> bool {
        self.df.equals_missing(&other.df)
    }
}

impl TabularDataset {
    /// Build a dataset, checking that names are unique and lengths agree.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] on a duplicate column
    /// name or a column whose length differs from the first column.
    pub fn new(columns: Vec<Series>) -> Result<Self> {
        let rows = columns.first().map_or(0, |s| s.len());
        let mut seen = HashSet::new();
        for series in &columns {
            if !seen.insert(series.name().as_str()) {
                return Err(PipelineError::config(format!(
                    "duplicate column name '{}'",
                    series.name()
                )));
            }
            if series.len() != rows {
                return Err(PipelineError::config(format!(
                    "column '{}' has {} rows, expected {rows}",
                    series.name(),
                    series.len()
                )));
            }
        }
        let df = DataFrame::new(columns.into_iter().map(IntoColumn::into_column).collect())?;
        Self::from_df(df)
    }

    /// Wrap a Polars frame, normalising column types.
    ///
    /// # Errors
    ///
    /// `DataProcessing` if a column cannot be cast.
    pub fn from_df(df: DataFrame) -> Result<Self> {
        let columns = df
            .get_columns()
            .iter()
            .map(normalise)
            .collect::<Result<Vec<_>>>()?;
        if columns.is_empty() {
            return Ok(Self { df });
        }
        Ok(Self {
            df: DataFrame::new(columns)?,
        })
    }

    /// # Errors
    ///
    /// `DataProcessing` if the query fails.
    pub fn from_lazy(lf: LazyFrame) -> Result<Self> {
        Self::from_df(lf.collect()?)
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_df(self) -> DataFrame {
        self.df
    }

    pub fn lazy(self) -> LazyFrame {
        self.df.lazy()
    }

    /// Replace the dataset with the columns `exprs` produce.
    ///
    /// # Errors
    ///
    /// `DataProcessing` if an expression fails.
    pub fn select_exprs(self, exprs: Vec<Expr>) -> Result<Self> {
        if exprs.is_empty() {
            return Ok(self);
        }
        Self::from_lazy(self.lazy().select(exprs))
    }

    /// Overwrite (or append) the columns `exprs` produce, keeping the rest.
    ///
    /// # Errors
    ///
    /// `DataProcessing` if an expression fails.
    pub fn with_exprs(self, exprs: Vec<Expr>) -> Result<Self> {
        if exprs.is_empty() {
            return Ok(self);
        }
        Self::from_lazy(self.lazy().with_columns(exprs))
    }

    pub fn n_rows(&self) -> usize {
        self.df.height()
    }

    pub fn n_columns(&self) -> usize {
        self.df.width()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.df
            .get_column_names()
            .into_iter()
            .map(PlSmallStr::as_str)
            .collect()
    }

    pub fn names_of_kind(&self, kind: ColumnKind) -> Vec<String> {
        self.series()
            .filter(|s| ColumnKind::of(s) == kind)
            .map(|s| s.name().to_string())
            .collect()
    }

    /// Columns in order.
    pub fn series(&self) -> impl Iterator<Item = &Series> {
        self.df.get_columns().iter().map(Column::as_materialized_series)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.df.get_column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<&Series> {
        self.df
            .column(name)
            .ok()
            .map(Column::as_materialized_series)
    }

    /// Look up a column that must exist.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if the column is absent.
    pub fn require(&self, name: &str) -> Result<&Series> {
        self.column(name)
            .ok_or_else(|| PipelineError::config(format!("column '{name}' not found in dataset")))
    }

    /// A numeric column that must exist.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if absent, `TypeMismatch` if categorical.
    pub fn numeric(&self, name: &str) -> Result<&Float64Chunked> {
        numeric_values(self.require(name)?)
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        self.column(name).map(ColumnKind::of)
    }

    pub fn missing_count(&self) -> usize {
        self.df.get_columns().iter().map(Column::null_count).sum()
    }

    /// Append a column at the end.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] on a name clash or a
    /// length that does not match the dataset.
    pub fn push_column(&mut self, series: Series) -> Result<()> {
        if self.contains(series.name()) {
            return Err(PipelineError::config(format!(
                "column '{}' already exists",
                series.name()
            )));
        }
        if self.n_columns() > 0 && series.len() != self.n_rows() {
            return Err(PipelineError::config(format!(
                "column '{}' has {} rows, expected {}",
                series.name(),
                series.len(),
                self.n_rows()
            )));
        }
        let column = normalise(&series.into_column())?;
        self.df.with_column(column)?;
        Ok(())
    }

    /// Remove and return a column.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if the column is absent.
    pub fn remove_column(&mut self, name: &str) -> Result<Series> {
        if !self.contains(name) {
            return Err(PipelineError::config(format!(
                "column '{name}' not found in dataset"
            )));
        }
        Ok(self.df.drop_in_place(name)?.take_materialized_series())
    }

    /// Keep rows where the mask is true, preserving order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if the mask length is
    /// not the row count.
    pub fn filter_rows(self, keep: &[bool]) -> Result<Self> {
        if keep.len() != self.n_rows() {
            return Err(PipelineError::config(format!(
                "row mask has {} entries, dataset has {} rows",
                keep.len(),
                self.n_rows()
            )));
        }
        let mask = BooleanChunked::from_slice("keep".into(), keep);
        Ok(Self {
            df: self.df.filter(&mask)?,
        })
    }

    /// A new dataset with the given rows, in the given order.
    ///
    /// # Errors
    ///
    /// `DataProcessing` if an index is out of bounds.
    pub fn take_rows(&self, indices: &IdxCa) -> Result<Self> {
        Ok(Self {
            df: self.df.take(indices)?,
        })
    }

    /// Project onto the named columns, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] if a name is unknown.
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        for name in names {
            self.require(name)?;
        }
        Ok(Self {
            df: self.df.select(names.iter().copied())?,
        })
    }
}
