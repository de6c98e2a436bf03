//! Column profiling for a quick look at a dataset before running a pipeline.

use crate::dataset::{self, ColumnKind, TabularDataset};
use crate::error::Result;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NumericStats {
    pub mean: Option<f64>,

    /// Sample standard deviation
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub median: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoricalStats {
    pub distinct: usize,

    /// Most frequent label and its count
    pub top: Option<(String, usize)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnStats {
    Numeric(NumericStats),
    Categorical(CategoricalStats),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSummary {
    pub name: String,
    pub kind: ColumnKind,
    pub count: usize,
    pub nulls: usize,
    pub stats: ColumnStats,
}

impl ColumnSummary {
    pub fn null_pct(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.nulls as f64 / self.count as f64) * 100.0
        }
    }
}

fn numeric_stats(values: &Float64Chunked) -> Result<NumericStats> {
    Ok(NumericStats {
        mean: values.mean(),
        std: values.std(1),
        min: values.min(),
        p25: values.quantile(0.25, QuantileMethod::Linear)?,
        median: values.median(),
        p75: values.quantile(0.75, QuantileMethod::Linear)?,
        max: values.max(),
    })
}

fn categorical_stats(series: &Series) -> Result<CategoricalStats> {
    let top = dataset::most_frequent(series)?.map(|(label, count)| (label.to_string(), count));
    Ok(CategoricalStats {
        distinct: series.drop_nulls().n_unique()?,
        top,
    })
}

/// Profile one column.
///
/// # Errors
///
/// `DataProcessing` if Polars fails to aggregate the column.
pub fn summarise_column(series: &Series) -> Result<ColumnSummary> {
    let kind = ColumnKind::of(series);
    let stats = match kind {
        ColumnKind::Numeric => ColumnStats::Numeric(numeric_stats(series.f64()?)?),
        ColumnKind::Categorical => ColumnStats::Categorical(categorical_stats(series)?),
    };
    Ok(ColumnSummary {
        name: series.name().to_string(),
        kind,
        count: series.len(),
        nulls: series.null_count(),
        stats,
    })
}

/// Profile every column, in dataset order.
///
/// # Errors
///
/// As [`summarise_column`].
pub fn summarise(dataset: &TabularDataset) -> Result<Vec<ColumnSummary>> {
    dataset.series().map(summarise_column).collect()
}

fn cell(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_owned(), |v| format!("{v:.3}"))
}

impl fmt::Display for ColumnSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24} {:<12} {:>8} {:>7.1}%  ",
            self.name,
            self.kind,
            self.count,
            self.null_pct()
        )?;
        match &self.stats {
            ColumnStats::Numeric(s) => write!(
                f,
                "mean {} std {} min {} p25 {} median {} p75 {} max {}",
                cell(s.mean),
                cell(s.std),
                cell(s.min),
                cell(s.p25),
                cell(s.median),
                cell(s.p75),
                cell(s.max)
            ),
            ColumnStats::Categorical(s) => match &s.top {
                Some((label, count)) => {
                    write!(f, "{} distinct, top '{label}' ({count})", s.distinct)
                }
                None => write!(f, "{} distinct", s.distinct),
            },
        }
    }
}

/// Render a summary table, one line per column.
pub fn render(summaries: &[ColumnSummary]) -> String {
    let mut out = format!(
        "{:<24} {:<12} {:>8} {:>8}  stats\n",
        "column", "kind", "count", "missing"
    );
    for summary in summaries {
        out.push_str(&summary.to_string());
        out.push('\n');
    }
    out
}
