//! Hold-out scoring for fitted models.

use crate::dataset::{self, TabularDataset};
use crate::error::{PipelineError, Result};
use crate::stages::TrainedModel;
use linfa::prelude::*;
use ndarray::Array1;
use polars::prelude::Series;
use serde::Serialize;
use std::fmt;

/// Regression scores on a held-out partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Evaluation {
    pub rows: usize,
    pub mse: f64,

    /// Coefficient of determination; not finite when the truth is constant
    pub r2: f64,
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MSE {:.4}, R² {:.4} over {} rows", self.mse, self.r2, self.rows)
    }
}

/// Predict `features` with `model` and compare against `truth`.
///
/// # Errors
///
/// `InvalidConfiguration` for an empty partition or length mismatch, `Domain`
/// for gaps in `truth`, and anything the model's `predict` returns.
pub fn evaluate(
    model: &dyn TrainedModel,
    features: &TabularDataset,
    truth: &Series,
) -> Result<Evaluation> {
    if truth.null_count() > 0 {
        return Err(PipelineError::domain(
            truth.name().as_str(),
            "cannot score against missing targets",
        ));
    }
    let expected = dataset::complete_values(truth)?;
    if expected.is_empty() {
        return Err(PipelineError::config("cannot evaluate on an empty partition"));
    }
    let predicted = model.predict(features)?;
    if predicted.len() != expected.len() {
        return Err(PipelineError::config(format!(
            "model returned {} predictions for {} rows",
            predicted.len(),
            expected.len()
        )));
    }

    let predicted = Array1::from(predicted);
    let expected = Array1::from(expected);
    let evaluation = Evaluation {
        rows: expected.len(),
        mse: predicted.mean_squared_error(&expected)?,
        r2: predicted.r2(&expected)?,
    };
    tracing::info!(
        rows = evaluation.rows,
        mse = evaluation.mse,
        r2 = evaluation.r2,
        "model evaluated"
    );
    Ok(evaluation)
}
