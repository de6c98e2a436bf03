//! Train/test splitting.

use super::report::{Stage, StageOutput, StageRecorder};
use crate::dataset::TabularDataset;
use crate::error::{PipelineError, Result, StageWarning};
use polars::prelude::*;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

/// Disjoint train and test partitions of a dataset, with the target column
/// held out of the feature tables.
#[derive(Debug, Clone)]
pub struct Split {
    pub train_features: TabularDataset,
    pub test_features: TabularDataset,
    pub train_target: Series,
    pub test_target: Series,

    /// Row positions in the dataset that was split, ascending
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

impl Split {
    pub fn train_len(&self) -> usize {
        self.train_indices.len()
    }

    pub fn test_len(&self) -> usize {
        self.test_indices.len()
    }

    pub fn target_name(&self) -> &str {
        self.train_target.name().as_str()
    }
}

impl PartialEq for Split {
    fn eq(&self, other: &Self) -> bool {
        self.train_indices == other.train_indices
            && self.test_indices == other.test_indices
            && self.train_features == other.train_features
            && self.test_features == other.test_features
            && self.train_target.equals_missing(&other.train_target)
            && self.test_target.equals_missing(&other.test_target)
    }
}

fn row_index(indices: &[usize]) -> IdxCa {
    IdxCa::from_vec("row".into(), indices.iter().map(|&i| i as IdxSize).collect())
}

/// Behaviour contract for splitting.
pub trait SplitStrategy: Send + Sync {
    fn describe(&self) -> String;

    fn split(
        &self,
        dataset: TabularDataset,
        target: &str,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<Split>;
}

/// Seeded random hold-out split.
///
/// `round(test_fraction * n)` rows go to the test side, picked by a ChaCha
/// permutation of the row positions. The same seed always gives the same
/// partition. Each side keeps the original relative row order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleSplit {
    test_fraction: f64,
    seed: u64,
}

impl SimpleSplit {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] unless
    /// `0 < test_fraction < 1`.
    pub fn new(test_fraction: f64, seed: u64) -> Result<Self> {
        if test_fraction.is_nan() || test_fraction <= 0.0 || test_fraction >= 1.0 {
            return Err(PipelineError::config(format!(
                "test_fraction must be strictly between 0 and 1, got {test_fraction}"
            )));
        }
        Ok(Self {
            test_fraction,
            seed,
        })
    }

    pub fn test_fraction(&self) -> f64 {
        self.test_fraction
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of rows the test side receives for a dataset of `rows` rows.
    pub fn test_size(&self, rows: usize) -> usize {
        ((self.test_fraction * rows as f64).round() as usize).min(rows)
    }
}

impl Default for SimpleSplit {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl SplitStrategy for SimpleSplit {
    fn describe(&self) -> String {
        format!("simple(test_fraction={}, seed={})", self.test_fraction, self.seed)
    }

    fn split(
        &self,
        mut dataset: TabularDataset,
        target: &str,
        warnings: &mut Vec<StageWarning>,
    ) -> Result<Split> {
        if !dataset.contains(target) {
            return Err(PipelineError::config(format!(
                "target column '{target}' not found"
            )));
        }
        let rows = dataset.n_rows();
        let test_size = self.test_size(rows);
        if test_size == 0 || test_size == rows {
            warnings.push(StageWarning::new(format!(
                "split of {rows} rows at test_fraction {} leaves one side empty",
                self.test_fraction
            )));
        }

        let mut order: Vec<usize> = (0..rows).collect();
        order.shuffle(&mut ChaCha8Rng::seed_from_u64(self.seed));
        let (test, train) = order.split_at(test_size);
        let mut test_indices = test.to_vec();
        let mut train_indices = train.to_vec();
        test_indices.sort_unstable();
        train_indices.sort_unstable();

        let target_column = dataset.remove_column(target)?;
        let (train_rows, test_rows) = (row_index(&train_indices), row_index(&test_indices));
        Ok(Split {
            train_features: dataset.take_rows(&train_rows)?,
            test_features: dataset.take_rows(&test_rows)?,
            train_target: target_column.take(&train_rows)?,
            test_target: target_column.take(&test_rows)?,
            train_indices,
            test_indices,
        })
    }
}

/// Stage engine for splitting.
pub struct DataSplitter {
    strategy: Box<dyn SplitStrategy>,
}

impl DataSplitter {
    pub fn new(strategy: impl SplitStrategy + 'static) -> Self {
        Self::from_boxed(Box::new(strategy))
    }

    pub fn from_boxed(strategy: Box<dyn SplitStrategy>) -> Self {
        Self { strategy }
    }

    pub fn set_strategy(&mut self, strategy: impl SplitStrategy + 'static) {
        self.set_boxed_strategy(Box::new(strategy));
    }

    pub fn set_boxed_strategy(&mut self, strategy: Box<dyn SplitStrategy>) {
        tracing::debug!(
            from = %self.strategy.describe(),
            to = %strategy.describe(),
            "switching split strategy"
        );
        self.strategy = strategy;
    }

    pub fn strategy(&self) -> &dyn SplitStrategy {
        self.strategy.as_ref()
    }

    /// Split `dataset`, holding out `target`.
    ///
    /// # Errors
    ///
    /// Propagates the strategy's error unchanged.
    pub fn execute(&self, dataset: TabularDataset, target: &str) -> Result<StageOutput<Split>> {
        let recorder = StageRecorder::begin(
            Stage::Split,
            self.strategy.describe(),
            dataset.n_rows(),
            dataset.n_columns(),
        );
        let mut warnings = Vec::new();
        let split = self.strategy.split(dataset, target, &mut warnings)?;
        tracing::debug!(train = split.train_len(), test = split.test_len(), "split sizes");
        let report = recorder.finish(
            split.train_len(),
            split.train_features.n_columns(),
            warnings,
        );
        Ok(StageOutput {
            output: split,
            report,
        })
    }
}

impl std::fmt::Debug for DataSplitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSplitter")
            .field("strategy", &self.strategy.describe())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;
    use crate::dataset::{complete_values, dense_series};
    use std::collections::HashSet;

    fn numbered(rows: usize) -> TabularDataset {
        TabularDataset::new(vec![
            dense_series("id", (0..rows).map(|i| i as f64)),
            dense_series("y", (0..rows).map(|i| (i * 2) as f64)),
        ])
        .unwrap()
    }

    fn run(rows: usize, fraction: f64, seed: u64) -> Split {
        DataSplitter::new(SimpleSplit::new(fraction, seed).unwrap())
            .execute(numbered(rows), "y")
            .unwrap()
            .output
    }

    #[test]
    fn test_split_sizes_follow_fraction() {
        let split = run(100, 0.25, 7);
        assert_eq!(split.test_len(), 25);
        assert_eq!(split.train_len(), 75);
        assert_eq!(split.train_features.n_rows(), 75);
        assert_eq!(split.test_target.len(), 25);

        // round(0.2 * 11) = 2
        assert_eq!(run(11, 0.2, 1).test_len(), 2);
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let split = run(50, 0.3, 3);
        let train: HashSet<_> = split.train_indices.iter().copied().collect();
        let test: HashSet<_> = split.test_indices.iter().copied().collect();
        assert!(train.is_disjoint(&test));
        assert_eq!(train.len() + test.len(), 50);
    }

    #[test]
    fn test_same_seed_same_partition() {
        assert_eq!(run(40, 0.2, 42), run(40, 0.2, 42));
        assert_ne!(run(40, 0.2, 42).test_indices, run(40, 0.2, 43).test_indices);
    }

    #[test]
    fn test_sides_keep_relative_order() {
        let split = run(30, 0.4, 9);
        let ids = complete_values(split.train_features.require("id").unwrap()).unwrap();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        let expected: Vec<f64> = split.train_indices.iter().map(|&i| (i * 2) as f64).collect();
        assert_eq!(complete_values(&split.train_target).unwrap(), expected);
    }

    #[test]
    fn test_target_held_out_of_features() {
        let split = run(10, 0.2, 0);
        assert!(!split.train_features.contains("y"));
        assert!(!split.test_features.contains("y"));
        assert_eq!(split.target_name(), "y");
    }

    #[test]
    fn test_invalid_configuration() {
        assert!(matches!(
            SimpleSplit::new(0.0, 1),
            Err(PipelineError::InvalidConfiguration(_))
        ));
        assert!(SimpleSplit::new(1.0, 1).is_err());
        assert!(SimpleSplit::new(f64::NAN, 1).is_err());

        let err = DataSplitter::new(SimpleSplit::default())
            .execute(numbered(5), "missing")
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_empty_side_warns() {
        let staged = DataSplitter::new(SimpleSplit::new(0.1, 0).unwrap())
            .execute(numbered(3), "y")
            .unwrap();
        assert_eq!(staged.output.test_len(), 0);
        assert!(staged.report.has_warnings());
    }
}
