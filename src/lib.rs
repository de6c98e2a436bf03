//! # tabprep - strategy-driven tabular preprocessing and model fitting
//!
//! tabprep takes a table of numeric and categorical columns through five
//! stages, in a fixed order:
//!
//! 1. missing values (drop or fill)
//! 2. feature engineering (log, scaling, one-hot)
//! 3. outliers (z-score or IQR, then remove or cap)
//! 4. train/test split
//! 5. model build (linear regression, decision tree, mean baseline)
//!
//! Each stage is an engine holding one swappable strategy. The pipeline
//! returns the fitted model, the split and a report of what every stage did.
//!
//! ## Quick Start
//!
//! ```no_run
//! use tabprep::pipeline::PipelineConfig;
//!
//! # fn example() -> tabprep::error::Result<()> {
//! let config = PipelineConfig::from_file("pipeline.json")?;
//! let pipeline = config.build()?;
//! let dataset = tabprep::io::load_dataset("houses.csv")?;
//!
//! let run = pipeline.run(dataset, &config.target)?;
//! println!("{}", run.report.summary());
//! println!("{}", run.evaluate()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`dataset`]: the in-memory table threaded through the stages
//! - [`stages`]: strategy traits, concrete strategies and stage engines
//! - [`pipeline`]: orchestration, JSON configuration and run reports
//! - [`io`]: CSV / Parquet / JSON loading and saving via Polars
//! - [`inspect`]: per-column summaries
//! - [`evaluation`]: hold-out MSE and R²
//! - [`error`]: the error taxonomy and stage warnings
//! - [`logging`]: tracing setup for the binary

pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod inspect;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod stages;

pub use dataset::{ColumnKind, TabularDataset, Value};
pub use error::{PipelineError, Result, StageWarning};
pub use pipeline::{Pipeline, PipelineConfig, PipelineRun, RunReport};
