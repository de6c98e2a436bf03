//! Pipeline composition, configuration and run reporting.
//!
//! A [`Pipeline`] threads a dataset through the five stage engines in a fixed
//! order and returns a [`PipelineRun`]: the fitted model, the train/test split
//! and a [`RunReport`].
//!
//! # Example: Programmatic Pipeline Creation
//!
//! ```no_run
//! use tabprep::pipeline::Pipeline;
//! use tabprep::stages::{
//!     FeatureSpec, FillStrategy, MeanBaselineStrategy, OneHotEncode, OutlierHandling,
//!     SimpleSplit, ZScore,
//! };
//!
//! let pipeline = Pipeline::builder()
//!     .missing(FillStrategy::mean())
//!     .features(OneHotEncode, FeatureSpec::new(["city"]))
//!     .outliers(ZScore::robust(3.0), OutlierHandling::Remove)
//!     .split(SimpleSplit::new(0.2, 42)?)
//!     .model(MeanBaselineStrategy)
//!     .build()?;
//!
//! let dataset = tabprep::io::load_dataset("houses.csv")?;
//! let run = pipeline.run(dataset, "price")?;
//! println!("{}", run.report.summary());
//! # Ok::<(), tabprep::error::PipelineError>(())
//! ```
//!
//! The same pipeline can be described as JSON and loaded with
//! [`PipelineConfig::from_file`]; see [`config`].

pub mod config;
pub mod orchestrator;

pub use config::{CONFIG_VERSION, PipelineConfig};
pub use orchestrator::{
    Pipeline, PipelineBuilder, PipelineObserver, PipelineRun, PipelineState, RunReport,
};
