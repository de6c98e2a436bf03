//! The five pipeline stages.
//!
//! Each stage is a small engine holding exactly one strategy behind a trait
//! object. Engines take `&mut self` to swap the strategy and `&self` to run
//! it, so a swap can never race an execution. Every `execute` returns a
//! [`StageOutput`] carrying the stage's product and its [`StageReport`].
//!
//! | stage    | engine                 | strategy trait              |
//! |----------|------------------------|-----------------------------|
//! | missing  | [`MissingValueHandler`]| [`MissingValueStrategy`]    |
//! | features | [`FeatureEngineer`]    | [`FeatureTransformStrategy`]|
//! | outliers | [`OutlierDetector`]    | [`OutlierStrategy`]         |
//! | split    | [`DataSplitter`]       | [`SplitStrategy`]           |
//! | model    | [`ModelBuilder`]       | [`ModelBuildStrategy`]      |

pub mod features;
pub mod missing;
pub mod model;
pub mod outliers;
pub mod report;
pub mod split;

pub use features::{
    FeatureEngineer, FeatureSpec, FeatureTransformStrategy, LogTransform, MinMaxScale,
    OneHotEncode, StandardScale,
};
pub use missing::{
    Axis, DropStrategy, FillMethod, FillStrategy, MissingValueHandler, MissingValueStrategy,
};
pub use model::{
    DecisionTreeStrategy, LinearRegressionStrategy, MeanBaselineStrategy, ModelBuildStrategy,
    ModelBuilder, TrainedModel,
};
pub use outliers::{Iqr, OutlierDetector, OutlierHandling, OutlierMask, OutlierStrategy, ZScore};
pub use report::{Stage, StageOutput, StageReport};
pub use split::{DataSplitter, SimpleSplit, Split, SplitStrategy};
