//! Error taxonomy for pipeline runs.
//!
//! Every fallible operation in the core returns [`Result`]. Three variants
//! carry the pipeline's own failure modes, and each aborts a run:
//!
//! - [`PipelineError::InvalidConfiguration`]: unknown strategy name, missing
//!   target column, malformed feature spec.
//! - [`PipelineError::Domain`]: a numeric precondition failed (negative input to
//!   a log transform, zero variance into scaling). Always names the column.
//! - [`PipelineError::TypeMismatch`]: a column of the wrong semantic type
//!   reached a stage.
//!
//! Non-fatal conditions are not errors; they travel as [`StageWarning`]s inside
//! the stage report so a caller can observe them without the run failing.
//!
//! ```
//! use tabprep::error::{PipelineError, ResultExt as _};
//!
//! let err: tabprep::error::Result<()> =
//!     Err(PipelineError::InvalidConfiguration("unknown method 'avg'".to_owned()));
//! let err = err.context("missing-value stage").unwrap_err();
//! assert!(err.to_string().contains("missing-value stage"));
//! ```

use std::fmt;

/// Main error type for pipeline operations.
#[derive(Debug)]
pub enum PipelineError {
    /// Unknown strategy name, missing target column, malformed feature spec
    InvalidConfiguration(String),

    /// A numeric precondition was violated for a specific column
    Domain { column: String, message: String },

    /// A column of the wrong semantic type reached a stage
    TypeMismatch {
        column: String,
        expected: String,
        found: String,
    },

    /// Model fitting or prediction failed inside the estimator
    Model(String),

    /// Reading or writing tabular files failed (Polars)
    DataProcessing(String),

    /// I/O errors
    Io(std::io::Error),
}

impl PipelineError {
    pub fn domain(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Domain {
            column: column.into(),
            message: message.into(),
        }
    }

    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    /// The column the error is about, when there is one.
    pub fn column(&self) -> Option<&str> {
        match self {
            Self::Domain { column, .. } | Self::TypeMismatch { column, .. } => Some(column),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfiguration(msg) => write!(f, "Invalid configuration: {msg}"),
            Self::Domain { column, message } => {
                write!(f, "Domain error in column '{column}': {message}")
            }
            Self::TypeMismatch {
                column,
                expected,
                found,
            } => write!(
                f,
                "Type mismatch in column '{column}': expected {expected}, found {found}"
            ),
            Self::Model(msg) => write!(f, "Model error: {msg}"),
            Self::DataProcessing(msg) => write!(f, "Data processing error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidConfiguration(format!("JSON error: {err}"))
    }
}

impl From<polars::error::PolarsError> for PipelineError {
    fn from(err: polars::error::PolarsError) -> Self {
        Self::DataProcessing(err.to_string())
    }
}

impl From<linfa::Error> for PipelineError {
    fn from(err: linfa::Error) -> Self {
        Self::Model(err.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Extension trait to add context to results.
///
/// Context is prepended to the message of message-carrying variants; the
/// variant itself is kept so callers can still match on the taxonomy.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context using a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<PipelineError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| prepend(e.into(), &msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| prepend(e.into(), &f()))
    }
}

fn prepend(err: PipelineError, ctx: &str) -> PipelineError {
    match err {
        PipelineError::InvalidConfiguration(msg) => {
            PipelineError::InvalidConfiguration(format!("{ctx}: {msg}"))
        }
        PipelineError::Domain { column, message } => PipelineError::Domain {
            column,
            message: format!("{ctx}: {message}"),
        },
        PipelineError::Model(msg) => PipelineError::Model(format!("{ctx}: {msg}")),
        PipelineError::DataProcessing(msg) => {
            PipelineError::DataProcessing(format!("{ctx}: {msg}"))
        }
        PipelineError::Io(e) => {
            PipelineError::Io(std::io::Error::new(e.kind(), format!("{ctx}: {e}")))
        }
        mismatch @ PipelineError::TypeMismatch { .. } => mismatch,
    }
}

/// A non-fatal condition raised by a strategy.
///
/// The run continues, but the warning is carried in the stage report and the
/// final run report rather than only being logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageWarning {
    /// Column the warning concerns, if any
    pub column: Option<String>,
    pub message: String,
}

impl StageWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            column: None,
            message: message.into(),
        }
    }

    pub fn for_column(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            column: Some(column.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.column {
            Some(col) => write!(f, "[{col}] {}", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::domain("price", "std is zero");
        assert_eq!(
            err.to_string(),
            "Domain error in column 'price': std is zero"
        );
        assert_eq!(err.column(), Some("price"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = PipelineError::type_mismatch("city", "numeric", "categorical");
        assert_eq!(
            err.to_string(),
            "Type mismatch in column 'city': expected numeric, found categorical"
        );
    }

    #[test]
    fn test_result_context_keeps_variant() {
        let result: Result<()> = Err(PipelineError::config("unknown method 'avg'"));
        let err = result.context("missing-value stage").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
        assert!(err.to_string().contains("missing-value stage"));
    }

    #[test]
    fn test_io_conversion() {
        let result: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "data.csv",
        ));
        let err = result.context("Failed to read dataset").unwrap_err();
        assert!(err.to_string().contains("Failed to read dataset"));
    }

    #[test]
    fn test_warning_display() {
        let w = StageWarning::for_column("age", "column is entirely missing");
        assert_eq!(w.to_string(), "[age] column is entirely missing");
    }
}
