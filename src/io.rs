//! Reading and writing datasets through Polars.
//!
//! The reader is picked by file extension (`csv`, `parquet`, `json`).
//! Integer, float and boolean columns become numeric columns; every other
//! type is rendered as text and becomes categorical. `NaN` is read as a
//! missing cell.

use crate::dataset::TabularDataset;
use crate::error::{PipelineError, Result, ResultExt as _};
use polars::prelude::*;
use std::path::Path;

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
    Json,
}

impl FileFormat {
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfiguration`] for an unknown or
    /// missing extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "csv" => Ok(Self::Csv),
            "parquet" => Ok(Self::Parquet),
            "json" => Ok(Self::Json),
            _ => Err(PipelineError::config(format!(
                "unsupported file extension '{ext}' for {}",
                path.display()
            ))),
        }
    }
}

/// Read a file into a Polars frame.
///
/// # Errors
///
/// `InvalidConfiguration` for an unsupported extension, `Io` or
/// `DataProcessing` if reading fails.
pub fn load_df(path: &Path) -> Result<DataFrame> {
    let df = match FileFormat::from_path(path)? {
        FileFormat::Csv => LazyCsvReader::new(path)
            .with_infer_schema_length(Some(10000))
            .with_has_header(true)
            .finish()?
            .collect()
            .context("reading CSV")?,
        FileFormat::Parquet => ParquetReader::new(std::fs::File::open(path)?)
            .finish()
            .context("reading Parquet")?,
        FileFormat::Json => JsonReader::new(std::fs::File::open(path)?)
            .finish()
            .context("reading JSON")?,
    };
    tracing::debug!(
        path = %path.display(),
        rows = df.height(),
        columns = df.width(),
        "file loaded"
    );
    Ok(df)
}

/// # Errors
///
/// As [`load_df`], for writing.
pub fn save_df(df: &mut DataFrame, path: &Path) -> Result<()> {
    let format = FileFormat::from_path(path)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    match format {
        FileFormat::Parquet => {
            ParquetWriter::new(file)
                .finish(df)
                .context("writing Parquet")?;
        }
        FileFormat::Csv => CsvWriter::new(file)
            .include_header(true)
            .finish(df)
            .context("writing CSV")?,
        FileFormat::Json => JsonWriter::new(file)
            .with_json_format(JsonFormat::Json)
            .finish(df)
            .context("writing JSON")?,
    }
    Ok(())
}

/// Load a CSV, Parquet or JSON file as a dataset.
///
/// # Errors
///
/// `InvalidConfiguration` for an unsupported extension, `Io` or
/// `DataProcessing` if reading fails.
pub fn load_dataset(path: impl AsRef<Path>) -> Result<TabularDataset> {
    let path = path.as_ref();
    let df = load_df(path).with_context(|| format!("loading {}", path.display()))?;
    TabularDataset::from_df(df)
}

/// Write a dataset as CSV, Parquet or JSON, chosen by extension.
///
/// # Errors
///
/// `InvalidConfiguration` for an unsupported extension, `Io` or
/// `DataProcessing` if writing fails.
pub fn save_dataset(dataset: &TabularDataset, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut df = dataset.df().clone();
    save_df(&mut df, path).with_context(|| format!("saving {}", path.display()))?;
    tracing::info!(path = %path.display(), rows = dataset.n_rows(), "dataset written");
    Ok(())
}

#[cfg(test)]
mod tests {
    #![expect(clippy::unwrap_used)]
    use super::*;
    use crate::dataset::{self, ColumnKind, categorical_series, numeric_series};

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_csv_types_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "houses.csv",
            "area,rooms,city,garage\n120.5,3,Ames,true\n,2,Boone,false\n80,,,true\n",
        );
        let ds = load_dataset(&path).unwrap();
        assert_eq!(ds.n_rows(), 3);
        assert_eq!(ds.kind("area"), Some(ColumnKind::Numeric));
        assert_eq!(ds.kind("rooms"), Some(ColumnKind::Numeric));
        assert_eq!(ds.kind("city"), Some(ColumnKind::Categorical));
        let garage = dataset::complete_values(ds.require("garage").unwrap()).unwrap();
        assert_eq!(garage, vec![1.0, 0.0, 1.0]);
        assert_eq!(ds.require("area").unwrap().null_count(), 1);
        assert_eq!(ds.require("city").unwrap().null_count(), 1);
    }

    #[test]
    fn test_round_trip_through_parquet_and_csv() {
        let dir = tempfile::tempdir().unwrap();
        let ds = TabularDataset::new(vec![
            numeric_series("x", [Some(1.5), None, Some(-2.0)]),
            categorical_series("c", [Some("a"), Some("b"), None]),
        ])
        .unwrap();
        for name in ["out.parquet", "out.csv"] {
            let path = dir.path().join(name);
            save_dataset(&ds, &path).unwrap();
            assert_eq!(load_dataset(&path).unwrap(), ds, "{name}");
        }
    }

    #[test]
    fn test_integer_and_boolean_columns_become_numeric() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("typed.parquet");
        let mut df = df!(
            "rooms" => [3i32, 2, 4],
            "floors" => [1u32, 2, 1],
            "garage" => [true, false, true],
        )
        .unwrap();
        save_df(&mut df, &path).unwrap();

        let ds = load_dataset(&path).unwrap();
        for name in ["rooms", "floors", "garage"] {
            assert_eq!(ds.kind(name), Some(ColumnKind::Numeric), "{name}");
        }
        let floors = dataset::complete_values(ds.require("floors").unwrap()).unwrap();
        assert_eq!(floors, vec![1.0, 2.0, 1.0]);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load_dataset("data.xlsx").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_dataset(dir.path().join("absent.parquet")).unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
