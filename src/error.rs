//! Error types for loading campaign data.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No such data file: {}", .0.display())]
    MissingFile(PathBuf),

    #[error("{}:{line}: {message}", path.display())]
    Parse {
        path: PathBuf,
        /// 1-based line number in the source file (0 when not line-oriented).
        line: usize,
        message: String,
    },

    #[error(
        "{}: header does not match declared schema (missing {missing:?}, found {found:?})",
        path.display()
    )]
    SchemaMismatch {
        path: PathBuf,
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("Unsupported file extension: .{0}")]
    UnsupportedFormat(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid glob pattern: {0}")]
    Glob(#[from] glob::PatternError),
}

impl LoadError {
    pub(crate) fn parse(path: impl Into<PathBuf>, line: usize, message: impl Into<String>) -> Self {
        LoadError::Parse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;
