//! Data-source layer: background loading of delimited text files into
//! plots consumable through the `ps-core` proxy machinery.

pub mod config;
pub mod sources;

use thiserror::Error;

// Re-exports
pub use config::CsvFormat;
pub use sources::CsvPlot;

/// Errors that can occur in data operations.
///
/// Only configuration errors are returned to callers; failures during a
/// background read are logged and leave the plot with whatever rows were
/// parsed before the failure.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported file extension on {0:?} (expected .csv)")]
    UnsupportedExtension(std::path::PathBuf),

    #[error("no data source has been set")]
    MissingSource,
}
