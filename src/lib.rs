//! Wahis-Harvest: a resumable retriever and tabulator of disease-outbreak reports
//!
//! This crate implements a two-stage pipeline over a WAHIS-style animal-disease
//! portal: stage one retrieves outbreak reports and their follow-ups for one
//! disease across a year range and all reporting countries, checkpointing every
//! unit of work so an interrupted run resumes without re-fetching; stage two
//! compiles the retrieved corpus into a single spreadsheet with three linked
//! sheets (reports, outbreaks, lab tests).

pub mod checkpoint;
pub mod compile;
pub mod config;
pub mod corpus;
pub mod fetch;
pub mod harvest;
pub mod model;

use thiserror::Error;

/// Main error type for Wahis-Harvest operations
///
/// Per-unit retrieval failures never surface here; they are downgraded to
/// recorded outcomes inside the orchestrator. Anything that does reach this
/// type is fatal to the invocation.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Checkpoint database error: {0}")]
    Checkpoint(#[from] rusqlite::Error),

    #[error("Record store error at {path}: {source}")]
    RecordIo {
        path: String,
        source: std::io::Error,
    },

    #[error("Record encode error for {key}: {source}")]
    RecordEncode {
        key: String,
        source: serde_json::Error,
    },

    #[error("Country enumeration failed: {0}")]
    CountryEnumeration(#[from] fetch::FetchError),

    #[error("Spreadsheet write error: {0}")]
    Workbook(#[from] rust_xlsxwriter::XlsxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid portal URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Wahis-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use checkpoint::{CheckpointStore, UnitKey, UnitStatus};
pub use config::HarvestConfig;
pub use corpus::RecordStore;
pub use fetch::{FetchClient, FetchError, FetchRequest};
pub use model::{Country, LabTest, Outbreak, Report, ReportBundle, YearRange};
