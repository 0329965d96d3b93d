//! Error types shared by the interceptor, the collectors and the profiler.

use thiserror::Error;

/// Errors raised by `callprobe`.
///
/// Configuration errors are returned before any state is changed, so a
/// rejected value is never committed.
#[derive(Debug, Error)]
pub enum Error {
    /// A name template is malformed or uses an unknown placeholder.
    #[error("invalid name template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A report format name is not one of `datetime`, `function`, `cumulative`.
    #[error("invalid report format {0:?}, expected one of: datetime, function, cumulative")]
    InvalidReportFormat(String),

    /// A collector name does not match any known collector.
    #[error("unknown collector {0:?}, expected one of: timer, memory")]
    UnknownCollector(String),

    /// A collector was asked to render a value it cannot represent.
    #[error("{label} expects {expected} measurement, got {found}")]
    InvalidMeasurement {
        label: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    /// Cumulative reports need every stored value of a collector to be summable.
    #[error("cannot accumulate {label} measurements: {reason}")]
    NotSummable { label: &'static str, reason: String },

    /// I/O error while writing a report.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Records could not be serialized to JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
