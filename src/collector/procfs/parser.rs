//! Parsers for `/proc` filesystem files.
//!
//! Pure functions over file contents, testable with string inputs.

use thiserror::Error;

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("parse error: {message}")]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

/// Memory fields of `/proc/[pid]/status`, in kB.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcStatusMem {
    pub vm_rss: u64,
}

impl ProcStatusMem {
    /// Resident set size in bytes.
    pub fn rss_bytes(&self) -> u64 {
        self.vm_rss * 1024
    }
}

/// Parses the resident set size out of `/proc/[pid]/status`.
///
/// Format is key:\tvalue pairs, one per line. Kernel threads have no memory
/// lines at all and are reported as an error.
pub fn parse_proc_status_mem(content: &str) -> Result<ProcStatusMem, ParseError> {
    let value = content
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(key, _)| key.trim() == "VmRSS")
        .map(|(_, value)| value.trim())
        .ok_or_else(|| ParseError::new("missing VmRSS"))?;

    // Memory fields are in kB format: "12345 kB"
    let vm_rss = value
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ParseError::new(format!("invalid VmRSS value: {:?}", value)))?;

    Ok(ProcStatusMem { vm_rss })
}
