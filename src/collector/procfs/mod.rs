//! Readers for the Linux `/proc` filesystem.

pub mod parser;

use std::path::Path;

use thiserror::Error;

use crate::collector::traits::FileSystem;
pub use parser::{ParseError, ProcStatusMem, parse_proc_status_mem};

/// Default mount point of procfs.
pub const DEFAULT_PROC_PATH: &str = "/proc";

/// Error while probing a `/proc` file.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Reads the memory section of `<proc_path>/self/status`.
pub fn read_self_status_mem<F: FileSystem>(
    fs: &F,
    proc_path: &Path,
) -> Result<ProcStatusMem, CollectError> {
    let content = fs.read_to_string(&proc_path.join("self").join("status"))?;
    Ok(parse_proc_status_mem(&content)?)
}
