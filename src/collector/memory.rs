//! Resident-memory delta of a call.

use std::any::TypeId;
use std::path::PathBuf;

use tracing::warn;

use super::procfs::{self, CollectError, DEFAULT_PROC_PATH};
use super::traits::{FileSystem, RealFs};
use super::{Measurement, MetricCollector};
use crate::error::{Error, Result};
use crate::interceptor::Target;

/// Measures how much the process resident set grew during a call.
///
/// The resident set size is read from `<proc_path>/self/status`. When the
/// probe fails (no procfs, unreadable file) a warning is logged and the
/// call's delta is reported as 0.
#[derive(Debug)]
pub struct Memory<F = RealFs> {
    fs: F,
    proc_path: PathBuf,
    before: Option<u64>,
    after: Option<u64>,
}

impl Memory<RealFs> {
    /// Reads the real `/proc`.
    pub fn new() -> Self {
        Self::with_fs(RealFs::new(), DEFAULT_PROC_PATH)
    }
}

impl Default for Memory<RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: FileSystem> Memory<F> {
    pub const LABEL: &'static str = "memory usage";

    /// Creates a collector reading `proc_path` through `fs`.
    pub fn with_fs(fs: F, proc_path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_path: proc_path.into(),
            before: None,
            after: None,
        }
    }

    /// Current resident set size of the process, in bytes.
    pub fn resident_bytes(&self) -> std::result::Result<u64, CollectError> {
        let status = procfs::read_self_status_mem(&self.fs, &self.proc_path)?;
        Ok(status.rss_bytes())
    }

    fn probe(&self) -> Option<u64> {
        match self.resident_bytes() {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(
                    proc_path = %self.proc_path.display(),
                    error = %e,
                    "failed to read resident memory"
                );
                None
            }
        }
    }
}

impl<F: FileSystem> MetricCollector for Memory<F> {
    fn label(&self) -> &'static str {
        Self::LABEL
    }

    // The filesystem is a test seam, not a different metric.
    fn kind(&self) -> TypeId
    where
        Self: Sized + 'static,
    {
        TypeId::of::<Memory>()
    }

    fn pre_execute(&mut self, _target: &Target) {
        self.after = None;
        self.before = self.probe();
    }

    fn post_execute(&mut self, _target: &Target) {
        self.after = self.probe();
    }

    fn extract(&self) -> Measurement {
        match (self.before, self.after) {
            (Some(before), Some(after)) => Measurement::Integer(after.wrapping_sub(before) as i64),
            _ => Measurement::Integer(0),
        }
    }

    fn render(&self, value: &Measurement) -> Result<String> {
        match value {
            Measurement::Integer(bytes) => Ok(format_memory(*bytes)),
            other => Err(Error::InvalidMeasurement {
                label: Self::LABEL,
                expected: "an integer",
                found: other.kind(),
            }),
        }
    }
}

/// Formats a byte delta as `"{MB}MB {KB}KB {B}B"`.
///
/// Negative deltas are written as a `-` followed by the decomposed
/// magnitude: `-1025` gives `"-0MB 1KB 1B"`.
pub fn format_memory(bytes: i64) -> String {
    let sign = if bytes < 0 { "-" } else { "" };
    let magnitude = bytes.unsigned_abs();
    let megabytes = magnitude / (1024 * 1024);
    let remainder = magnitude % (1024 * 1024);
    let kilobytes = remainder / 1024;
    let rest = remainder % 1024;
    format!("{}{}MB {}KB {}B", sign, megabytes, kilobytes, rest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::interceptor::FunctionDescriptor;

    fn target() -> std::rc::Rc<Target> {
        Target::new(FunctionDescriptor::new("load", "tests", "load"))
    }

    #[test]
    fn test_format_memory() {
        assert_eq!(format_memory(1024), "0MB 1KB 0B");
        assert_eq!(format_memory(1_048_576), "1MB 0KB 0B");
        assert_eq!(format_memory(0), "0MB 0KB 0B");
        assert_eq!(format_memory(3 * 1_048_576 + 5 * 1024 + 7), "3MB 5KB 7B");
    }

    #[test]
    fn test_format_memory_negative_delta() {
        assert_eq!(format_memory(-1025), "-0MB 1KB 1B");
        assert_eq!(format_memory(-1_048_576), "-1MB 0KB 0B");
        assert_eq!(format_memory(i64::MIN), format!("-{}MB 0KB 0B", 1u64 << 43));
    }

    #[test]
    fn test_render_requires_integer() {
        let memory = Memory::with_fs(MockFs::new(), "/proc");
        assert_eq!(
            memory.render_labeled(&Measurement::Integer(2048)).unwrap(),
            "memory usage : 0MB 2KB 0B"
        );
        let err = memory.render(&Measurement::Float(1.5)).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidMeasurement {
                label: "memory usage",
                expected: "an integer",
                found: "a float",
            }
        ));
    }

    #[test]
    fn test_measures_rss_growth() {
        let fs = MockFs::with_rss_sequence("/proc", &[1000, 1500]);
        let mut memory = Memory::with_fs(fs, "/proc");
        let target = target();

        memory.pre_execute(&target);
        memory.post_execute(&target);
        assert_eq!(memory.extract(), Measurement::Integer(500 * 1024));
    }

    #[test]
    fn test_measures_rss_shrink() {
        let fs = MockFs::with_rss_sequence("/proc", &[2048, 1024]);
        let mut memory = Memory::with_fs(fs, "/proc");
        let target = target();

        memory.pre_execute(&target);
        memory.post_execute(&target);
        assert_eq!(memory.extract(), Measurement::Integer(-1024 * 1024));
    }

    #[test]
    fn test_missing_procfs_yields_zero() {
        let mut memory = Memory::with_fs(MockFs::new(), "/proc");
        let target = target();

        memory.pre_execute(&target);
        memory.post_execute(&target);
        assert_eq!(memory.extract(), Measurement::Integer(0));
        assert!(memory.resident_bytes().is_err());
    }

    #[test]
    fn test_custom_proc_path() {
        let fs = MockFs::with_rss_sequence("/host/proc", &[10]);
        let memory = Memory::with_fs(fs, "/host/proc");
        assert_eq!(memory.resident_bytes().unwrap(), 10 * 1024);
    }
}
