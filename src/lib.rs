//! callprobe - function call interception and per-call profiling.
//!
//! - [`interceptor`] - wrapping functions with hooks that run around every call
//! - [`collector`] - pluggable measurements (runtime, resident memory)
//! - [`profiler`] - an interceptor that stores measurements and renders reports
//!
//! The `callprobe` binary profiles a small built-in workload and prints the
//! report.

pub mod collector;
pub mod error;
pub mod interceptor;
pub mod profiler;

pub use collector::{CollectorKind, Measurement, Memory, MetricCollector, Standalone, Timer};
pub use error::{Error, Result};
pub use interceptor::{FunctionDescriptor, Interceptor, InterceptorConfig, Target, Wrapped, wrap};
pub use profiler::{Profiler, ProfilerConfig, Record, ReportFormat};
