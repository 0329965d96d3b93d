//! Metric collectors.
//!
//! A [`MetricCollector`] observes one call at a time: `pre_execute` runs just
//! before the real function, `post_execute` right after it, and `extract`
//! returns what was measured in between. `render` turns a raw value (one
//! measurement or the sum of several) into text.
//!
//! Collectors keep their between-hook state in `self`. A collector shared by
//! nested or concurrent calls will see that state overwritten, so give each
//! thread its own instance.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                MetricCollector (trait)              │
//! │  ┌──────────────┐          ┌─────────────────────┐  │
//! │  │    Timer     │          │       Memory        │  │
//! │  │  - Instant   │          │  - /proc/self/status│  │
//! │  └──────────────┘          └──────────┬──────────┘  │
//! │                                       │             │
//! │                                ┌──────▼──────┐      │
//! │                                │  FileSystem │      │
//! │                                └──────┬──────┘      │
//! └───────────────────────────────────────┼─────────────┘
//!                                  ┌──────┴──────┐
//!                           ┌──────▼─────┐ ┌─────▼──────┐
//!                           │   RealFs   │ │   MockFs   │
//!                           └────────────┘ └────────────┘
//! ```
//!
//! Collectors are normally connected to a [`crate::profiler::Profiler`];
//! [`Standalone`] turns a single collector into an interceptor of its own.

pub mod memory;
pub mod mock;
pub mod procfs;
mod standalone;
pub mod timer;
pub mod traits;

use std::any::TypeId;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::interceptor::Target;

pub use memory::Memory;
pub use mock::MockFs;
pub use standalone::Standalone;
pub use timer::Timer;
pub use traits::{FileSystem, RealFs};

/// Raw value produced by one collector for one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Measurement {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Measurement {
    /// Kind name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Measurement::Integer(_) => "an integer",
            Measurement::Float(_) => "a float",
            Measurement::Text(_) => "a text",
        }
    }

    /// Numeric value, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Measurement::Integer(v) => Some(*v as f64),
            Measurement::Float(v) => Some(*v),
            Measurement::Text(_) => None,
        }
    }

    /// Adds two values for cumulative reports.
    ///
    /// Integers stay integers; a float on either side gives a float.
    pub fn checked_add(&self, other: &Measurement) -> std::result::Result<Measurement, String> {
        match (self, other) {
            (Measurement::Integer(a), Measurement::Integer(b)) => a
                .checked_add(*b)
                .map(Measurement::Integer)
                .ok_or_else(|| "integer overflow".to_string()),
            (Measurement::Text(_), _) | (_, Measurement::Text(_)) => {
                Err("text values cannot be summed".to_string())
            }
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(a), Some(b)) => Ok(Measurement::Float(a + b)),
                _ => Err("non-numeric value".to_string()),
            },
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measurement::Integer(v) => write!(f, "{}", v),
            Measurement::Float(v) => write!(f, "{}", v),
            Measurement::Text(v) => f.write_str(v),
        }
    }
}

/// A pluggable measurement of single calls.
pub trait MetricCollector {
    /// Name of the metric, e.g. `runtime`.
    fn label(&self) -> &'static str;

    /// Runs right before the intercepted function.
    fn pre_execute(&mut self, target: &Target);

    /// Runs right after the intercepted function returned.
    fn post_execute(&mut self, target: &Target);

    /// Value measured between the last pre/post pair.
    fn extract(&self) -> Measurement;

    /// Renders a raw value in the collector's fixed units.
    fn render(&self, value: &Measurement) -> Result<String>;

    /// Identity used to reject a second collector of the same kind.
    ///
    /// Collectors generic over a data source override this so that every
    /// instantiation counts as one kind.
    fn kind(&self) -> TypeId
    where
        Self: Sized + 'static,
    {
        TypeId::of::<Self>()
    }

    /// `"{label} : {rendered}"`.
    fn render_labeled(&self, value: &Measurement) -> Result<String> {
        Ok(format!("{} : {}", self.label(), self.render(value)?))
    }
}

/// Built-in collectors, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectorKind {
    Timer,
    Memory,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 2] = [CollectorKind::Timer, CollectorKind::Memory];

    pub fn name(self) -> &'static str {
        match self {
            CollectorKind::Timer => "timer",
            CollectorKind::Memory => "memory",
        }
    }

    /// Parses a comma-separated list; empty entries are skipped.
    pub fn parse_list(list: &str) -> Result<Vec<CollectorKind>> {
        list.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| entry.parse::<CollectorKind>())
            .collect()
    }
}

impl FromStr for CollectorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::UnknownCollector(s.to_string()))
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_add_integers() {
        let sum = Measurement::Integer(1024).checked_add(&Measurement::Integer(-24));
        assert_eq!(sum, Ok(Measurement::Integer(1000)));
    }

    #[test]
    fn test_checked_add_promotes_to_float() {
        let sum = Measurement::Integer(1).checked_add(&Measurement::Float(0.5));
        assert_eq!(sum, Ok(Measurement::Float(1.5)));
    }

    #[test]
    fn test_checked_add_rejects_text_and_overflow() {
        assert!(Measurement::Text("x".into()).checked_add(&Measurement::Integer(1)).is_err());
        assert!(Measurement::Float(1.0).checked_add(&Measurement::Text("x".into())).is_err());
        assert!(Measurement::Integer(i64::MAX).checked_add(&Measurement::Integer(1)).is_err());
    }

    #[test]
    fn test_measurement_serializes_untagged() {
        let json = serde_json::to_string(&vec![
            Measurement::Integer(3),
            Measurement::Float(0.25),
            Measurement::Text("ok".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[3,0.25,"ok"]"#);
    }

    #[test]
    fn test_collector_kind_parse() {
        assert_eq!("timer".parse::<CollectorKind>().unwrap(), CollectorKind::Timer);
        assert_eq!(" memory ".parse::<CollectorKind>().unwrap(), CollectorKind::Memory);
        assert!(matches!(
            "disk".parse::<CollectorKind>(),
            Err(Error::UnknownCollector(name)) if name == "disk"
        ));
    }

    #[test]
    fn test_collector_kind_parse_list_skips_empty_entries() {
        let kinds = CollectorKind::parse_list("timer,, memory,").unwrap();
        assert_eq!(kinds, vec![CollectorKind::Timer, CollectorKind::Memory]);
        assert!(CollectorKind::parse_list("").unwrap().is_empty());
        assert!(CollectorKind::parse_list("timer,cpu").is_err());
    }
}
