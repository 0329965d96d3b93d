//! Wall-clock duration of a call.

use std::time::Instant;

use super::{Measurement, MetricCollector};
use crate::error::{Error, Result};
use crate::interceptor::Target;

/// Measures elapsed wall-clock time in seconds.
#[derive(Debug, Default, Clone)]
pub struct Timer {
    started: Option<Instant>,
    finished: Option<Instant>,
}

impl Timer {
    pub const LABEL: &'static str = "runtime";

    pub fn new() -> Self {
        Self::default()
    }
}

impl MetricCollector for Timer {
    fn label(&self) -> &'static str {
        Self::LABEL
    }

    fn pre_execute(&mut self, _target: &Target) {
        self.finished = None;
        self.started = Some(Instant::now());
    }

    fn post_execute(&mut self, _target: &Target) {
        self.finished = Some(Instant::now());
    }

    fn extract(&self) -> Measurement {
        let seconds = match (self.started, self.finished) {
            (Some(start), Some(end)) => end.saturating_duration_since(start).as_secs_f64(),
            _ => 0.0,
        };
        Measurement::Float(seconds)
    }

    fn render(&self, value: &Measurement) -> Result<String> {
        let seconds = value.as_f64().ok_or(Error::InvalidMeasurement {
            label: Self::LABEL,
            expected: "a numeric",
            found: value.kind(),
        })?;
        Ok(format_runtime(seconds))
    }
}

/// Formats seconds as `"{h}h {m}m {s:.4}s"`.
///
/// Hours and minutes are floored, the remainder keeps its fraction.
pub fn format_runtime(seconds: f64) -> String {
    let hours = seconds.div_euclid(3600.0);
    let remainder = seconds.rem_euclid(3600.0);
    let minutes = remainder.div_euclid(60.0);
    let secs = remainder.rem_euclid(60.0);
    format!("{}h {}m {:.4}s", hours as i64, minutes as i64, secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptor::FunctionDescriptor;

    #[test]
    fn test_format_runtime() {
        assert_eq!(format_runtime(3661.25), "1h 1m 1.2500s");
        assert_eq!(format_runtime(0.0), "0h 0m 0.0000s");
        // Only the seconds are rounded, so they can show as 60.
        assert_eq!(format_runtime(59.99999), "0h 0m 60.0000s");
        assert_eq!(format_runtime(7200.0), "2h 0m 0.0000s");
        assert_eq!(format_runtime(125.5), "0h 2m 5.5000s");
    }

    #[test]
    fn test_render_accepts_integers_and_floats() {
        let timer = Timer::new();
        assert_eq!(timer.render(&Measurement::Integer(61)).unwrap(), "0h 1m 1.0000s");
        assert_eq!(timer.render(&Measurement::Float(0.5)).unwrap(), "0h 0m 0.5000s");
        assert_eq!(
            timer.render_labeled(&Measurement::Float(3661.25)).unwrap(),
            "runtime : 1h 1m 1.2500s"
        );
    }

    #[test]
    fn test_render_rejects_text() {
        let timer = Timer::new();
        let err = timer.render(&Measurement::Text("fast".into())).unwrap_err();
        assert!(matches!(err, Error::InvalidMeasurement { label: "runtime", .. }));
    }

    #[test]
    fn test_measures_elapsed_time() {
        let target = Target::new(FunctionDescriptor::new("sleep", "tests", "sleep"));
        let mut timer = Timer::new();

        timer.pre_execute(&target);
        std::thread::sleep(std::time::Duration::from_millis(5));
        timer.post_execute(&target);

        match timer.extract() {
            Measurement::Float(seconds) => assert!(seconds >= 0.005),
            other => panic!("unexpected measurement: {other:?}"),
        }
    }

    #[test]
    fn test_extract_without_hooks_is_zero() {
        assert_eq!(Timer::new().extract(), Measurement::Float(0.0));
    }
}
