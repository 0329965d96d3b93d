//! A single collector used directly as an interceptor.

use std::cell::{Ref, RefCell};
use std::io::{self, Stdout, Write};
use std::rc::Rc;

use tracing::warn;

use super::MetricCollector;
use crate::error::Result;
use crate::interceptor::{Interceptor, InterceptorConfig, InterceptorSettings, Target};

/// Runs one collector around each call and writes
/// `"{signature name} - {label} : {value}"` after it.
pub struct Standalone<C, W = Stdout> {
    settings: InterceptorSettings,
    collector: RefCell<C>,
    out: RefCell<W>,
}

impl<C: MetricCollector> Standalone<C, Stdout> {
    /// Prints measurements to stdout.
    pub fn new(collector: C, config: &InterceptorConfig) -> Result<Self> {
        Self::with_writer(collector, config, io::stdout())
    }
}

impl<C: MetricCollector, W: Write> Standalone<C, W> {
    /// Writes measurements to `out`.
    pub fn with_writer(collector: C, config: &InterceptorConfig, out: W) -> Result<Self> {
        Ok(Self {
            settings: InterceptorSettings::new(config)?,
            collector: RefCell::new(collector),
            out: RefCell::new(out),
        })
    }

    pub fn writer(&self) -> Ref<'_, W> {
        self.out.borrow()
    }
}

impl<C: MetricCollector, W: Write> Interceptor for Standalone<C, W> {
    fn settings(&self) -> &InterceptorSettings {
        &self.settings
    }

    fn intercept<R>(&self, target: &Rc<Target>, call: impl FnOnce() -> R) -> R {
        self.collector.borrow_mut().pre_execute(target);
        let output = call();

        let line = {
            let mut collector = self.collector.borrow_mut();
            collector.post_execute(target);
            let value = collector.extract();
            collector.render_labeled(&value)
        };

        match line {
            Ok(line) => {
                let name = self.signature_name(target);
                if let Err(e) = writeln!(self.out.borrow_mut(), "{} - {}", name, line) {
                    warn!(error = %e, "failed to write measurement");
                }
            }
            Err(e) => warn!(error = %e, "failed to render measurement"),
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;
    use crate::collector::{Memory, Timer};
    use crate::interceptor::{FunctionDescriptor, wrap};

    fn output<C: MetricCollector>(standalone: &Standalone<C, Vec<u8>>) -> String {
        String::from_utf8(standalone.writer().clone()).unwrap()
    }

    #[test]
    fn test_standalone_memory_line() {
        let fs = MockFs::with_rss_sequence("/proc", &[100, 101]);
        let memory = Rc::new(
            Standalone::with_writer(
                Memory::with_fs(fs, "/proc"),
                &InterceptorConfig::default(),
                Vec::new(),
            )
            .unwrap(),
        );
        let load = wrap(&memory, FunctionDescriptor::new("load", "app", "Cache::load"), |n: usize| {
            vec![0u8; n].len()
        });

        assert_eq!(load.call(16), 16);
        assert_eq!(output(&memory), "load - memory usage : 0MB 1KB 0B\n");
    }

    #[test]
    fn test_standalone_uses_template() {
        let config = InterceptorConfig {
            name_template: "{qualname}".to_string(),
            ..InterceptorConfig::default()
        };
        let timer = Rc::new(Standalone::with_writer(Timer::new(), &config, Vec::new()).unwrap());
        let noop = wrap(&timer, FunctionDescriptor::new("noop", "app", "Job::noop"), |()| ());

        noop.call(());
        let text = output(&timer);
        assert!(text.starts_with("Job::noop - runtime : 0h 0m "), "{text}");
        assert!(text.ends_with("s\n"));
    }

    #[test]
    fn test_standalone_deactivated_writes_nothing() {
        let config = InterceptorConfig::default();
        let timer = Rc::new(Standalone::with_writer(Timer::new(), &config, Vec::new()).unwrap());
        let noop = wrap(&timer, FunctionDescriptor::new("noop", "app", "noop"), |x: i32| x);

        timer.set_activated(false);
        assert_eq!(noop.call(3), 3);
        assert!(output(&timer).is_empty());
    }
}
