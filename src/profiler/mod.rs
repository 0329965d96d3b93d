//! Per-function profiling.
//!
//! [`Profiler`] is an interceptor that runs a set of [`MetricCollector`]s
//! around every call, stores one [`Record`] per call and renders the stored
//! records as one of three text reports (see [`ReportFormat`]).
//!
//! ```
//! use std::rc::Rc;
//! use callprobe::collector::Timer;
//! use callprobe::descriptor;
//! use callprobe::interceptor::wrap;
//! use callprobe::profiler::{Profiler, ReportFormat};
//!
//! fn square(x: u64) -> u64 {
//!     x * x
//! }
//!
//! let profiler = Rc::new(Profiler::default());
//! profiler.connect(Timer::new());
//! profiler.set_report_format(ReportFormat::Cumulative);
//!
//! let square = wrap(&profiler, descriptor!(square), square);
//! square.call(3);
//! square.call(4);
//!
//! let report = profiler.report().unwrap();
//! assert!(report.starts_with("[square] - 2 calls - runtime : "));
//! ```
//!
//! A profiler is single-threaded: collectors keep per-call state in
//! themselves, so use one profiler per thread.

pub mod report;

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use std::str::FromStr;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::collector::{CollectorKind, Measurement, Memory, MetricCollector, Timer};
use crate::error::{Error, Result};
use crate::interceptor::{Interceptor, InterceptorConfig, InterceptorSettings, Target};
use report::ReportSource;

/// Layout of the generated report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// One line per call, in call order.
    #[default]
    Datetime,
    /// Calls grouped under a header per function.
    Function,
    /// One line per function with call count and summed measurements.
    Cumulative,
}

impl ReportFormat {
    pub const ALL: [ReportFormat; 3] = [
        ReportFormat::Datetime,
        ReportFormat::Function,
        ReportFormat::Cumulative,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReportFormat::Datetime => "datetime",
            ReportFormat::Function => "function",
            ReportFormat::Cumulative => "cumulative",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|format| format.name() == s)
            .ok_or_else(|| Error::InvalidReportFormat(s.to_string()))
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Serializable profiler settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    #[serde(flatten)]
    pub interceptor: InterceptorConfig,
    pub report_format: ReportFormat,
    /// Built-in collectors connected at construction, in order.
    pub collectors: Vec<CollectorKind>,
}

/// Measurements of one intercepted call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// When the call started.
    pub timestamp: DateTime<Local>,
    /// Index into the profiled function registry.
    pub function: usize,
    /// Raw values keyed by collector index.
    pub measurements: BTreeMap<usize, Measurement>,
}

/// All records of one function, in call order.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRecords {
    pub function: usize,
    pub records: Vec<Record>,
}

/// Groups records by function, functions in order of their first record.
pub(crate) fn group_by_function(records: &[Record]) -> Vec<(usize, Vec<&Record>)> {
    let mut groups: Vec<(usize, Vec<&Record>)> = Vec::new();
    let mut positions: HashMap<usize, usize> = HashMap::new();

    for record in records {
        let position = *positions.entry(record.function).or_insert_with(|| {
            groups.push((record.function, Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(record);
    }
    groups
}

/// A connected collector and the type it was connected as.
pub(crate) struct Slot {
    kind: TypeId,
    pub(crate) collector: Box<dyn MetricCollector>,
}

/// Interceptor that measures every call with the connected collectors.
///
/// Functions are told apart by [`Target`] identity, so two functions wrapped
/// under the same name get separate entries. Collectors are indexed in
/// connection order; that index keys the measurements of each [`Record`].
pub struct Profiler {
    settings: InterceptorSettings,
    report_format: Cell<ReportFormat>,
    collectors: RefCell<Vec<Slot>>,
    functions: RefCell<Vec<Rc<Target>>>,
    records: RefCell<Vec<Record>>,
    /// Bumped by every reset; calls spanning a reset are not recorded.
    generation: Cell<u64>,
}

impl Profiler {
    /// Validates `config`, then connects its collectors.
    pub fn new(config: &ProfilerConfig) -> Result<Self> {
        let profiler = Self {
            settings: InterceptorSettings::new(&config.interceptor)?,
            report_format: Cell::new(config.report_format),
            collectors: RefCell::new(Vec::new()),
            functions: RefCell::new(Vec::new()),
            records: RefCell::new(Vec::new()),
            generation: Cell::new(0),
        };
        profiler.connect_kinds(config.collectors.iter().copied());
        Ok(profiler)
    }

    pub fn report_format(&self) -> ReportFormat {
        self.report_format.get()
    }

    /// Changes the layout of later reports. Stored records are not touched.
    pub fn set_report_format(&self, format: ReportFormat) {
        self.report_format.set(format);
    }

    /// Connects a collector unless one of the same type is already connected.
    ///
    /// Returns `true` if the collector was added.
    pub fn connect<C: MetricCollector + 'static>(&self, collector: C) -> bool {
        let kind = collector.kind();
        let mut collectors = self.collectors.borrow_mut();
        if collectors.iter().any(|slot| slot.kind == kind) {
            debug!(label = collector.label(), "collector already connected");
            return false;
        }

        debug!(
            label = collector.label(),
            index = collectors.len(),
            "collector connected"
        );
        collectors.push(Slot {
            kind,
            collector: Box::new(collector),
        });
        true
    }

    /// Connects a built-in collector with its default settings.
    pub fn connect_kind(&self, kind: CollectorKind) -> bool {
        match kind {
            CollectorKind::Timer => self.connect(Timer::new()),
            CollectorKind::Memory => self.connect(Memory::new()),
        }
    }

    /// Connects several built-in collectors; returns how many were added.
    pub fn connect_kinds(&self, kinds: impl IntoIterator<Item = CollectorKind>) -> usize {
        kinds
            .into_iter()
            .filter(|&kind| self.connect_kind(kind))
            .count()
    }

    /// Removes every collector and, since records refer to them by index,
    /// all records and profiled functions too.
    pub fn disconnect_all(&self) {
        self.collectors.borrow_mut().clear();
        self.initialize();
    }

    /// Clears records and profiled functions, keeping the collectors.
    pub fn initialize(&self) {
        self.records.borrow_mut().clear();
        self.functions.borrow_mut().clear();
        self.generation.set(self.generation.get().wrapping_add(1));
        debug!("profiler data reset");
    }

    /// Labels of the connected collectors, in index order.
    pub fn connected_labels(&self) -> Vec<&'static str> {
        self.collectors
            .borrow()
            .iter()
            .map(|slot| slot.collector.label())
            .collect()
    }

    /// Profiled functions in registration order.
    pub fn profiled_functions(&self) -> Vec<Rc<Target>> {
        self.functions.borrow().clone()
    }

    /// Signature names of the profiled functions under the current template.
    pub fn profiled_function_names(&self) -> Vec<String> {
        self.functions
            .borrow()
            .iter()
            .map(|target| self.signature_name(target))
            .collect()
    }

    /// Copy of the stored records, in call order.
    pub fn records(&self) -> Vec<Record> {
        self.records.borrow().clone()
    }

    /// Records grouped by function, functions in first-seen order.
    pub fn records_by_function(&self) -> Vec<FunctionRecords> {
        let records = self.records.borrow();
        group_by_function(&records)
            .into_iter()
            .map(|(function, records)| FunctionRecords {
                function,
                records: records.into_iter().cloned().collect(),
            })
            .collect()
    }

    /// Renders the report in the current format.
    pub fn report(&self) -> Result<String> {
        self.report_as(self.report_format())
    }

    /// Renders the report in `format`, regardless of the current format.
    ///
    /// The cumulative layout fails with [`Error::NotSummable`] when a
    /// collector stored values that cannot be added up.
    pub fn report_as(&self, format: ReportFormat) -> Result<String> {
        let names = self.profiled_function_names();
        let collectors = self.collectors.borrow();
        let records = self.records.borrow();
        let source = ReportSource {
            names: &names,
            collectors: &collectors,
            records: &records,
        };

        match format {
            ReportFormat::Datetime => report::datetime(&source),
            ReportFormat::Function => report::function(&source),
            ReportFormat::Cumulative => report::cumulative(&source),
        }
    }

    pub fn report_datetime(&self) -> Result<String> {
        self.report_as(ReportFormat::Datetime)
    }

    pub fn report_function(&self) -> Result<String> {
        self.report_as(ReportFormat::Function)
    }

    pub fn report_cumulative(&self) -> Result<String> {
        self.report_as(ReportFormat::Cumulative)
    }

    /// Writes the current report to `path`, replacing the file.
    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.report()?)?;
        Ok(())
    }

    fn register(&self, target: &Rc<Target>) -> usize {
        let mut functions = self.functions.borrow_mut();
        if let Some(index) = functions.iter().position(|known| Target::same(known, target)) {
            return index;
        }

        functions.push(Rc::clone(target));
        let index = functions.len() - 1;
        debug!(function = %target.descriptor(), index, "profiling new function");
        index
    }
}

impl Default for Profiler {
    fn default() -> Self {
        Self {
            settings: InterceptorSettings::default(),
            report_format: Cell::new(ReportFormat::default()),
            collectors: RefCell::new(Vec::new()),
            functions: RefCell::new(Vec::new()),
            records: RefCell::new(Vec::new()),
            generation: Cell::new(0),
        }
    }
}

impl Interceptor for Profiler {
    fn settings(&self) -> &InterceptorSettings {
        &self.settings
    }

    // No borrow is held while `call` runs, so the wrapped function may call
    // back into this profiler. A call during which the profiler was reset is
    // dropped: its function index and collector state refer to cleared data.
    fn intercept<R>(&self, target: &Rc<Target>, call: impl FnOnce() -> R) -> R {
        let timestamp = Local::now();
        let generation = self.generation.get();
        let function = self.register(target);

        for slot in self.collectors.borrow_mut().iter_mut() {
            slot.collector.pre_execute(target);
        }

        let output = call();

        if self.generation.get() != generation {
            debug!(
                function = %target.descriptor(),
                "profiler reset during call, record dropped"
            );
            return output;
        }

        let measurements = {
            let mut collectors = self.collectors.borrow_mut();
            for slot in collectors.iter_mut() {
                slot.collector.post_execute(target);
            }
            collectors
                .iter()
                .enumerate()
                .map(|(index, slot)| (index, slot.collector.extract()))
                .collect()
        };

        self.records.borrow_mut().push(Record {
            timestamp,
            function,
            measurements,
        });
        output
    }
}

/// Writes the current report, or a placeholder if it cannot be rendered.
impl fmt::Display for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.report() {
            Ok(text) => f.write_str(&text),
            Err(e) => write!(f, "<report unavailable: {}>", e),
        }
    }
}

impl fmt::Debug for Profiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profiler")
            .field("activated", &self.is_activated())
            .field("report_format", &self.report_format())
            .field("collectors", &self.connected_labels())
            .field("functions", &self.functions.borrow().len())
            .field("records", &self.records.borrow().len())
            .finish()
    }
}
