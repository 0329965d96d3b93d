//! callprobe - profiles a small built-in workload and prints the report.
//!
//! Every workload function is wrapped with one shared profiler. The report
//! goes to stdout (or `--output`), logs go to stderr.

use std::path::PathBuf;
use std::process;
use std::rc::Rc;

use clap::Parser;
use serde::Serialize;
use tracing::{Level, debug, error, info};
use tracing_subscriber::EnvFilter;

use callprobe::collector::{CollectorKind, Memory, RealFs, Timer};
use callprobe::descriptor;
use callprobe::interceptor::{InterceptorConfig, wrap};
use callprobe::profiler::{Profiler, ProfilerConfig, Record, ReportFormat};

/// Function call profiler.
#[derive(Parser)]
#[command(name = "callprobe", about = "Profiles a built-in workload", version)]
struct Args {
    /// Report layout: datetime, function or cumulative.
    #[arg(short, long, default_value = "datetime")]
    format: ReportFormat,

    /// Comma-separated collectors to connect, in order (timer, memory).
    #[arg(short, long, default_value = "timer,memory")]
    collectors: String,

    /// Signature-name template; placeholders are {name}, {module} and {qualname}.
    #[arg(short = 't', long, default_value = "{name}")]
    name_template: String,

    /// How many times the workload is run.
    #[arg(short = 'n', long, default_value = "3")]
    iterations: u32,

    /// Path to /proc filesystem (for testing/mocking).
    #[arg(long, default_value = "/proc")]
    proc_path: PathBuf,

    /// Write the report to this file instead of stdout.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the raw records as JSON instead of a text report.
    #[arg(long)]
    json: bool,

    /// Run the workload with the profiler deactivated.
    #[arg(long)]
    disabled: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is warn level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// JSON dump of a profiling run.
#[derive(Serialize)]
struct JsonReport {
    functions: Vec<String>,
    collectors: Vec<&'static str>,
    records: Vec<Record>,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = format!("callprobe={}", level).parse() {
        filter = filter.add_directive(directive);
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn fib(n: u32) -> u64 {
    match n {
        0 => 0,
        1 => 1,
        _ => fib(n - 1) + fib(n - 2),
    }
}

/// Allocates and touches `size` bytes, returns their sum.
fn allocate(size: usize) -> u64 {
    let buffer: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    buffer.iter().map(|&b| u64::from(b)).sum()
}

/// Sorts `len` pseudo-random values, returns the median.
fn sort(len: usize) -> u64 {
    let mut state: u64 = 0x2545_f491_4f6c_dd1d;
    let mut values: Vec<u64> = (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        })
        .collect();
    values.sort_unstable();
    values.get(len / 2).copied().unwrap_or(0)
}

fn build_profiler(args: &Args) -> callprobe::Result<Rc<Profiler>> {
    let config = ProfilerConfig {
        interceptor: InterceptorConfig {
            activated: !args.disabled,
            name_template: args.name_template.clone(),
        },
        report_format: args.format,
        collectors: Vec::new(),
    };
    let profiler = Profiler::new(&config)?;

    for kind in CollectorKind::parse_list(&args.collectors)? {
        match kind {
            CollectorKind::Timer => profiler.connect(Timer::new()),
            CollectorKind::Memory => {
                profiler.connect(Memory::with_fs(RealFs::new(), &args.proc_path))
            }
        };
    }
    debug!(collectors = ?profiler.connected_labels(), "profiler ready");
    Ok(Rc::new(profiler))
}

fn run(args: &Args) -> callprobe::Result<()> {
    let profiler = build_profiler(args)?;

    let fib = wrap(&profiler, descriptor!(fib), fib);
    let allocate = wrap(&profiler, descriptor!(allocate), allocate);
    let sort = wrap(&profiler, descriptor!(sort), sort);

    for iteration in 0..args.iterations {
        let n = 20 + iteration;
        let fib_n = fib.call(n);
        let checksum = allocate.call(1024 * 1024 * (iteration as usize + 1));
        let median = sort.call(100_000);
        debug!(iteration, fib_n, checksum, median, "workload iteration done");
    }
    info!(
        iterations = args.iterations,
        records = profiler.records().len(),
        "workload finished"
    );

    let text = if args.json {
        let dump = JsonReport {
            functions: profiler.profiled_function_names(),
            collectors: profiler.connected_labels(),
            records: profiler.records(),
        };
        let mut json = serde_json::to_string_pretty(&dump)?;
        json.push('\n');
        json
    } else {
        profiler.report()?
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, text)?;
            info!(path = %path.display(), "report written");
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn main() {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(&args) {
        error!("{}", e);
        process::exit(1);
    }
}
