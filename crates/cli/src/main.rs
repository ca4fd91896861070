// PadRing - Peripheral Co-Simulation Harness
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::Context;
use clap::{Parser, Subcommand};
use padring_config::{load_input_script, resolve_relative, BenchManifest};
use padring_core::event::{compare_events, parse_log};
use padring_core::{Design, EventLog, Harness, RunMetrics, SimulationError};
use padring_inspect::Inspector;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

mod cxxrtl;
mod vcd_trace;

use cxxrtl::CxxrtlDesign;

const EXIT_PASS: u8 = 0;
const EXIT_MISMATCH: u8 = 1;
const EXIT_CONFIG_ERROR: u8 = 2;
const EXIT_RUNTIME_ERROR: u8 = 3;

const DEFAULT_EVENT_LOG: &str = "events.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "PadRing peripheral co-simulation harness", long_about = None)]
struct Cli {
    /// Enable per-transaction debug logging
    #[arg(short, long, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a design against its peripheral models.
    Run(RunArgs),

    /// Compare two event logs, ignoring timestamps.
    Compare(CompareArgs),
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Path to the bench manifest (YAML)
    #[arg(short, long)]
    manifest: PathBuf,

    /// Override the number of clock cycles to run
    #[arg(short, long)]
    cycles: Option<u64>,

    /// Event log to write (overrides the manifest)
    #[arg(short, long)]
    events: Option<PathBuf>,

    /// Input command script (overrides the manifest)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Write a VCD waveform of every bound pin
    #[arg(long)]
    vcd: Option<PathBuf>,

    /// Serve the inspection endpoint on this address, e.g. 127.0.0.1:0
    #[arg(long)]
    inspect: Option<String>,

    /// Write the run summary (JSON)
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Golden event log to compare against after the run
    #[arg(long)]
    golden: Option<PathBuf>,

    /// Compare against the golden log by event counts instead of order
    #[arg(long, requires = "golden")]
    unordered: bool,
}

#[derive(Parser, Debug)]
struct CompareArgs {
    /// Reference (golden) event log
    reference: PathBuf,

    /// Event log under test
    candidate: PathBuf,

    /// Compare per-event counts instead of order
    #[arg(long)]
    unordered: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Commands::Run(args) => run(args),
        Commands::Compare(args) => compare(args),
    }
}

/// Paths for one run, with command-line overrides applied and everything
/// resolved against the manifest's directory.
#[derive(Debug)]
struct RunPaths {
    library: PathBuf,
    events: PathBuf,
    input: Option<PathBuf>,
    vcd: Option<PathBuf>,
}

impl RunPaths {
    fn resolve(manifest_path: &Path, manifest: &BenchManifest, args: &RunArgs) -> Self {
        let from_manifest = |p: &Option<String>| p.as_deref().map(|p| resolve_relative(manifest_path, p));
        Self {
            library: resolve_relative(manifest_path, &manifest.design.library),
            events: args
                .events
                .clone()
                .or_else(|| from_manifest(&manifest.event_log))
                .unwrap_or_else(|| resolve_relative(manifest_path, DEFAULT_EVENT_LOG)),
            input: args.input.clone().or_else(|| from_manifest(&manifest.input_commands)),
            vcd: args.vcd.clone().or_else(|| from_manifest(&manifest.vcd)),
        }
    }
}

fn exit_for(e: &SimulationError) -> ExitCode {
    if e.is_config() {
        ExitCode::from(EXIT_CONFIG_ERROR)
    } else {
        ExitCode::from(EXIT_RUNTIME_ERROR)
    }
}

fn run(args: RunArgs) -> ExitCode {
    info!("Starting PadRing");

    let manifest = match BenchManifest::from_file(&args.manifest) {
        Ok(m) => m,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };
    let paths = RunPaths::resolve(&args.manifest, &manifest, &args);
    let cycles = args.cycles.unwrap_or(manifest.cycles);
    if cycles == 0 {
        error!("--cycles must be greater than zero");
        return ExitCode::from(EXIT_CONFIG_ERROR);
    }

    let design = match CxxrtlDesign::load(&paths.library, &manifest.design) {
        Ok(d) => d,
        Err(e) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let base_dir = args.manifest.parent().unwrap_or_else(|| Path::new("."));
    execute(design, &manifest, base_dir, cycles, &paths, &args)
}

/// Everything after the design is loaded. Any failure before the event log
/// is created is a configuration error.
fn execute<D: Design>(
    design: D,
    manifest: &BenchManifest,
    base_dir: &Path,
    cycles: u64,
    paths: &RunPaths,
    args: &RunArgs,
) -> ExitCode {
    let mut harness = match Harness::new(design, manifest, base_dir) {
        Ok(h) => h,
        Err(e) => {
            error!("{}", e);
            return exit_for(&e);
        }
    };

    if let Some(input) = &paths.input {
        let script = match load_input_script(input) {
            Ok(s) => s,
            Err(e) => {
                error!("{:#}", e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        };
        if let Err(e) = harness.load_script(&script) {
            error!("{}", e);
            return exit_for(&e);
        }
        info!("Loaded {} input commands from {:?}", script.len(), input);
    }

    let metrics = Arc::new(RunMetrics::new());
    harness.add_observer(metrics.clone());

    if let Some(path) = &paths.vcd {
        match vcd_trace::VcdObserver::new(path, harness.pins()) {
            Ok(vcd) => {
                info!("Writing waveform to {:?}", path);
                harness.add_observer(Arc::new(vcd));
            }
            Err(e) => {
                error!("Failed to create VCD file {:?}: {:#}", path, e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        }
    }

    if let Some(addr) = args.inspect.as_ref().or(manifest.inspect.as_ref()) {
        match Inspector::bind(addr) {
            Ok(inspector) => {
                info!("Inspection endpoint at {}", inspector.local_addr());
                harness.add_observer(inspector);
            }
            Err(e) => {
                error!("{}", e);
                return ExitCode::from(EXIT_CONFIG_ERROR);
            }
        }
    }

    let log = match EventLog::create(&paths.events) {
        Ok(log) => log,
        Err(e) => {
            error!("Failed to create event log {:?}: {}", paths.events, e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    info!("Running {} cycles, events to {:?}", cycles, paths.events);
    let summary = match harness.run(cycles, log) {
        Ok((_, summary)) => summary,
        Err(e) => {
            error!("Run aborted at timestamp {}: {}", harness.timestamp(), e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    };

    for (source, count) in &summary.events_by_source {
        info!("  {}: {} events", source, count);
    }
    info!("Event log sha256 {}", summary.log_sha256);
    info!(
        "Simulated {} half-cycles at {:.0} cycles/s",
        metrics.get_half_cycles(),
        metrics.get_cycle_rate()
    );

    if let Some(path) = &args.summary {
        let written = serde_json::to_string_pretty(&summary)
            .map_err(anyhow::Error::from)
            .and_then(|json| std::fs::write(path, json).map_err(anyhow::Error::from));
        if let Err(e) = written {
            error!("Failed to write summary {:?}: {:#}", path, e);
            return ExitCode::from(EXIT_RUNTIME_ERROR);
        }
    }

    match &args.golden {
        Some(golden) => compare_logs(golden, &paths.events, args.unordered),
        None => ExitCode::from(EXIT_PASS),
    }
}

fn read_log(path: &Path) -> anyhow::Result<Vec<padring_core::Event>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read event log {:?}", path))?;
    parse_log(&text).with_context(|| format!("Malformed event log {:?}", path))
}

fn compare_logs(reference: &Path, candidate: &Path, unordered: bool) -> ExitCode {
    let (reference_events, candidate_events) = match (read_log(reference), read_log(candidate)) {
        (Ok(r), Ok(c)) => (r, c),
        (Err(e), _) | (_, Err(e)) => {
            error!("{:#}", e);
            return ExitCode::from(EXIT_CONFIG_ERROR);
        }
    };

    let mismatches = compare_events(&reference_events, &candidate_events, !unordered);
    if mismatches.is_empty() {
        info!(
            "Event logs match ({} events, {})",
            reference_events.len(),
            if unordered { "unordered" } else { "ordered" }
        );
        return ExitCode::from(EXIT_PASS);
    }

    for mismatch in &mismatches {
        warn!("{}", mismatch);
    }
    error!(
        "Event log {:?} does not match {:?} ({} differences)",
        candidate,
        reference,
        mismatches.len()
    );
    ExitCode::from(EXIT_MISMATCH)
}

fn compare(args: CompareArgs) -> ExitCode {
    compare_logs(&args.reference, &args.candidate, args.unordered)
}
