use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing::{error, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use netifstat::config::CollectorConfig;
use netifstat::model::DisplayOptions;

/// Live per-interface network statistics from rtnetlink.
///
/// Writes one JSON snapshot per poll cycle to stdout.
#[derive(Parser)]
#[command(name = "netifstat", version)]
struct Args {
    /// Poll interval in milliseconds (minimum 100).
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,

    /// Show byte counts unscaled downstream.
    #[arg(long)]
    raw_bytes: bool,

    /// Leave packet counters out of the output.
    #[arg(long)]
    simple: bool,

    /// Stop after this many poll cycles (0 runs until interrupted).
    #[arg(short = 'n', long, default_value_t = 0)]
    count: u64,

    /// Write logs to this file instead of stderr.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Increase logging verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn config(&self) -> CollectorConfig {
        CollectorConfig::default()
            .with_interval_ms(self.interval_ms)
            .with_max_cycles(self.count)
            .with_display(DisplayOptions {
                raw_bytes: self.raw_bytes,
                simple_mode: self.simple,
            })
    }
}

/// Default level is WARN; RUST_LOG directives still apply on top.
/// Returns the appender guard, which must live until exit to flush the file.
fn init_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let level = if quiet {
        LevelFilter::ERROR
    } else {
        match verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let file = path.file_name().map(Path::new).unwrap_or(Path::new("netifstat.log"));
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
            None
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    let _guard = init_logging(args.verbose, args.quiet, args.log_file.as_deref());

    let should_quit = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&should_quit)) {
            warn!(signal, error = %e, "failed to install signal handler");
        }
    }

    run(should_quit, args.config())
}

#[cfg(target_os = "linux")]
fn run(should_quit: Arc<AtomicBool>, config: CollectorConfig) -> ExitCode {
    match netifstat::app::run(should_quit, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_setup() => {
            error!(error = %e, "could not open rtnetlink channels");
            eprintln!("netifstat: cannot start: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "collector failed");
            eprintln!("netifstat: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn run(_should_quit: Arc<AtomicBool>, _config: CollectorConfig) -> ExitCode {
    error!("rtnetlink is only available on Linux");
    eprintln!("netifstat: rtnetlink is only available on Linux");
    ExitCode::FAILURE
}
