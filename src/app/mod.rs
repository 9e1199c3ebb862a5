mod event_loop;

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::collectors::{NameResolver, StatsTransport};
use crate::config::CollectorConfig;
use crate::controller::{CycleReport, Monitor};
use crate::error::TransportError;
use crate::registry::Change;
use crate::scheduler::PollScheduler;
use crate::view::Presenter;

pub use event_loop::wait_readable;

/// Upper bound on one wait so a quit request is noticed promptly.
const QUIT_CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Collector plus its schedule and observer.
pub struct App<T: StatsTransport, R: NameResolver, W: Write> {
    pub monitor: Monitor<T, R>,
    pub scheduler: PollScheduler,
    pub presenter: Presenter<W>,
    pub config: CollectorConfig,
}

impl<T: StatsTransport, R: NameResolver, W: Write> App<T, R, W> {
    pub fn new(transport: T, resolver: R, out: W, config: CollectorConfig) -> Self {
        Self {
            monitor: Monitor::new(transport, resolver),
            scheduler: PollScheduler::new(config.poll_interval, Instant::now()),
            presenter: Presenter::new(out, config.display),
            config,
        }
    }

    /// Run a poll cycle if one is due. Returns its report when it ran.
    pub fn process_tick(&mut self, now: Instant) -> Option<CycleReport> {
        if !self.scheduler.is_due(now) {
            return None;
        }
        let report = self.monitor.poll_cycle();
        self.scheduler.mark_fired(now);
        Some(report)
    }

    /// Apply pending link notifications.
    pub fn process_events(&mut self) -> CycleReport {
        let report = self.monitor.handle_events();
        let removed = report.count(|c| matches!(c, Change::Removed(_)));
        if removed > 0 {
            info!(removed, remaining = self.monitor.registry().len(), "interfaces removed");
        }
        report
    }

    /// Emit the current registry contents.
    pub fn render(&mut self) -> io::Result<()> {
        self.presenter.render(self.monitor.registry().iter())
    }

    pub fn cycle_limit_reached(&self) -> bool {
        self.config
            .max_cycles
            .is_some_and(|max| self.monitor.cycles() >= max)
    }

    /// Drive the loop until `should_quit` is set or the cycle limit is hit.
    ///
    /// Only a failure of the readiness wait itself ends the loop with an
    /// error; per-cycle send, receive and decode problems are absorbed.
    pub fn run_loop(&mut self, should_quit: &AtomicBool) -> Result<(), TransportError> {
        loop {
            if should_quit.load(Ordering::Relaxed) {
                info!("shutdown requested");
                break;
            }

            let now = Instant::now();
            if self.process_tick(now).is_some() {
                if let Err(e) = self.render() {
                    warn!(error = %e, "failed to write snapshot");
                }
                if self.cycle_limit_reached() {
                    info!(cycles = self.monitor.cycles(), "cycle limit reached");
                    break;
                }
            }

            let timeout = self
                .scheduler
                .time_until_due(Instant::now())
                .min(QUIT_CHECK_INTERVAL);
            if wait_readable(self.monitor.transport().event_fd(), timeout)? {
                self.process_events();
            }
        }

        self.monitor.shutdown();
        Ok(())
    }
}

/// Open the live netlink channels and run until interrupted.
#[cfg(target_os = "linux")]
pub fn run(should_quit: std::sync::Arc<AtomicBool>, config: CollectorConfig) -> Result<(), TransportError> {
    use crate::collectors::linux::{IfNameResolver, NetlinkTransport};

    let transport = NetlinkTransport::open()?;
    info!(
        interval_ms = config.poll_interval.as_millis() as u64,
        raw_bytes = config.display.raw_bytes,
        simple_mode = config.display.simple_mode,
        "collector started"
    );

    let mut app = App::new(transport, IfNameResolver, io::stdout().lock(), config);
    app.run_loop(&should_quit)
}
