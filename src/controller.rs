//! Ties the transport to the registry: one serialized apply path for both
//! the periodic dump and the link notifications.

use tracing::{debug, warn};

use crate::collectors::{Batch, NameResolver, StatsTransport};
use crate::registry::{Change, InterfaceRegistry};

/// What one poll cycle or event drain did to the registry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub changes: Vec<Change>,
    /// Messages dropped by the decoder.
    pub rejected: usize,
    pub send_failed: bool,
}

impl CycleReport {
    pub fn changed(&self) -> bool {
        !self.changes.is_empty()
    }

    pub fn count(&self, pred: impl Fn(&Change) -> bool) -> usize {
        self.changes.iter().filter(|c| pred(c)).count()
    }
}

pub struct Monitor<T: StatsTransport, R: NameResolver> {
    transport: T,
    registry: InterfaceRegistry<R>,
    cycles: u64,
}

impl<T: StatsTransport, R: NameResolver> Monitor<T, R> {
    pub fn new(transport: T, resolver: R) -> Self {
        Self {
            transport,
            registry: InterfaceRegistry::new(resolver),
            cycles: 0,
        }
    }

    pub fn registry(&self) -> &InterfaceRegistry<R> {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Request a dump and apply whatever the kernel has queued in reply.
    ///
    /// A failed send is logged and left for the next cycle to retry.
    pub fn poll_cycle(&mut self) -> CycleReport {
        self.cycles += 1;
        let mut report = CycleReport::default();

        if let Err(e) = self.transport.request_stats_dump() {
            warn!(error = %e, cycle = self.cycles, "stats request not sent");
            report.send_failed = true;
        }

        let batch = self.transport.drain_request_channel();
        self.apply_batch(batch, &mut report);

        debug!(
            cycle = self.cycles,
            interfaces = self.registry.len(),
            changes = report.changes.len(),
            rejected = report.rejected,
            "poll cycle"
        );
        report
    }

    /// Apply pending link notifications.
    pub fn handle_events(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let batch = self.transport.drain_event_channel();
        self.apply_batch(batch, &mut report);

        for change in &report.changes {
            if let Change::Removed(index) = change {
                debug!(index, "interface removed");
            }
        }
        report
    }

    fn apply_batch(&mut self, batch: Batch, report: &mut CycleReport) {
        report.rejected += batch.rejected;
        report
            .changes
            .extend(batch.messages.into_iter().filter_map(|msg| self.registry.apply(msg)));
    }

    /// Close the transport. The registry stays readable.
    pub fn shutdown(&mut self) {
        self.transport.close();
    }
}
