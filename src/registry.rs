//! Source of truth for live interfaces.
//!
//! Records live in insertion-ordered slots with a side index from ifindex to
//! slot. Removal leaves a tombstone so the remaining records keep their
//! relative order; tombstones are compacted away once they outnumber the live
//! records. Both views are only ever touched together, inside this module.

use std::collections::HashMap;

use tracing::trace;

use crate::collectors::NameResolver;
use crate::model::{InterfaceRecord, LinkRemoved, Message, StatsSample};

const MIN_COMPACT_TOMBSTONES: usize = 16;

/// Notification emitted for every mutation of the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    Added(u32),
    Updated(u32),
    Removed(u32),
}

pub struct InterfaceRegistry<R: NameResolver> {
    slots: Vec<Option<InterfaceRecord>>,
    by_index: HashMap<u32, usize>,
    resolver: R,
}

impl<R: NameResolver> InterfaceRegistry<R> {
    pub fn new(resolver: R) -> Self {
        Self {
            slots: Vec::new(),
            by_index: HashMap::new(),
            resolver,
        }
    }

    pub fn resolver_mut(&mut self) -> &mut R {
        &mut self.resolver
    }

    fn resolve_name(&self, index: u32) -> String {
        self.resolver.resolve(index).unwrap_or_else(|| {
            trace!(index, "interface name not resolved");
            String::new()
        })
    }

    /// Insert a first-seen interface or fold the sample into its record.
    pub fn apply_sample(&mut self, sample: StatsSample) -> Change {
        let name = self.resolve_name(sample.index);

        if let Some(record) = self
            .by_index
            .get(&sample.index)
            .and_then(|&slot| self.slots.get_mut(slot))
            .and_then(Option::as_mut)
        {
            record.update_from(&sample, name);
            return Change::Updated(sample.index);
        }

        self.by_index.insert(sample.index, self.slots.len());
        self.slots.push(Some(InterfaceRecord::from_sample(&sample, name)));
        Change::Added(sample.index)
    }

    /// Drop a record. Removing an index that was never sampled is a no-op.
    pub fn apply_removal(&mut self, removal: LinkRemoved) -> Option<Change> {
        let slot = self.by_index.remove(&removal.index)?;
        self.slots.get_mut(slot)?.take()?;
        self.maybe_compact();
        Some(Change::Removed(removal.index))
    }

    /// Dispatch one decoded message.
    pub fn apply(&mut self, message: Message) -> Option<Change> {
        match message {
            Message::Stats(sample) => Some(self.apply_sample(sample)),
            Message::LinkRemoved(removal) => self.apply_removal(removal),
            Message::Ignored => None,
        }
    }

    fn maybe_compact(&mut self) {
        let live = self.by_index.len();
        let tombstones = self.slots.len() - live;
        if tombstones < MIN_COMPACT_TOMBSTONES || tombstones <= live {
            return;
        }

        self.slots.retain(Option::is_some);
        for (slot, record) in self.slots.iter().enumerate() {
            if let Some(record) = record {
                self.by_index.insert(record.index, slot);
            }
        }
    }

    pub fn get(&self, index: u32) -> Option<&InterfaceRecord> {
        self.by_index
            .get(&index)
            .and_then(|&slot| self.slots.get(slot))
            .and_then(Option::as_ref)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.by_index.contains_key(&index)
    }

    /// Records in order of first appearance.
    pub fn iter(&self) -> impl Iterator<Item = &InterfaceRecord> {
        self.slots.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_index.is_empty()
    }

    /// Owned, ordered copy for observers.
    pub fn snapshot(&self) -> Vec<InterfaceRecord> {
        self.iter().cloned().collect()
    }
}
