//! Headless observer: one JSON line per snapshot of the registry.

use std::io::{self, Write};

use chrono::Local;
use serde::Serialize;

use crate::model::{DisplayOptions, InterfaceRecord};

#[derive(Serialize)]
struct SnapshotLine<'a> {
    time: String,
    display: DisplayOptions,
    interfaces: Vec<RecordView<'a>>,
}

/// Serialized form of a record. Simple mode drops the packet counters.
#[derive(Serialize)]
struct RecordView<'a> {
    index: u32,
    name: &'a str,
    rx_bytes: u64,
    tx_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    rx_packets: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tx_packets: Option<u64>,
    rx_rate: u64,
    tx_rate: u64,
}

impl<'a> RecordView<'a> {
    fn new(record: &'a InterfaceRecord, display: DisplayOptions) -> Self {
        let packets = |v: u64| (!display.simple_mode).then_some(v);
        Self {
            index: record.index,
            name: &record.name,
            rx_bytes: record.rx_bytes,
            tx_bytes: record.tx_bytes,
            rx_packets: packets(record.rx_packets),
            tx_packets: packets(record.tx_packets),
            rx_rate: record.rx_rate,
            tx_rate: record.tx_rate,
        }
    }
}

pub struct Presenter<W: Write> {
    out: W,
    display: DisplayOptions,
}

impl<W: Write> Presenter<W> {
    pub fn new(out: W, display: DisplayOptions) -> Self {
        Self { out, display }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Write the records, in order, as a single line stamped with local time.
    pub fn render<'a>(&mut self, records: impl IntoIterator<Item = &'a InterfaceRecord>) -> io::Result<()> {
        let time = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string();
        self.render_at(time, records)
    }

    pub fn render_at<'a>(
        &mut self,
        time: String,
        records: impl IntoIterator<Item = &'a InterfaceRecord>,
    ) -> io::Result<()> {
        let line = SnapshotLine {
            time,
            display: self.display,
            interfaces: records.into_iter().map(|r| RecordView::new(r, self.display)).collect(),
        };
        serde_json::to_writer(&mut self.out, &line)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}
