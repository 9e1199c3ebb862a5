use serde::Serialize;

/// One live network interface as last sampled from the kernel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceRecord {
    pub index: u32,
    /// Empty when the index could not be resolved.
    pub name: String,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
    /// Bytes since the previous sample, per direction.
    pub rx_rate: u64,
    pub tx_rate: u64,
}

impl InterfaceRecord {
    /// First observation of an interface: rates start at zero.
    pub fn from_sample(sample: &StatsSample, name: String) -> Self {
        Self {
            index: sample.index,
            name,
            rx_bytes: sample.rx_bytes,
            tx_bytes: sample.tx_bytes,
            rx_packets: sample.rx_packets,
            tx_packets: sample.tx_packets,
            rx_rate: 0,
            tx_rate: 0,
        }
    }

    /// Fold a newer sample into this record.
    ///
    /// A counter that went backwards (device reset, index reused) becomes the
    /// new baseline and yields a rate of 0 for that direction.
    pub fn update_from(&mut self, sample: &StatsSample, name: String) {
        self.rx_rate = counter_delta(self.rx_bytes, sample.rx_bytes);
        self.tx_rate = counter_delta(self.tx_bytes, sample.tx_bytes);
        self.name = name;
        self.rx_bytes = sample.rx_bytes;
        self.tx_bytes = sample.tx_bytes;
        self.rx_packets = sample.rx_packets;
        self.tx_packets = sample.tx_packets;
    }
}

fn counter_delta(prev: u64, cur: u64) -> u64 {
    cur.checked_sub(prev).unwrap_or(0)
}

// --- Decoded kernel messages ---

/// Counters from one RTM_NEWSTATS reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSample {
    pub index: u32,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

/// An RTM_DELLINK notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkRemoved {
    pub index: u32,
}

/// Result of decoding one well-formed netlink message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Message {
    Stats(StatsSample),
    LinkRemoved(LinkRemoved),
    /// Recognised but carries nothing for the registry (new link, end of dump).
    Ignored,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(index: u32, rx: u64, tx: u64) -> StatsSample {
        StatsSample { index, rx_bytes: rx, tx_bytes: tx, rx_packets: 1, tx_packets: 1 }
    }

    #[test]
    fn first_observation_has_zero_rates() {
        let rec = InterfaceRecord::from_sample(&sample(2, 1000, 500), "eth0".into());
        assert_eq!(rec.rx_rate, 0);
        assert_eq!(rec.tx_rate, 0);
        assert_eq!(rec.rx_bytes, 1000);
    }

    #[test]
    fn update_computes_delta_from_previous_counters() {
        let mut rec = InterfaceRecord::from_sample(&sample(2, 1000, 500), "eth0".into());
        rec.update_from(&sample(2, 1500, 900), "eth0".into());
        assert_eq!((rec.rx_rate, rec.tx_rate), (500, 400));
        rec.update_from(&sample(2, 1600, 900), "eth0".into());
        assert_eq!((rec.rx_rate, rec.tx_rate), (100, 0));
    }

    #[test]
    fn counter_reset_becomes_new_baseline() {
        let mut rec = InterfaceRecord::from_sample(&sample(4, 5000, 100), String::new());
        rec.update_from(&sample(4, 10, 300), "veth1".into());
        assert_eq!(rec.rx_rate, 0);
        assert_eq!(rec.tx_rate, 200);
        assert_eq!(rec.rx_bytes, 10);
        assert_eq!(rec.name, "veth1");

        rec.update_from(&sample(4, 40, 300), "veth1".into());
        assert_eq!(rec.rx_rate, 30);
    }
}
