//! In-memory transport for exercising the collector without a kernel.
//!
//! `MockTransport` plays the kernel's part: each stats request moves the next
//! scripted dump into the request channel's receive queue, and event
//! datagrams can be injected at any time. Received bytes go through the same
//! framing and decoding as the live transport.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;

use super::{Batch, NameResolver, StatsTransport, decode_datagram};
use crate::error::TransportError;
use crate::model::StatsSample;

#[derive(Debug, Default)]
pub struct MockTransport {
    /// Dumps handed out, one per request, in order.
    scripted_dumps: VecDeque<Vec<u8>>,
    request_rx: VecDeque<Vec<u8>>,
    event_rx: VecDeque<Vec<u8>>,
    fail_sends: usize,
    closed: bool,
    pub requests_sent: u32,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the reply to a future dump request: one stats message per
    /// sample followed by NLMSG_DONE, in a single datagram.
    pub fn script_dump(&mut self, samples: &[StatsSample]) {
        let seq = self.scripted_dumps.len() as u32 + 1;
        let mut parts: Vec<Vec<u8>> = samples.iter().map(|s| frames::stats_reply(seq, s)).collect();
        parts.push(frames::done(seq));
        self.scripted_dumps.push_back(frames::datagram(&parts));
    }

    /// Script a raw reply datagram, malformed or not.
    pub fn script_raw_dump(&mut self, datagram: Vec<u8>) {
        self.scripted_dumps.push_back(datagram);
    }

    /// Queue a datagram on the event channel.
    pub fn push_event(&mut self, datagram: Vec<u8>) {
        self.event_rx.push_back(datagram);
    }

    /// Make the next `count` requests fail as if sendto(2) did.
    pub fn fail_next_sends(&mut self, count: usize) {
        self.fail_sends = count;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn pending_events(&self) -> usize {
        self.event_rx.len()
    }
}

fn drain_queue(queue: &mut VecDeque<Vec<u8>>, channel: &'static str) -> Batch {
    let mut batch = Batch::default();
    while let Some(datagram) = queue.pop_front() {
        decode_datagram(&datagram, channel, &mut batch);
    }
    batch
}

impl StatsTransport for MockTransport {
    fn request_stats_dump(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Send(io::Error::from(io::ErrorKind::NotConnected)));
        }
        if self.fail_sends > 0 {
            self.fail_sends -= 1;
            return Err(TransportError::Send(io::Error::from_raw_os_error(libc::ENOBUFS)));
        }
        self.requests_sent += 1;
        if let Some(dump) = self.scripted_dumps.pop_front() {
            self.request_rx.push_back(dump);
        }
        Ok(())
    }

    fn drain_request_channel(&mut self) -> Batch {
        drain_queue(&mut self.request_rx, "request")
    }

    fn drain_event_channel(&mut self) -> Batch {
        drain_queue(&mut self.event_rx, "event")
    }

    fn event_fd(&self) -> Option<RawFd> {
        None
    }

    fn close(&mut self) {
        self.closed = true;
        self.request_rx.clear();
        self.event_rx.clear();
    }
}

/// Fixed ifindex → name table.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    names: HashMap<u32, String>,
}

impl MapResolver {
    pub fn new<'a>(entries: impl IntoIterator<Item = (u32, &'a str)>) -> Self {
        Self {
            names: entries.into_iter().map(|(i, n)| (i, n.to_string())).collect(),
        }
    }

    pub fn rename(&mut self, index: u32, name: &str) {
        self.names.insert(index, name.to_string());
    }

    pub fn forget(&mut self, index: u32) {
        self.names.remove(&index);
    }
}

impl NameResolver for MapResolver {
    fn resolve(&self, index: u32) -> Option<String> {
        self.names.get(&index).cloned()
    }
}

/// Builders for raw rtnetlink messages, byte-compatible with what the kernel
/// sends.
pub mod frames {
    use crate::collectors::decode::{
        IFINFOMSG_LEN, IFLA_STATS_LINK_64, LINK_STATS64_LENS, NLM_F_MULTI, NLMSG_DONE,
        NLMSG_ERROR, NLMSG_HDRLEN, NlMsgHeader, RTA_HDRLEN, RTM_NEWSTATS, nlmsg_align,
    };
    use crate::model::StatsSample;

    /// Header plus payload, padded to the netlink alignment.
    pub fn message(msg_type: u16, flags: u16, seq: u32, payload: &[u8]) -> Vec<u8> {
        let len = NLMSG_HDRLEN + payload.len();
        let mut out = Vec::with_capacity(nlmsg_align(len));
        NlMsgHeader { len: len as u32, msg_type, flags, seq, pid: 0 }.write(&mut out);
        out.extend_from_slice(payload);
        out.resize(nlmsg_align(len), 0);
        out
    }

    pub fn datagram(messages: &[Vec<u8>]) -> Vec<u8> {
        messages.concat()
    }

    pub fn if_stats_msg(index: u32) -> Vec<u8> {
        let mut out = vec![libc::AF_UNSPEC as u8, 0, 0, 0];
        out.extend_from_slice(&index.to_ne_bytes());
        out.extend_from_slice(&0u32.to_ne_bytes()); // filter_mask
        out
    }

    pub fn attr(attr_type: u16, data: &[u8]) -> Vec<u8> {
        let len = RTA_HDRLEN + data.len();
        let mut out = Vec::with_capacity(nlmsg_align(len));
        out.extend_from_slice(&(len as u16).to_ne_bytes());
        out.extend_from_slice(&attr_type.to_ne_bytes());
        out.extend_from_slice(data);
        out.resize(nlmsg_align(len), 0);
        out
    }

    /// `rtnl_link_stats64` of `len` bytes with the four leading counters set.
    pub fn link_stats64(sample: &StatsSample, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len.max(32));
        for v in [sample.rx_packets, sample.tx_packets, sample.rx_bytes, sample.tx_bytes] {
            out.extend_from_slice(&v.to_ne_bytes());
        }
        out.resize(len, 0);
        out
    }

    pub fn stats_reply_with_len(seq: u32, sample: &StatsSample, stats_len: usize) -> Vec<u8> {
        let mut payload = if_stats_msg(sample.index);
        payload.extend(attr(IFLA_STATS_LINK_64, &link_stats64(sample, stats_len)));
        message(RTM_NEWSTATS, NLM_F_MULTI, seq, &payload)
    }

    pub fn stats_reply(seq: u32, sample: &StatsSample) -> Vec<u8> {
        stats_reply_with_len(seq, sample, LINK_STATS64_LENS[1])
    }

    /// Stats reply with an IFLA_STATS_LINK_XSTATS attribute ahead of the
    /// link counters.
    pub fn stats_reply_with_extra_attr(seq: u32, sample: &StatsSample) -> Vec<u8> {
        let mut payload = if_stats_msg(sample.index);
        payload.extend(attr(2, &[0xAA; 6]));
        payload.extend(attr(IFLA_STATS_LINK_64, &link_stats64(sample, LINK_STATS64_LENS[1])));
        message(RTM_NEWSTATS, NLM_F_MULTI, seq, &payload)
    }

    /// RTM_NEWLINK / RTM_DELLINK carrying only the ifinfomsg header.
    pub fn link_notification(msg_type: u16, index: u32) -> Vec<u8> {
        let mut payload = vec![0u8; IFINFOMSG_LEN];
        payload[0] = libc::AF_UNSPEC as u8;
        payload[4..8].copy_from_slice(&(index as i32).to_ne_bytes());
        message(msg_type, 0, 0, &payload)
    }

    pub fn done(seq: u32) -> Vec<u8> {
        message(NLMSG_DONE, NLM_F_MULTI, seq, &0i32.to_ne_bytes())
    }

    /// NLMSG_ERROR with `code` followed by a copy of a request header.
    pub fn error(seq: u32, code: i32) -> Vec<u8> {
        let mut payload = code.to_ne_bytes().to_vec();
        payload.extend_from_slice(&[0u8; NLMSG_HDRLEN]);
        message(NLMSG_ERROR, 0, seq, &payload)
    }
}

#[cfg(test)]
mod tests {
    use super::{MockTransport, frames};
    use crate::collectors::StatsTransport;
    use crate::collectors::decode::RTM_DELLINK;
    use crate::model::{LinkRemoved, Message, StatsSample};

    #[test]
    fn dump_is_delivered_only_after_a_request() {
        let sample = StatsSample { index: 1, rx_bytes: 1, ..Default::default() };
        let mut transport = MockTransport::new();
        transport.script_dump(&[sample]);

        assert!(transport.drain_request_channel().is_empty());
        transport.request_stats_dump().unwrap();
        let batch = transport.drain_request_channel();
        assert_eq!(batch.messages, vec![Message::Stats(sample)]);
        assert!(transport.drain_request_channel().is_empty());
    }

    #[test]
    fn events_drain_in_order() {
        let mut transport = MockTransport::new();
        transport.push_event(frames::link_notification(RTM_DELLINK, 3));
        transport.push_event(frames::link_notification(RTM_DELLINK, 1));
        let batch = transport.drain_event_channel();
        assert_eq!(
            batch.messages,
            vec![
                Message::LinkRemoved(LinkRemoved { index: 3 }),
                Message::LinkRemoved(LinkRemoved { index: 1 }),
            ]
        );
        assert_eq!(transport.pending_events(), 0);
    }

    #[test]
    fn scripted_send_failures_are_consumed() {
        let mut transport = MockTransport::new();
        transport.fail_next_sends(1);
        assert!(transport.request_stats_dump().is_err());
        assert!(transport.request_stats_dump().is_ok());
        assert_eq!(transport.requests_sent, 1);
    }
}
