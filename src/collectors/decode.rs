//! rtnetlink wire format: request encoding, datagram framing and message
//! decoding.
//!
//! Every length field read from the kernel is treated as untrusted. Reads go
//! through bounds-checked helpers, so a malformed buffer produces a
//! [`DecodeError`] and never a panic or an out-of-bounds access.

use crate::error::DecodeError;
use crate::model::{LinkRemoved, Message, StatsSample};

// ── constants ───────────────────────────────────────────────────────────

pub const NLMSG_ALIGNTO: usize = 4;
pub const NLMSG_HDRLEN: usize = 16;

pub const NLMSG_NOOP: u16 = 1;
pub const NLMSG_ERROR: u16 = 2;
pub const NLMSG_DONE: u16 = 3;
pub const NLMSG_OVERRUN: u16 = 4;

pub const NLM_F_REQUEST: u16 = 0x01;
pub const NLM_F_MULTI: u16 = 0x02;
pub const NLM_F_DUMP: u16 = 0x300;

pub const RTM_NEWLINK: u16 = 16;
pub const RTM_DELLINK: u16 = 17;
pub const RTM_NEWSTATS: u16 = 92;
pub const RTM_GETSTATS: u16 = 94;

pub const RTNLGRP_LINK: u32 = 1;

pub const IFLA_STATS_LINK_64: u16 = 1;

/// `struct if_stats_msg`: family, pad1, pad2, ifindex, filter_mask.
pub const IF_STATS_MSG_LEN: usize = 12;
/// `struct ifinfomsg`: family, pad, type, index, flags, change.
pub const IFINFOMSG_LEN: usize = 16;
pub const RTA_HDRLEN: usize = 4;

const NLA_TYPE_MASK: u16 = !(0x8000 | 0x4000);

/// Accepted sizes of `struct rtnl_link_stats64`: 24 counters, and 25 since
/// `rx_otherhost_dropped` was appended in Linux 5.19.
pub const LINK_STATS64_LENS: [usize; 2] = [24 * 8, 25 * 8];

pub fn nlmsg_align(len: usize) -> usize {
    (len + NLMSG_ALIGNTO - 1) & !(NLMSG_ALIGNTO - 1)
}

// ── bounds-checked readers ──────────────────────────────────────────────

fn field<const N: usize>(buf: &[u8], offset: usize, what: &'static str) -> Result<[u8; N], DecodeError> {
    offset
        .checked_add(N)
        .and_then(|end| buf.get(offset..end))
        .and_then(|bytes| <[u8; N]>::try_from(bytes).ok())
        .ok_or(DecodeError::Truncated {
            what,
            needed: offset.saturating_add(N),
            available: buf.len(),
        })
}

fn read_u16(buf: &[u8], offset: usize, what: &'static str) -> Result<u16, DecodeError> {
    field::<2>(buf, offset, what).map(u16::from_ne_bytes)
}

fn read_u32(buf: &[u8], offset: usize, what: &'static str) -> Result<u32, DecodeError> {
    field::<4>(buf, offset, what).map(u32::from_ne_bytes)
}

fn read_i32(buf: &[u8], offset: usize, what: &'static str) -> Result<i32, DecodeError> {
    field::<4>(buf, offset, what).map(i32::from_ne_bytes)
}

fn read_u64(buf: &[u8], offset: usize, what: &'static str) -> Result<u64, DecodeError> {
    field::<8>(buf, offset, what).map(u64::from_ne_bytes)
}

// ── header ──────────────────────────────────────────────────────────────

/// `struct nlmsghdr`, host byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NlMsgHeader {
    pub len: u32,
    pub msg_type: u16,
    pub flags: u16,
    pub seq: u32,
    pub pid: u32,
}

impl NlMsgHeader {
    pub fn parse(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < NLMSG_HDRLEN {
            return Err(DecodeError::Truncated {
                what: "netlink header",
                needed: NLMSG_HDRLEN,
                available: buf.len(),
            });
        }
        Ok(Self {
            len: read_u32(buf, 0, "netlink header")?,
            msg_type: read_u16(buf, 4, "netlink header")?,
            flags: read_u16(buf, 6, "netlink header")?,
            seq: read_u32(buf, 8, "netlink header")?,
            pid: read_u32(buf, 12, "netlink header")?,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.len.to_ne_bytes());
        out.extend_from_slice(&self.msg_type.to_ne_bytes());
        out.extend_from_slice(&self.flags.to_ne_bytes());
        out.extend_from_slice(&self.seq.to_ne_bytes());
        out.extend_from_slice(&self.pid.to_ne_bytes());
    }
}

// ── request ─────────────────────────────────────────────────────────────

/// Build an RTM_GETSTATS dump request for `AF_INET` that asks only for
/// `IFLA_STATS_LINK_64`.
pub fn stats_dump_request(seq: u32) -> Vec<u8> {
    let len = NLMSG_HDRLEN + IF_STATS_MSG_LEN;
    let mut out = Vec::with_capacity(len);
    NlMsgHeader {
        len: len as u32,
        msg_type: RTM_GETSTATS,
        flags: NLM_F_REQUEST | NLM_F_DUMP,
        seq,
        pid: 0,
    }
    .write(&mut out);

    out.push(libc::AF_INET as u8); // family
    out.push(0); // pad1
    out.extend_from_slice(&0u16.to_ne_bytes()); // pad2
    out.extend_from_slice(&0u32.to_ne_bytes()); // ifindex: all
    out.extend_from_slice(&stats_filter_bit(IFLA_STATS_LINK_64).to_ne_bytes());
    out
}

fn stats_filter_bit(attr: u16) -> u32 {
    1 << (attr - 1)
}

// ── framing ─────────────────────────────────────────────────────────────

/// Splits one received datagram into netlink messages.
///
/// Yields each message as a slice bounded by its declared length. The first
/// inconsistent header ends iteration with a single error, since nothing
/// after it can be located reliably.
pub struct MessageIter<'a> {
    buf: &'a [u8],
    offset: usize,
    done: bool,
}

impl<'a> MessageIter<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, offset: 0, done: false }
    }
}

impl<'a> Iterator for MessageIter<'a> {
    type Item = Result<&'a [u8], DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rest = self.buf.get(self.offset..).unwrap_or_default();
        if rest.is_empty() {
            self.done = true;
            return None;
        }

        let header = match NlMsgHeader::parse(rest) {
            Ok(h) => h,
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        let len = header.len as usize;
        if len < NLMSG_HDRLEN || len > rest.len() {
            self.done = true;
            return Some(Err(DecodeError::BadMessageLength {
                declared: header.len,
                available: rest.len(),
            }));
        }

        self.offset = self.offset.saturating_add(nlmsg_align(len));
        Some(Ok(&rest[..len]))
    }
}

// ── attributes ──────────────────────────────────────────────────────────

/// Walks a `struct rtattr` stream. A zero-length remainder ends the walk; a
/// partial header or an out-of-range length is reported as malformed.
struct AttrIter<'a> {
    buf: &'a [u8],
    base: usize,
    offset: usize,
    done: bool,
}

impl<'a> AttrIter<'a> {
    fn new(buf: &'a [u8], base: usize) -> Self {
        Self { buf, base, offset: 0, done: false }
    }
}

impl<'a> Iterator for AttrIter<'a> {
    /// (type, payload)
    type Item = Result<(u16, &'a [u8]), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let rest = self.buf.get(self.offset..).unwrap_or_default();
        if rest.is_empty() {
            self.done = true;
            return None;
        }

        let at = self.base + self.offset;
        let malformed = |declared| DecodeError::MalformedAttribute { offset: at, declared };

        let (len, ty) = match (read_u16(rest, 0, "attribute"), read_u16(rest, 2, "attribute")) {
            (Ok(len), Ok(ty)) => (len, ty),
            _ => {
                self.done = true;
                return Some(Err(malformed(0)));
            }
        };
        let len_usize = len as usize;
        if len_usize < RTA_HDRLEN || len_usize > rest.len() {
            self.done = true;
            return Some(Err(malformed(len)));
        }

        self.offset = self.offset.saturating_add(nlmsg_align(len_usize));
        Some(Ok((ty & NLA_TYPE_MASK, &rest[RTA_HDRLEN..len_usize])))
    }
}

// ── messages ────────────────────────────────────────────────────────────

/// Decode a single framed netlink message (as yielded by [`MessageIter`]).
pub fn decode_message(msg: &[u8]) -> Result<Message, DecodeError> {
    let header = NlMsgHeader::parse(msg)?;
    let len = header.len as usize;
    if len < NLMSG_HDRLEN || len > msg.len() {
        return Err(DecodeError::BadMessageLength { declared: header.len, available: msg.len() });
    }
    let payload = &msg[NLMSG_HDRLEN..len];

    match header.msg_type {
        RTM_NEWSTATS => decode_stats(payload).map(Message::Stats),
        RTM_DELLINK => decode_link_index(payload).map(|index| Message::LinkRemoved(LinkRemoved { index })),
        RTM_NEWLINK => Ok(Message::Ignored),
        NLMSG_NOOP | NLMSG_DONE => Ok(Message::Ignored),
        NLMSG_ERROR => match read_i32(payload, 0, "error message")? {
            0 => Ok(Message::Ignored),
            code => Err(DecodeError::Kernel(code)),
        },
        NLMSG_OVERRUN => Err(DecodeError::Overrun),
        other => Err(DecodeError::UnexpectedType(other)),
    }
}

fn decode_stats(payload: &[u8]) -> Result<StatsSample, DecodeError> {
    if payload.len() < IF_STATS_MSG_LEN {
        return Err(DecodeError::Truncated {
            what: "if_stats_msg",
            needed: IF_STATS_MSG_LEN,
            available: payload.len(),
        });
    }
    let index = read_u32(payload, 4, "if_stats_msg")?;

    let attrs_start = nlmsg_align(IF_STATS_MSG_LEN);
    let attrs = payload.get(attrs_start..).unwrap_or_default();

    // Walk the whole stream so framing errors anywhere reject the message.
    // First occurrence of a type wins.
    let mut link64: Option<&[u8]> = None;
    for attr in AttrIter::new(attrs, NLMSG_HDRLEN + attrs_start) {
        let (ty, data) = attr?;
        if ty == IFLA_STATS_LINK_64 && link64.is_none() {
            link64 = Some(data);
        }
    }

    let stats = link64.ok_or(DecodeError::MissingLinkStats { index })?;
    if !LINK_STATS64_LENS.contains(&stats.len()) {
        return Err(DecodeError::StatsLengthMismatch { actual: stats.len() });
    }

    // rtnl_link_stats64 leads with rx_packets, tx_packets, rx_bytes, tx_bytes.
    Ok(StatsSample {
        index,
        rx_packets: read_u64(stats, 0, "link stats")?,
        tx_packets: read_u64(stats, 8, "link stats")?,
        rx_bytes: read_u64(stats, 16, "link stats")?,
        tx_bytes: read_u64(stats, 24, "link stats")?,
    })
}

fn decode_link_index(payload: &[u8]) -> Result<u32, DecodeError> {
    if payload.len() < IFINFOMSG_LEN {
        return Err(DecodeError::Truncated {
            what: "ifinfomsg",
            needed: IFINFOMSG_LEN,
            available: payload.len(),
        });
    }
    // ifi_index is a signed int in the uapi; kernel indices are always positive.
    let raw = read_i32(payload, 4, "ifinfomsg")?;
    u32::try_from(raw)
        .ok()
        .filter(|&index| index > 0)
        .ok_or(DecodeError::InvalidIndex(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::mock::frames;

    fn sample(index: u32, rx: u64, tx: u64) -> StatsSample {
        StatsSample { index, rx_bytes: rx, tx_bytes: tx, rx_packets: 10, tx_packets: 5 }
    }

    #[test]
    fn request_is_a_getstats_dump() {
        let req = stats_dump_request(7);
        assert_eq!(req.len(), NLMSG_HDRLEN + IF_STATS_MSG_LEN);

        let header = NlMsgHeader::parse(&req).unwrap();
        assert_eq!(header.len as usize, req.len());
        assert_eq!(header.msg_type, RTM_GETSTATS);
        assert_eq!(header.flags, NLM_F_REQUEST | NLM_F_DUMP);
        assert_eq!(header.seq, 7);

        assert_eq!(req[16], libc::AF_INET as u8);
        let mask = u32::from_ne_bytes(req[24..28].try_into().unwrap());
        assert_eq!(mask, 1);
    }

    #[test]
    fn decodes_stats_reply() {
        let msg = frames::stats_reply(1, &sample(2, 1000, 500));
        assert_eq!(decode_message(&msg), Ok(Message::Stats(sample(2, 1000, 500))));
    }

    #[test]
    fn accepts_pre_5_19_stats_layout() {
        let msg = frames::stats_reply_with_len(1, &sample(3, 7, 8), LINK_STATS64_LENS[0]);
        assert_eq!(decode_message(&msg), Ok(Message::Stats(sample(3, 7, 8))));
    }

    #[test]
    fn skips_unrelated_attributes_before_link_stats() {
        let msg = frames::stats_reply_with_extra_attr(1, &sample(9, 1, 2));
        assert_eq!(decode_message(&msg), Ok(Message::Stats(sample(9, 1, 2))));
    }

    #[test]
    fn rejects_link_stats_length_mismatch() {
        let msg = frames::stats_reply_with_len(1, &sample(2, 1, 1), 64);
        assert_eq!(decode_message(&msg), Err(DecodeError::StatsLengthMismatch { actual: 64 }));
    }

    #[test]
    fn rejects_stats_reply_without_link_stats() {
        let msg = frames::message(RTM_NEWSTATS, NLM_F_MULTI, 1, &frames::if_stats_msg(5));
        assert_eq!(decode_message(&msg), Err(DecodeError::MissingLinkStats { index: 5 }));
    }

    #[test]
    fn rejects_attribute_longer_than_message() {
        let mut payload = frames::if_stats_msg(2);
        payload.extend_from_slice(&400u16.to_ne_bytes());
        payload.extend_from_slice(&IFLA_STATS_LINK_64.to_ne_bytes());
        payload.extend_from_slice(&[0u8; 8]);
        let msg = frames::message(RTM_NEWSTATS, 0, 1, &payload);
        assert!(matches!(
            decode_message(&msg),
            Err(DecodeError::MalformedAttribute { declared: 400, .. })
        ));
    }

    #[test]
    fn rejects_attribute_shorter_than_its_header() {
        let mut payload = frames::if_stats_msg(2);
        payload.extend_from_slice(&2u16.to_ne_bytes());
        payload.extend_from_slice(&IFLA_STATS_LINK_64.to_ne_bytes());
        let msg = frames::message(RTM_NEWSTATS, 0, 1, &payload);
        assert!(matches!(
            decode_message(&msg),
            Err(DecodeError::MalformedAttribute { declared: 2, .. })
        ));
    }

    #[test]
    fn rejects_truncated_fixed_header() {
        let msg = frames::message(RTM_NEWSTATS, 0, 1, &[0u8; 6]);
        assert!(matches!(
            decode_message(&msg),
            Err(DecodeError::Truncated { what: "if_stats_msg", .. })
        ));
    }

    #[test]
    fn decodes_link_removal() {
        let msg = frames::link_notification(RTM_DELLINK, 4);
        assert_eq!(decode_message(&msg), Ok(Message::LinkRemoved(LinkRemoved { index: 4 })));
    }

    #[test]
    fn new_link_and_done_are_ignored() {
        assert_eq!(decode_message(&frames::link_notification(RTM_NEWLINK, 4)), Ok(Message::Ignored));
        assert_eq!(decode_message(&frames::done(1)), Ok(Message::Ignored));
        assert_eq!(decode_message(&frames::message(NLMSG_NOOP, 0, 1, &[])), Ok(Message::Ignored));
    }

    #[test]
    fn kernel_error_and_ack() {
        assert_eq!(decode_message(&frames::error(1, 0)), Ok(Message::Ignored));
        assert_eq!(decode_message(&frames::error(1, -libc::EPERM)), Err(DecodeError::Kernel(-libc::EPERM)));
        assert_eq!(decode_message(&frames::message(NLMSG_OVERRUN, 0, 1, &[])), Err(DecodeError::Overrun));
    }

    #[test]
    fn link_removal_with_non_positive_index_is_rejected() {
        for raw in [-1i32, i32::MIN, 0] {
            let mut payload = vec![0u8; IFINFOMSG_LEN];
            payload[4..8].copy_from_slice(&raw.to_ne_bytes());
            let msg = frames::message(RTM_DELLINK, 0, 0, &payload);
            assert_eq!(decode_message(&msg), Err(DecodeError::InvalidIndex(raw)));
        }
    }

    #[test]
    fn unexpected_type_is_an_error() {
        let msg = frames::message(24, 0, 1, &[0u8; 12]); // RTM_NEWROUTE
        assert_eq!(decode_message(&msg), Err(DecodeError::UnexpectedType(24)));
    }

    #[test]
    fn iterator_splits_multipart_datagram() {
        let datagram = frames::datagram(&[
            frames::stats_reply(1, &sample(1, 1, 1)),
            frames::stats_reply(1, &sample(2, 2, 2)),
            frames::done(1),
        ]);
        let msgs: Vec<_> = MessageIter::new(&datagram)
            .map(|m| decode_message(m.unwrap()).unwrap())
            .collect();
        assert_eq!(
            msgs,
            vec![
                Message::Stats(sample(1, 1, 1)),
                Message::Stats(sample(2, 2, 2)),
                Message::Ignored,
            ]
        );
    }

    #[test]
    fn iterator_stops_on_oversized_length() {
        let mut datagram = frames::stats_reply(1, &sample(1, 1, 1));
        let mut bad = frames::stats_reply(1, &sample(2, 2, 2));
        bad[0..4].copy_from_slice(&10_000u32.to_ne_bytes());
        datagram.extend_from_slice(&bad);

        let items: Vec<_> = MessageIter::new(&datagram).collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(DecodeError::BadMessageLength { declared: 10_000, .. })));
    }

    #[test]
    fn iterator_rejects_undersized_length() {
        let mut msg = frames::done(1);
        msg[0..4].copy_from_slice(&4u32.to_ne_bytes());
        let items: Vec<_> = MessageIter::new(&msg).collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(DecodeError::BadMessageLength { declared: 4, .. })));
    }

    #[test]
    fn every_truncation_of_a_reply_is_rejected_without_panicking() {
        let full = frames::stats_reply(1, &sample(2, 1000, 500));
        for cut in 0..full.len() {
            let buf = &full[..cut];
            let decoded: Vec<_> = MessageIter::new(buf)
                .map(|m| m.and_then(decode_message))
                .collect();
            assert!(decoded.iter().all(|r| r.is_err()), "cut at {cut} decoded {decoded:?}");
        }
    }
}
