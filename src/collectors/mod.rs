use std::os::fd::RawFd;

use tracing::{trace, warn};

use crate::error::TransportError;
use crate::model::Message;

pub mod decode;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod mock;

use decode::{MessageIter, decode_message};

/// The two kernel channels the collector talks to.
/// Implementations (NetlinkTransport, MockTransport) own their sockets or
/// queued datagrams; every drained datagram goes through [`decode_datagram`].
pub trait StatsTransport {
    /// Send one stats dump request. Does not wait for the replies.
    fn request_stats_dump(&mut self) -> Result<(), TransportError>;

    /// Read and decode everything currently queued on the request channel.
    /// Returns an empty batch when nothing is pending.
    fn drain_request_channel(&mut self) -> Batch;

    /// Read and decode everything currently queued on the event channel.
    fn drain_event_channel(&mut self) -> Batch;

    /// Descriptor to poll for event-channel readability, if there is one.
    fn event_fd(&self) -> Option<RawFd>;

    /// Release both channels. Safe to call more than once.
    fn close(&mut self);
}

/// Best-effort ifindex → name lookup.
pub trait NameResolver {
    /// Returns `None` when the index is not (or no longer) known.
    fn resolve(&self, index: u32) -> Option<String>;
}

/// Decoded messages from one drain, in arrival order.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Batch {
    pub messages: Vec<Message>,
    /// Messages dropped because they failed to decode.
    pub rejected: usize,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.rejected == 0
    }
}

/// Split a received datagram into messages and decode each one into `batch`.
///
/// Decode failures are logged and counted; they never stop the drain.
/// `Ignored` messages are dropped here since nothing downstream acts on them.
pub fn decode_datagram(buf: &[u8], channel: &'static str, batch: &mut Batch) {
    for framed in MessageIter::new(buf) {
        match framed.and_then(decode_message) {
            Ok(Message::Ignored) => trace!(channel, "ignored netlink message"),
            Ok(msg) => batch.messages.push(msg),
            Err(e) => {
                warn!(channel, error = %e, "dropping netlink message");
                batch.rejected += 1;
            }
        }
    }
}
