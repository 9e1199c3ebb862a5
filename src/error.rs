use std::io;

use thiserror::Error;

/// Failures of the netlink sockets themselves.
///
/// Setup variants are fatal: the collector cannot run without both channels.
/// `Send` and `Recv` are per-cycle and get logged by the caller.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to create {channel} netlink socket: {source}")]
    Socket { channel: &'static str, source: io::Error },

    #[error("failed to bind {channel} netlink socket: {source}")]
    Bind { channel: &'static str, source: io::Error },

    #[error("failed to subscribe to link notifications: {0}")]
    Subscribe(io::Error),

    #[error("failed to send stats dump request: {0}")]
    Send(io::Error),

    #[error("short send of stats dump request ({sent} of {expected} bytes)")]
    ShortSend { sent: usize, expected: usize },

    #[error("failed to receive from {channel} netlink socket: {source}")]
    Recv { channel: &'static str, source: io::Error },

    #[error("failed to wait for netlink readiness: {0}")]
    Poll(io::Error),
}

impl TransportError {
    /// True for errors raised while opening the channels.
    pub fn is_setup(&self) -> bool {
        matches!(
            self,
            TransportError::Socket { .. } | TransportError::Bind { .. } | TransportError::Subscribe(_)
        )
    }
}

/// Why a single netlink message was rejected. The message is dropped and the
/// drain moves on to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated {what}: need {needed} bytes, have {available}")]
    Truncated { what: &'static str, needed: usize, available: usize },

    #[error("message length {declared} is invalid for a {available}-byte buffer")]
    BadMessageLength { declared: u32, available: usize },

    #[error("unexpected netlink message type {0}")]
    UnexpectedType(u16),

    #[error("malformed attribute at offset {offset}: declared length {declared}")]
    MalformedAttribute { offset: usize, declared: u16 },

    #[error("stats reply for ifindex {index} carries no 64-bit link stats")]
    MissingLinkStats { index: u32 },

    #[error("64-bit link stats payload is {actual} bytes, not a known layout")]
    StatsLengthMismatch { actual: usize },

    #[error("link notification carries invalid ifindex {0}")]
    InvalidIndex(i32),

    #[error("kernel returned error {0}")]
    Kernel(i32),

    #[error("netlink receive buffer overrun")]
    Overrun,
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{DecodeError, TransportError};

    #[test]
    fn setup_errors_are_classified() {
        let err = TransportError::Subscribe(io::Error::from_raw_os_error(libc::EPERM));
        assert!(err.is_setup());
        let err = TransportError::Send(io::Error::from_raw_os_error(libc::ENOBUFS));
        assert!(!err.is_setup());
    }

    #[test]
    fn decode_error_messages_name_the_problem() {
        let err = DecodeError::StatsLengthMismatch { actual: 12 };
        assert_eq!(err.to_string(), "64-bit link stats payload is 12 bytes, not a known layout");
        let err = DecodeError::Kernel(-22);
        assert_eq!(err.to_string(), "kernel returned error -22");
    }
}
