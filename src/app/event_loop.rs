use std::io;
use std::os::fd::RawFd;
use std::time::Duration;

use crate::error::TransportError;

/// Wait up to `timeout` for `fd` to become readable.
///
/// Returns `Ok(false)` on timeout or when a signal interrupts the wait, so the
/// caller re-checks its quit flag and schedule. Without a descriptor this is a
/// plain sleep.
pub fn wait_readable(fd: Option<RawFd>, timeout: Duration) -> Result<bool, TransportError> {
    let Some(fd) = fd else {
        std::thread::sleep(timeout);
        return Ok(false);
    };

    // Round up so a sub-millisecond remainder does not spin.
    let timeout_ms = timeout.as_micros().div_ceil(1000).min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd { fd, events: libc::POLLIN, revents: 0 };

    // SAFETY: pfd is a single valid pollfd for the duration of the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(TransportError::Poll(err));
    }

    // POLLERR/POLLHUP also count: the following recv reports the condition.
    Ok(rc > 0 && pfd.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
}

#[cfg(test)]
mod tests {
    use std::os::fd::AsRawFd;
    use std::os::unix::net::UnixDatagram;
    use std::time::{Duration, Instant};

    use super::wait_readable;

    #[test]
    fn times_out_when_nothing_is_pending() {
        let (a, _b) = UnixDatagram::pair().unwrap();
        let start = Instant::now();
        assert!(!wait_readable(Some(a.as_raw_fd()), Duration::from_millis(20)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn reports_pending_data() {
        let (a, b) = UnixDatagram::pair().unwrap();
        b.send(b"x").unwrap();
        assert!(wait_readable(Some(a.as_raw_fd()), Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn missing_descriptor_just_sleeps() {
        assert!(!wait_readable(None, Duration::from_millis(1)).unwrap());
    }
}
