//! Readiness notification descriptor (epoll).

use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};

use crate::status::{LbError, LbResult};

const MAX_EVENTS: usize = 64;

/// An epoll instance. Closed on drop.
#[derive(Debug)]
pub struct Poller {
    fd: OwnedFd,
}

impl Poller {
    /// Open a close-on-exec epoll descriptor.
    pub fn new() -> LbResult<Self> {
        // SAFETY: plain syscall; the result is checked before use.
        let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if fd < 0 {
            return Err(LbError::last_os("epoll_create1"));
        }
        // SAFETY: `fd` is a freshly created descriptor nobody else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    /// Watch `fd` for readability, reporting `token` when it fires.
    pub fn register(&self, fd: RawFd, token: u64) -> LbResult<()> {
        let mut event = libc::epoll_event {
            events: libc::EPOLLIN as u32,
            u64: token,
        };
        // SAFETY: both descriptors are valid and `event` outlives the call.
        let rc = unsafe { libc::epoll_ctl(self.fd.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event) };
        if rc != 0 {
            return Err(LbError::last_os("epoll_ctl(ADD)"));
        }
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> LbResult<()> {
        // SAFETY: a null event is allowed for EPOLL_CTL_DEL since Linux 2.6.9.
        let rc = unsafe {
            libc::epoll_ctl(self.fd.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        };
        if rc != 0 {
            return Err(LbError::last_os("epoll_ctl(DEL)"));
        }
        Ok(())
    }

    /// Wait up to `timeout_ms` (-1 blocks, 0 polls) and append the tokens of
    /// ready descriptors to `tokens`. Returns how many were appended.
    ///
    /// An interrupted wait reports zero events.
    pub fn wait(&self, tokens: &mut Vec<u64>, timeout_ms: i32) -> LbResult<usize> {
        let mut events = [libc::epoll_event { events: 0, u64: 0 }; MAX_EVENTS];
        // SAFETY: `events` is a writable buffer of MAX_EVENTS entries.
        let n = unsafe {
            libc::epoll_wait(
                self.fd.as_raw_fd(),
                events.as_mut_ptr(),
                MAX_EVENTS as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(LbError::system("epoll_wait", err));
        }

        let n = n as usize;
        tokens.try_reserve(n)?;
        tokens.extend(events[..n].iter().map(|e| e.u64));
        Ok(n)
    }
}

impl AsRawFd for Poller {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::os::unix::net::UnixStream;

    #[test]
    fn reports_ready_token() {
        let poller = Poller::new().unwrap();
        let (mut a, b) = UnixStream::pair().unwrap();
        poller.register(b.as_raw_fd(), 42).unwrap();

        let mut tokens = Vec::new();
        assert_eq!(poller.wait(&mut tokens, 0).unwrap(), 0);

        a.write_all(b"x").unwrap();
        assert_eq!(poller.wait(&mut tokens, 1000).unwrap(), 1);
        assert_eq!(tokens, [42]);

        poller.deregister(b.as_raw_fd()).unwrap();
        tokens.clear();
        assert_eq!(poller.wait(&mut tokens, 0).unwrap(), 0);
    }

    #[test]
    fn register_bad_fd_fails() {
        let poller = Poller::new().unwrap();
        let err = poller.register(-1, 0).unwrap_err();
        assert_eq!(err.errno(), Some(libc::EBADF));
    }

    #[test]
    fn deregister_unregistered_fd_fails() {
        let poller = Poller::new().unwrap();
        let (_a, b) = UnixStream::pair().unwrap();
        let err = poller.deregister(b.as_raw_fd()).unwrap_err();
        assert_eq!(err.errno(), Some(libc::ENOENT));
    }
}
