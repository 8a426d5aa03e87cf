use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, poll};
use nix::unistd::{pipe2, read};
use std::io::Write;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use tracing::debug;

const READ_CHUNK: usize = 4096;

/// A close-on-exec pipe as `(read, write)`. Both ends close when dropped.
pub(crate) fn pipe_cloexec() -> nix::Result<(OwnedFd, OwnedFd)> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC)?;
    // SAFETY: pipe2 just handed us two fresh descriptors nobody else owns.
    Ok(unsafe { (OwnedFd::from_raw_fd(read), OwnedFd::from_raw_fd(write)) })
}

/// Read end of a foreground pipeline's captured stdout. Bytes are forwarded
/// unchanged to the shell's own stdout.
#[derive(Debug)]
pub struct OutputMonitor {
    fd: OwnedFd,
    closed: bool,
    forwarded: usize,
}

impl OutputMonitor {
    pub fn new(fd: OwnedFd) -> Self {
        OutputMonitor {
            fd,
            closed: false,
            forwarded: 0,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    /// Waits up to `timeout_ms` for output and forwards one chunk of it.
    /// Returns `false` once every writer has closed the pipe.
    pub fn pump<W: Write>(&mut self, out: &mut W, timeout_ms: i32) -> std::io::Result<bool> {
        if self.closed {
            return Ok(false);
        }
        let mut fds = [PollFd::new(self.fd.as_raw_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, timeout_ms) {
            Ok(0) | Err(Errno::EINTR) => return Ok(true),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        let ready = fds[0]
            .revents()
            .is_some_and(|r| r.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR));
        if !ready {
            return Ok(true);
        }

        let mut buf = [0u8; READ_CHUNK];
        match read(self.fd.as_raw_fd(), &mut buf) {
            Ok(0) => {
                debug!("capture: end of output after {} bytes", self.forwarded);
                self.closed = true;
                Ok(false)
            }
            Ok(n) => {
                out.write_all(&buf[..n])?;
                out.flush()?;
                self.forwarded += n;
                Ok(true)
            }
            Err(Errno::EINTR) => Ok(true),
            Err(e) => Err(e.into()),
        }
    }

    /// Forwards whatever is already buffered without waiting for more. A
    /// writer that outlived the pipeline (a daemonized grandchild) cannot
    /// block the shell here.
    pub fn drain<W: Write>(&mut self, out: &mut W) -> std::io::Result<()> {
        while !self.closed {
            let before = self.forwarded;
            if !self.pump(out, 0)? || self.forwarded == before {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::write;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    #[test]
    fn pipe_ends_are_cloexec() {
        init();
        let (r, w) = pipe_cloexec().unwrap();
        for fd in [r.as_raw_fd(), w.as_raw_fd()] {
            let flags = nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_GETFD).unwrap();
            assert_ne!(0, flags & libc::FD_CLOEXEC);
        }
    }

    #[test]
    fn forwards_bytes_verbatim() {
        init();
        let (r, w) = pipe_cloexec().unwrap();
        write(w.as_raw_fd(), b"no newline\x1b[1m").unwrap();
        drop(w);

        let mut monitor = OutputMonitor::new(r);
        let mut out = Vec::new();
        while monitor.pump(&mut out, 100).unwrap() {}
        assert_eq!(b"no newline\x1b[1m".to_vec(), out);
        assert!(monitor.is_closed());
        assert_eq!(out.len(), monitor.forwarded());
    }

    #[test]
    fn drain_does_not_block_on_open_writer() {
        init();
        let (r, w) = pipe_cloexec().unwrap();
        write(w.as_raw_fd(), b"partial").unwrap();

        let mut monitor = OutputMonitor::new(r);
        let mut out = Vec::new();
        monitor.drain(&mut out).unwrap();
        assert_eq!(b"partial".to_vec(), out);
        assert!(!monitor.is_closed());
        drop(w);
    }
}
