use libc::STDIN_FILENO;
use msh_types::{ShellError, ShellResult};
use nix::sys::termios::{SetArg, Termios, tcsetattr};
use nix::unistd::{Pid, tcsetpgrp};
use std::os::unix::io::RawFd;
use tracing::{debug, error};

pub const SHELL_TERMINAL_FD: RawFd = STDIN_FILENO;

/// The controlling terminal as the shell sees it: which fd, which group the
/// shell runs in and the modes to put back when the shell gets it back.
#[derive(Debug, Clone)]
pub struct ShellTerminal {
    fd: RawFd,
    shell_pgid: Pid,
    tmodes: Option<Termios>,
}

impl ShellTerminal {
    pub fn new(fd: RawFd, shell_pgid: Pid, tmodes: Option<Termios>) -> Self {
        ShellTerminal {
            fd,
            shell_pgid,
            tmodes,
        }
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn give_to(&self, pgid: Pid) -> ShellResult<()> {
        debug!("TERMINAL: giving fd {} to group {}", self.fd, pgid);
        tcsetpgrp(self.fd, pgid).map_err(ShellError::TerminalControlFailure)
    }

    pub fn reclaim(&self) -> ShellResult<()> {
        debug!("TERMINAL: reclaiming fd {} for group {}", self.fd, self.shell_pgid);
        tcsetpgrp(self.fd, self.shell_pgid).map_err(ShellError::TerminalControlFailure)?;
        if let Some(tmodes) = &self.tmodes {
            tcsetattr(self.fd, SetArg::TCSADRAIN, tmodes)
                .map_err(ShellError::TerminalControlFailure)?;
        }
        Ok(())
    }

    /// Gives the terminal to `pgid` until the returned guard is dropped.
    pub fn hand_off(&self, pgid: Pid) -> ShellResult<TerminalHandOff<'_>> {
        if let Err(e) = self.give_to(pgid) {
            if let Err(reclaim) = self.reclaim() {
                error!("TERMINAL: reclaim after failed hand-off: {}", reclaim);
            }
            return Err(e);
        }
        Ok(TerminalHandOff { terminal: self })
    }
}

/// Puts the terminal back in the shell's hands on drop.
pub struct TerminalHandOff<'a> {
    terminal: &'a ShellTerminal,
}

impl Drop for TerminalHandOff<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.reclaim() {
            error!("TERMINAL: failed to reclaim terminal: {}", e);
        }
    }
}
