use nix::sys::termios::tcgetattr;
use nix::unistd::{Pid, isatty, tcgetpgrp};
use std::os::unix::io::RawFd;
use tracing::{debug, warn};

/// What the shell's input descriptor turned out to be at start-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    /// A pipe, a file or `/dev/null`.
    Detached,
    /// A terminal, but not one whose modes or foreground group we can use.
    Unusable,
    /// Our controlling terminal. `owner` is its foreground process group.
    Controlling { owner: Pid },
}

impl TerminalState {
    pub fn detect(fd: RawFd) -> Self {
        if !isatty(fd).unwrap_or(false) {
            debug!("fd {} is not a terminal", fd);
            return TerminalState::Detached;
        }
        if let Err(err) = tcgetattr(fd) {
            warn!("no terminal modes for fd {}: {}", fd, err);
            return TerminalState::Unusable;
        }
        match tcgetpgrp(fd) {
            Ok(owner) => {
                debug!("fd {} is a controlling terminal owned by {}", fd, owner);
                TerminalState::Controlling { owner }
            }
            Err(err) => {
                warn!("fd {} is not our controlling terminal: {}", fd, err);
                TerminalState::Unusable
            }
        }
    }

    pub fn non_terminal() -> Self {
        TerminalState::Detached
    }

    /// Job control needs a controlling terminal.
    pub fn can_control_jobs(&self) -> bool {
        matches!(self, TerminalState::Controlling { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipes_are_detached() {
        let (read, write) = nix::unistd::pipe().unwrap();
        let state = TerminalState::detect(read);
        assert_eq!(TerminalState::Detached, state);
        assert!(!state.can_control_jobs());
        nix::unistd::close(read).ok();
        nix::unistd::close(write).ok();
    }

    #[test]
    fn only_a_controlling_terminal_allows_job_control() {
        assert!(!TerminalState::non_terminal().can_control_jobs());
        assert!(!TerminalState::Unusable.can_control_jobs());
        let owner = nix::unistd::getpgrp();
        assert!(TerminalState::Controlling { owner }.can_control_jobs());
    }
}
