use msh_types::JobSignal;
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::io::OutputMonitor;
use super::signal::{check_and_clear_sigint, send_to_group};
use super::state::{ExitInfo, WaitEvent};

const CAPTURE_TICK_MS: i32 = 100;

/// How a foreground wait ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ForegroundOutcome {
    /// The last stage is gone. `None` when it vanished without a status we saw.
    Finished(Option<ExitInfo>),
    /// The last stage was stopped (terminal stop key or a stop signal).
    Stopped,
}

impl ForegroundOutcome {
    pub fn status_code(&self) -> i32 {
        match self {
            ForegroundOutcome::Finished(Some(info)) => info.status_code(),
            ForegroundOutcome::Finished(None) => 1,
            ForegroundOutcome::Stopped => 128 + libc::SIGTSTP,
        }
    }

    /// The wait event this outcome stands for, to feed the job state machine.
    pub fn event(&self) -> WaitEvent {
        match self {
            ForegroundOutcome::Finished(Some(ExitInfo::Code(code))) => WaitEvent::Exited(*code),
            ForegroundOutcome::Finished(Some(ExitInfo::Signal(signal))) => {
                WaitEvent::Signaled(*signal)
            }
            ForegroundOutcome::Finished(None) => WaitEvent::Gone,
            ForegroundOutcome::Stopped => WaitEvent::Stopped(Signal::SIGTSTP),
        }
    }
}

pub fn wait_pid_job(pid: Pid, no_hang: bool) -> Option<WaitEvent> {
    let mut options = WaitPidFlag::WUNTRACED | WaitPidFlag::WCONTINUED;
    if no_hang {
        options |= WaitPidFlag::WNOHANG;
    }

    match waitpid(pid, Some(options)) {
        Ok(WaitStatus::Exited(_, code)) => {
            debug!("WAIT: {} exited with {}", pid, code);
            Some(WaitEvent::Exited(code))
        }
        Ok(WaitStatus::Signaled(_, signal, _)) => {
            debug!("WAIT: {} killed by {:?}", pid, signal);
            Some(WaitEvent::Signaled(signal))
        }
        Ok(WaitStatus::Stopped(_, signal)) => {
            debug!("WAIT: {} stopped by {:?}", pid, signal);
            Some(WaitEvent::Stopped(signal))
        }
        Ok(WaitStatus::Continued(_)) => Some(WaitEvent::Continued),
        Ok(WaitStatus::StillAlive) => None,
        Ok(other) => {
            debug!("WAIT: ignoring {:?} for {}", other, pid);
            None
        }
        Err(Errno::ECHILD) => {
            debug!("WAIT: {} is not our child any more", pid);
            Some(WaitEvent::Gone)
        }
        Err(Errno::EINTR) => None,
        Err(e) => {
            warn!("WAIT: waitpid({}) failed: {}", pid, e);
            None
        }
    }
}

/// Reaps whatever in `pids` has already ended, keeping the rest.
pub fn reap(pids: &mut Vec<Pid>) {
    pids.retain(|pid| {
        !matches!(
            wait_pid_job(*pid, true),
            Some(WaitEvent::Exited(_) | WaitEvent::Signaled(_) | WaitEvent::Gone)
        )
    });
}

/// Blocks until `last_pid` exits or stops, forwarding captured output and
/// passing a SIGINT received by the shell on to the whole group.
///
/// Other stages in `pending` are reaped opportunistically once the last stage
/// is done; anything still alive stays in `pending` for the caller.
pub fn wait_foreground(
    pgid: Pid,
    last_pid: Pid,
    pending: &mut Vec<Pid>,
    mut monitor: Option<&mut OutputMonitor>,
) -> std::io::Result<ForegroundOutcome> {
    let mut stdout = std::io::stdout();
    let outcome = loop {
        if check_and_clear_sigint() {
            debug!("WAIT: forwarding SIGINT to group {}", pgid);
            let _ = send_to_group(pgid, JobSignal::Interrupt);
        }

        let event = match monitor.as_deref_mut() {
            Some(m) if !m.is_closed() => {
                m.pump(&mut stdout, CAPTURE_TICK_MS)?;
                wait_pid_job(last_pid, true)
            }
            _ => wait_pid_job(last_pid, false),
        };

        match event {
            Some(WaitEvent::Exited(code)) => {
                break ForegroundOutcome::Finished(Some(ExitInfo::Code(code)));
            }
            Some(WaitEvent::Signaled(signal)) => {
                break ForegroundOutcome::Finished(Some(ExitInfo::Signal(signal)));
            }
            Some(WaitEvent::Gone) => break ForegroundOutcome::Finished(None),
            Some(WaitEvent::Stopped(_)) => break ForegroundOutcome::Stopped,
            Some(WaitEvent::Continued) | None => {}
        }
    };

    if let Some(m) = monitor {
        m.drain(&mut stdout)?;
    }
    pending.retain(|pid| *pid != last_pid);
    if let ForegroundOutcome::Finished(_) = outcome {
        reap(pending);
    }
    debug!("WAIT: group {} -> {:?}, {} unreaped", pgid, outcome, pending.len());
    Ok(outcome)
}
