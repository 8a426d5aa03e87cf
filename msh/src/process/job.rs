use msh_types::{JobSignal, ShellError, ShellResult};
use nix::errno::Errno;
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::io::OutputMonitor;
use super::launch::Launched;
use super::signal::send_to_group;
use super::state::{ExitInfo, JobStatus};
use super::wait::{ForegroundOutcome, reap, wait_foreground, wait_pid_job};
use crate::shell::terminal::ShellTerminal;

/// A launched pipeline the shell keeps track of.
///
/// The id is 0 until the registry takes the job; foreground pipelines that
/// run to completion never get one.
#[derive(Debug)]
pub struct Job {
    pub id: usize,
    pub pgid: Pid,
    pub last_pid: Pid,
    /// Stage pids other than the last one that have not been reaped yet.
    pub pending: Vec<Pid>,
    pub command: String,
    pub status: JobStatus,
    pub exit_info: Option<ExitInfo>,
    pub reported: bool,
    pub monitor: Option<OutputMonitor>,
}

impl Job {
    pub fn new(launched: Launched, command: String) -> Self {
        let last_pid = launched.last_pid();
        let pending = launched
            .pids
            .into_iter()
            .filter(|pid| *pid != last_pid)
            .collect();
        Job {
            id: 0,
            pgid: launched.pgid,
            last_pid,
            pending,
            command,
            status: JobStatus::Running,
            exit_info: None,
            reported: false,
            monitor: launched.capture,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_finished()
    }

    /// Re-reads the job's state from the OS without blocking. Finished jobs
    /// are left alone. Returns whether the status changed.
    pub fn refresh(&mut self) -> bool {
        if self.is_finished() {
            return false;
        }
        if let Some(monitor) = self.monitor.as_mut() {
            if let Err(e) = monitor.drain(&mut std::io::stdout()) {
                warn!("job {}: dropping output capture: {}", self.id, e);
                self.monitor = None;
            }
        }
        reap(&mut self.pending);

        let event = wait_pid_job(self.last_pid, true);
        let (status, info) = self.status.transition(event);
        self.apply(status, info)
    }

    /// Records a new status. Returns whether it changed.
    pub(crate) fn apply(&mut self, status: JobStatus, info: Option<ExitInfo>) -> bool {
        if self.is_finished() {
            return false;
        }
        let changed = self.status != status;
        if changed {
            debug!(
                "job {} ({}) {} -> {}",
                self.id, self.command, self.status, status
            );
        }
        self.status = status;
        if info.is_some() {
            self.exit_info = info;
        }
        if status.is_finished() {
            if let Some(mut monitor) = self.monitor.take() {
                let _ = monitor.drain(&mut std::io::stdout());
            }
        }
        changed
    }

    /// Sends `signal` to the job's whole process group.
    pub fn signal(&self, signal: JobSignal) -> nix::Result<()> {
        send_to_group(self.pgid, signal)
    }

    /// Gives the job the terminal (when there is one), continues it if asked
    /// and waits until its last stage exits or stops. The terminal is back
    /// with the shell when this returns, on every path.
    ///
    /// The job's status is not touched; the caller decides what the outcome
    /// means for it.
    pub fn put_in_foreground(
        &mut self,
        terminal: Option<&ShellTerminal>,
        cont: bool,
    ) -> ShellResult<ForegroundOutcome> {
        let _hand_off = match terminal {
            Some(terminal) => Some(terminal.hand_off(self.pgid)?),
            None => None,
        };
        if cont {
            match self.signal(JobSignal::Continue) {
                Ok(()) => {}
                Err(Errno::ESRCH) => {
                    debug!("job {}: group {} already gone", self.id, self.pgid);
                }
                Err(e) => return Err(ShellError::Io(e.into())),
            }
        }
        let outcome = wait_foreground(
            self.pgid,
            self.last_pid,
            &mut self.pending,
            self.monitor.as_mut(),
        )?;
        if let ForegroundOutcome::Finished(_) = outcome {
            self.monitor = None;
        }
        Ok(outcome)
    }

    /// `[id]  pid  status  command`
    pub fn display_line(&self) -> String {
        format!(
            "[{}]  {}  {}  {}",
            self.id, self.pgid, self.status, self.command
        )
    }

    /// `[id]  status  command`, printed once when a job is seen finished.
    pub fn completion_line(&self) -> String {
        format!("[{}]  {}  {}", self.id, self.status, self.command)
    }
}
