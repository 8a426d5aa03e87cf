pub mod eval;
pub mod job;
pub mod registry;
pub mod terminal;

use crate::config::Config;
use crate::history::History;
use crate::process::signal::{ignore_job_control_signals, install_sigint_handler};
use anyhow::{Context as _, Result};
use msh_types::{Context, ExitStatus};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::sys::termios::tcgetattr;
use nix::unistd::{Pid, getpgrp, getpid, setpgid, tcgetpgrp, tcsetpgrp};
use std::io::Write;
use tracing::{debug, warn};

pub use registry::JobRegistry;
pub use terminal::{SHELL_TERMINAL_FD, ShellTerminal};

pub struct Shell {
    pub pid: Pid,
    pub pgid: Pid,
    /// Set once the shell owns the controlling terminal.
    pub terminal: Option<ShellTerminal>,
    pub(crate) jobs: JobRegistry,
    pub config: Config,
    pub history: History,
    pub exited: Option<ExitStatus>,
    pub last_status: i32,
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("pid", &self.pid)
            .field("pgid", &self.pgid)
            .field("jobs", &self.jobs.len())
            .finish()
    }
}

impl Drop for Shell {
    fn drop(&mut self) {
        job::terminate_background_jobs(self);
    }
}

impl Shell {
    pub fn new(config: Config, history: History) -> Self {
        Shell {
            pid: getpid(),
            pgid: getpgrp(),
            terminal: None,
            jobs: JobRegistry::new(),
            config,
            history,
            exited: None,
            last_status: 0,
        }
    }

    pub fn set_signals(&mut self) {
        if let Err(e) = install_sigint_handler() {
            warn!("Failed to install SIGINT handler: {}", e);
        }
        if let Err(e) = ignore_job_control_signals() {
            warn!("Failed to ignore job control signals: {}", e);
        }
        debug!("Signal handlers setup completed");
    }

    /// Puts the shell in its own process group in the foreground of the
    /// controlling terminal. Waits (stopped by SIGTTIN) while some other
    /// group holds the terminal.
    pub fn take_terminal(&mut self, ctx: &mut Context) -> Result<()> {
        let fd = SHELL_TERMINAL_FD;
        loop {
            let owner = tcgetpgrp(fd).context("failed to read terminal owner")?;
            if owner == getpgrp() {
                break;
            }
            debug!("terminal owned by {}, waiting", owner);
            killpg(getpgrp(), Signal::SIGTTIN).context("failed to stop for the terminal")?;
        }

        self.set_signals();

        match setpgid(self.pid, self.pid) {
            // a session leader already leads its group
            Ok(()) | Err(Errno::EPERM) => {}
            Err(e) => return Err(e).context("failed to create the shell's process group"),
        }
        self.pgid = getpgrp();
        tcsetpgrp(fd, self.pgid).context("failed to take the terminal")?;

        let tmodes = tcgetattr(fd).ok();
        self.terminal = Some(ShellTerminal::new(fd, self.pgid, tmodes));
        ctx.shell_pgid = self.pgid;
        debug!("shell {} owns the terminal as group {}", self.pid, self.pgid);
        Ok(())
    }

    pub fn print_error(&self, msg: String) {
        eprintln!("msh: {msg}");
        std::io::stderr().flush().ok();
    }

    pub fn exit(&mut self, code: i32) {
        debug!("exit requested with {}", code);
        self.exited = Some(ExitStatus::ExitedWith(code));
    }

    /// One reconciliation pass. Returns `[id]  Done  command` lines for the
    /// jobs seen finished.
    pub fn check_job_state(&mut self) -> Vec<String> {
        self.jobs
            .reconcile_all()
            .iter()
            .map(|job| job.completion_line())
            .collect()
    }
}
