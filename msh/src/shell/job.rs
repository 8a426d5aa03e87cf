use msh_types::{JobSignal, ShellError, ShellResult};
use nix::errno::Errno;
use tracing::debug;

use crate::process::{ForegroundOutcome, Job, JobStatus};
use crate::shell::Shell;

/// What came of putting a job back in the foreground.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resumed {
    pub status: i32,
    /// `Stopped: <command>` when the job was stopped again.
    pub notice: Option<String>,
}

/// One line per job, `[id]  pid  status  command`. Jobs that the
/// reconciliation pass just saw finish are listed first, one last time.
pub fn list_jobs(shell: &mut Shell) -> Vec<String> {
    let finished = shell.jobs.reconcile_all();
    let mut lines: Vec<String> = finished.iter().map(Job::display_line).collect();
    lines.extend(shell.jobs.jobs().map(Job::display_line));
    if lines.is_empty() {
        lines.push("No active jobs.".to_string());
    }
    lines
}

/// Gives job `id` the terminal, continues it and waits for its last stage to
/// exit or stop again.
///
/// The group is always continued: a stop may have been delivered that no
/// reconciliation has seen yet, and continuing a running group is a no-op.
pub fn bring_to_foreground(shell: &mut Shell, id: usize) -> ShellResult<Resumed> {
    let terminal = shell.terminal.as_ref();
    let job = shell.jobs.lookup_mut(id)?;
    let command = job.command.clone();
    debug!("fg: [{}] {} (was {})", id, command, job.status);

    let outcome = job.put_in_foreground(terminal, true)?;
    shell.jobs.update(id, JobStatus::Running, None)?;
    let (status, info) = JobStatus::Running.transition(Some(outcome.event()));
    shell.jobs.update(id, status, info)?;

    let notice = match outcome {
        ForegroundOutcome::Stopped => Some(format!("Stopped: {command}")),
        ForegroundOutcome::Finished(_) => {
            shell.jobs.mark_reported(id);
            None
        }
    };
    Ok(Resumed {
        status: outcome.status_code(),
        notice,
    })
}

/// Delivers `signal` to every process of job `id`.
pub fn send_signal(shell: &mut Shell, id: usize, signal: JobSignal) -> ShellResult<String> {
    let job = shell.jobs.lookup(id)?;
    match job.signal(signal) {
        Ok(()) => {
            match signal {
                JobSignal::Continue => {
                    shell.jobs.update(id, JobStatus::Running, None)?;
                }
                JobSignal::Stop => {
                    shell.jobs.update(id, JobStatus::Stopped, None)?;
                }
                _ => {}
            }
            Ok(format!("Sent signal {signal} to job {id}."))
        }
        Err(Errno::ESRCH) => {
            shell.jobs.update(id, JobStatus::Terminated, None)?;
            shell.jobs.mark_reported(id);
            Ok(format!("Process for job {id} not found."))
        }
        Err(e) => Err(ShellError::Io(e.into())),
    }
}

/// Called on the way out: every remaining group gets SIGTERM.
pub fn terminate_background_jobs(shell: &mut Shell) {
    shell.jobs.terminate_all();
}
