use nix::sys::signal::Signal;

/// What `waitpid` told us about one process.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum WaitEvent {
    Exited(i32),
    Signaled(Signal),
    Stopped(Signal),
    Continued,
    /// The kernel no longer knows the pid as our child (already reaped or never ours).
    Gone,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExitInfo {
    Code(i32),
    Signal(Signal),
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitInfo::Code(code) => write!(f, "exit {code}"),
            ExitInfo::Signal(signal) => write!(f, "{}", signal.as_str()),
        }
    }
}

impl ExitInfo {
    /// Shell-style status number: the exit code, or 128 + signal number.
    pub fn status_code(&self) -> i32 {
        match self {
            ExitInfo::Code(code) => *code,
            ExitInfo::Signal(signal) => 128 + *signal as i32,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum JobStatus {
    Running,
    Stopped,
    Done,
    Terminated,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Terminated)
    }

    /// Next status after observing `event` on the job's last process.
    ///
    /// Finished jobs never move again; `None` from the OS keeps the current status.
    pub fn transition(self, event: Option<WaitEvent>) -> (JobStatus, Option<ExitInfo>) {
        if self.is_finished() {
            return (self, None);
        }
        match event {
            None => (self, None),
            Some(WaitEvent::Stopped(_)) => (JobStatus::Stopped, None),
            Some(WaitEvent::Continued) => (JobStatus::Running, None),
            Some(WaitEvent::Exited(0)) => (JobStatus::Done, Some(ExitInfo::Code(0))),
            Some(WaitEvent::Exited(code)) => (JobStatus::Terminated, Some(ExitInfo::Code(code))),
            Some(WaitEvent::Signaled(signal)) => {
                (JobStatus::Terminated, Some(ExitInfo::Signal(signal)))
            }
            Some(WaitEvent::Gone) => (JobStatus::Terminated, None),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            JobStatus::Running => formatter.write_str("Running"),
            JobStatus::Stopped => formatter.write_str("Stopped"),
            JobStatus::Done => formatter.write_str("Done"),
            JobStatus::Terminated => formatter.write_str("Terminated"),
        }
    }
}
