use nix::sys::signal::Signal;
use std::fmt;

/// Signals the job controller knows how to deliver to a job's process group.
///
/// The core only ever talks in these terms; the platform number is looked up
/// at the point of delivery.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum JobSignal {
    Continue,
    Terminate,
    Stop,
    Kill,
    Interrupt,
}

impl JobSignal {
    pub fn to_signal(self) -> Signal {
        match self {
            JobSignal::Continue => Signal::SIGCONT,
            JobSignal::Terminate => Signal::SIGTERM,
            JobSignal::Stop => Signal::SIGSTOP,
            JobSignal::Kill => Signal::SIGKILL,
            JobSignal::Interrupt => Signal::SIGINT,
        }
    }

    /// Parse names the way `kill -s` accepts them: `TERM`, `SIGTERM`, `term` or a number.
    pub fn parse(name: &str) -> Option<Self> {
        if let Ok(num) = name.parse::<i32>() {
            return match Signal::try_from(num).ok()? {
                Signal::SIGCONT => Some(JobSignal::Continue),
                Signal::SIGTERM => Some(JobSignal::Terminate),
                Signal::SIGSTOP => Some(JobSignal::Stop),
                Signal::SIGKILL => Some(JobSignal::Kill),
                Signal::SIGINT => Some(JobSignal::Interrupt),
                _ => None,
            };
        }
        let upper = name.to_uppercase();
        match upper.strip_prefix("SIG").unwrap_or(&upper) {
            "CONT" => Some(JobSignal::Continue),
            "TERM" => Some(JobSignal::Terminate),
            "STOP" => Some(JobSignal::Stop),
            "KILL" => Some(JobSignal::Kill),
            "INT" => Some(JobSignal::Interrupt),
            _ => None,
        }
    }
}

impl fmt::Display for JobSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_signal().as_str())
    }
}
