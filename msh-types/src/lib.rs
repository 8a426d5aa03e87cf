use anyhow::Result;
use libc::{STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use nix::unistd::Pid;
use std::fs::File;
use std::io::Write;
use std::mem::ManuallyDrop;
use std::os::unix::io::FromRawFd;
use std::os::unix::io::RawFd;
use thiserror::Error;

pub mod signal;
pub mod terminal;
pub use signal::JobSignal;
pub use terminal::TerminalState;

/// Everything that can go wrong while turning a line into processes or while
/// operating on jobs. None of these end the shell; they are printed and the
/// input loop carries on.
#[derive(Error, Debug)]
pub enum ShellError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("{path}: {source}")]
    Redirection {
        path: String,
        source: std::io::Error,
    },

    #[error("syntax error: missing file name after '{0}'")]
    MissingRedirectTarget(&'static str),

    #[error("empty command")]
    EmptyCommand,

    #[error("command not found: {0}")]
    CommandNotFound(String),

    #[error("failed to start {cmd}: {source}")]
    SpawnFailure {
        cmd: String,
        source: std::io::Error,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {0} is already finished.")]
    JobAlreadyFinished(usize),

    #[error("failed to hand over the terminal: {0}")]
    TerminalControlFailure(nix::Error),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ShellError {
    pub fn spawn(cmd: &str, err: impl Into<std::io::Error>) -> Self {
        ShellError::SpawnFailure {
            cmd: cmd.to_string(),
            source: err.into(),
        }
    }
}

pub type ShellResult<T> = std::result::Result<T, ShellError>;

#[derive(Debug, Clone)]
pub struct Context {
    pub shell_pid: Pid,
    pub shell_pgid: Pid,
    pub terminal_state: TerminalState,
    pub interactive: bool,
    pub outfile: RawFd,
    pub errfile: RawFd,
    pub save_history: bool,
}

impl Context {
    pub fn new(shell_pid: Pid, shell_pgid: Pid) -> Self {
        let terminal_state = TerminalState::detect(STDIN_FILENO);
        let interactive = terminal_state.can_control_jobs();
        Context {
            shell_pid,
            shell_pgid,
            terminal_state,
            interactive,
            outfile: STDOUT_FILENO,
            errfile: STDERR_FILENO,
            save_history: true,
        }
    }

    /// A context that never touches the terminal, used for `-c` and piped input.
    pub fn non_interactive(shell_pid: Pid, shell_pgid: Pid) -> Self {
        Context {
            shell_pid,
            shell_pgid,
            terminal_state: TerminalState::non_terminal(),
            interactive: false,
            outfile: STDOUT_FILENO,
            errfile: STDERR_FILENO,
            save_history: false,
        }
    }
}

impl Context {
    pub fn write_stdout(&self, msg: &str) -> Result<()> {
        write_line(self.outfile, msg)
    }

    pub fn write_stderr(&self, msg: &str) -> Result<()> {
        write_line(self.errfile, msg)
    }
}

/// Writes `msg` and a newline to a descriptor the context only borrows.
fn write_line(fd: RawFd, msg: &str) -> Result<()> {
    let mut file = ManuallyDrop::new(unsafe { File::from_raw_fd(fd) });
    writeln!(file, "{msg}")?;
    Ok(())
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExitStatus {
    ExitedWith(i32),
}

impl ExitStatus {
    pub fn code(&self) -> i32 {
        match self {
            ExitStatus::ExitedWith(code) => *code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_match_job_builtin_output() {
        assert_eq!(
            "Job 1 is already finished.",
            ShellError::JobAlreadyFinished(1).to_string()
        );
        assert_eq!(
            "Job not found: 7",
            ShellError::JobNotFound("7".to_string()).to_string()
        );
        assert_eq!(
            "command not found: badcommand123",
            ShellError::CommandNotFound("badcommand123".to_string()).to_string()
        );
    }

    #[test]
    fn redirection_error_names_the_path() {
        let err = ShellError::Redirection {
            path: "/no/such/file".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().starts_with("/no/such/file: "));
    }

    #[test]
    fn write_stdout_to_pipe() {
        let (read, write) = nix::unistd::pipe().unwrap();
        let mut ctx = Context::non_interactive(nix::unistd::getpid(), nix::unistd::getpgrp());
        ctx.outfile = write;
        ctx.write_stdout("hello").unwrap();
        nix::unistd::close(write).unwrap();

        let mut buf = [0u8; 16];
        let n = nix::unistd::read(read, &mut buf).unwrap();
        assert_eq!(b"hello\n", &buf[..n]);
        nix::unistd::close(read).ok();
    }
}
