use msh_types::{ShellError, ShellResult};
use nix::errno::Errno;
use nix::fcntl::{FcntlArg, FdFlag, fcntl};
use nix::sys::signal::{Signal, killpg};
use nix::unistd::{ForkResult, Pid, dup2, fork, getpid, setpgid, tcsetpgrp};
use std::ffi::CString;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use tracing::{debug, error, warn};

use super::io::{OutputMonitor, pipe_cloexec};
use super::pipeline::{InputSource, OutputSink, Pipeline, plan_io};
use super::signal::reset_job_control_signals;
use super::state::WaitEvent;
use super::wait::wait_pid_job;
use crate::shell::terminal::ShellTerminal;

const EXEC_FAILURE: i32 = 126;

pub struct LaunchOptions<'a> {
    pub foreground: bool,
    pub capture_output: bool,
    /// Present only when the shell controls a terminal.
    pub terminal: Option<&'a ShellTerminal>,
}

/// A started pipeline: one process group, pids in stage order.
#[derive(Debug)]
pub struct Launched {
    pub pgid: Pid,
    pub pids: Vec<Pid>,
    pub capture: Option<OutputMonitor>,
}

impl Launched {
    pub fn last_pid(&self) -> Pid {
        self.pids.last().copied().unwrap_or(self.pgid)
    }
}

/// Everything a child needs, built before `fork` so the child only calls
/// async-signal-safe functions.
struct ExecImage {
    path: CString,
    argv: Vec<CString>,
    failure_message: Vec<u8>,
}

impl ExecImage {
    fn resolve(argv: &[String]) -> ShellResult<Self> {
        let name = &argv[0];
        let path = which::which(name).map_err(|_| ShellError::CommandNotFound(name.clone()))?;
        debug!("LAUNCH: resolved {} -> {}", name, path.display());
        let path = CString::new(path.as_os_str().as_encoded_bytes())
            .map_err(|e| ShellError::spawn(name, std::io::Error::other(e)))?;
        let argv = argv
            .iter()
            .map(|arg| CString::new(arg.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| ShellError::spawn(name, std::io::Error::other(e)))?;
        let failure_message = format!("msh: {name}: cannot execute\n").into_bytes();
        Ok(ExecImage {
            path,
            argv,
            failure_message,
        })
    }
}

/// Starts every stage of `pipeline` in one new process group led by stage 0.
///
/// If a later stage cannot be started, the stages already running are
/// killed and reaped before the error is returned.
pub fn launch(pipeline: Pipeline, opts: &LaunchOptions) -> ShellResult<Launched> {
    let capture = opts.foreground && opts.capture_output;
    let plan = plan_io(pipeline.stages(), capture);
    let take_terminal = match opts.terminal {
        Some(terminal) if opts.foreground => Some(terminal.fd()),
        _ => None,
    };
    let last = plan.len().saturating_sub(1);

    let mut pgid: Option<Pid> = None;
    let mut pids: Vec<Pid> = Vec::with_capacity(plan.len());
    let mut monitor: Option<OutputMonitor> = None;
    let mut upstream: Option<OwnedFd> = None;

    for (i, (stage, wiring)) in pipeline.into_stages().into_iter().zip(plan).enumerate() {
        let (argv, in_file, out_file) = stage.into_parts();
        let pipe_in = upstream.take();

        let image = match ExecImage::resolve(&argv) {
            Ok(image) => image,
            Err(e) => {
                abort_spawned(pgid, &pids, opts);
                return Err(e);
            }
        };

        let stdin: Option<OwnedFd> = match wiring.input {
            InputSource::File(_) => in_file.map(OwnedFd::from),
            InputSource::Pipe => pipe_in,
            InputSource::Inherited => None,
        };

        let stdout: Option<OwnedFd> = if i < last {
            let (read, write) = match pipe_cloexec() {
                Ok(ends) => ends,
                Err(e) => {
                    abort_spawned(pgid, &pids, opts);
                    return Err(ShellError::spawn(&argv[0], e));
                }
            };
            upstream = Some(read);
            match wiring.output {
                // the next stage reads a pipe nobody writes to
                OutputSink::File(_) => out_file.map(OwnedFd::from),
                _ => Some(write),
            }
        } else {
            match wiring.output {
                OutputSink::File(_) => out_file.map(OwnedFd::from),
                OutputSink::Capture => match pipe_cloexec() {
                    Ok((read, write)) => {
                        monitor = Some(OutputMonitor::new(read));
                        Some(write)
                    }
                    Err(e) => {
                        abort_spawned(pgid, &pids, opts);
                        return Err(ShellError::spawn(&argv[0], e));
                    }
                },
                _ => None,
            }
        };

        let stdin_fd = stdin.as_ref().map(|fd| fd.as_raw_fd());
        let stdout_fd = stdout.as_ref().map(|fd| fd.as_raw_fd());
        let argv_ptrs: Vec<*const libc::c_char> = image
            .argv
            .iter()
            .map(|arg| arg.as_ptr())
            .chain(std::iter::once(std::ptr::null()))
            .collect();

        debug!(
            "LAUNCH: stage {} {:?} stdin={:?} stdout={:?} pgid={:?}",
            i, argv, stdin_fd, stdout_fd, pgid
        );
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                let terminal = if pgid.is_none() { take_terminal } else { None };
                exec_stage(&image, &argv_ptrs, pgid, stdin_fd, stdout_fd, terminal);
            }
            Ok(ForkResult::Parent { child }) => {
                let group = *pgid.get_or_insert(child);
                match setpgid(child, group) {
                    Ok(()) | Err(Errno::EACCES) | Err(Errno::ESRCH) => {}
                    Err(e) => warn!("LAUNCH: setpgid({}, {}) failed: {}", child, group, e),
                }
                debug!("LAUNCH: stage {} started as {} in group {}", i, child, group);
                pids.push(child);
            }
            Err(e) => {
                error!("LAUNCH: fork failed for {:?}: {}", argv, e);
                abort_spawned(pgid, &pids, opts);
                return Err(ShellError::spawn(&argv[0], e));
            }
        }
        // stdin / stdout ends owned by this stage close here
    }

    let pgid = pgid.ok_or(ShellError::EmptyCommand)?;
    Ok(Launched {
        pgid,
        pids,
        capture: monitor,
    })
}

fn exec_stage(
    image: &ExecImage,
    argv: &[*const libc::c_char],
    pgid: Option<Pid>,
    stdin: Option<RawFd>,
    stdout: Option<RawFd>,
    terminal: Option<RawFd>,
) -> ! {
    let pid = getpid();
    let group = pgid.unwrap_or(pid);
    let _ = setpgid(pid, group);
    // SIGTTOU is still ignored here, so a background group may take the terminal
    if let Some(fd) = terminal {
        let _ = tcsetpgrp(fd, group);
    }
    reset_job_control_signals();

    let wired = attach(stdin, libc::STDIN_FILENO).and_then(|_| attach(stdout, libc::STDOUT_FILENO));
    if wired.is_ok() {
        unsafe {
            libc::execv(image.path.as_ptr(), argv.as_ptr());
        }
    }
    unsafe {
        libc::write(
            libc::STDERR_FILENO,
            image.failure_message.as_ptr() as *const libc::c_void,
            image.failure_message.len(),
        );
        libc::_exit(EXEC_FAILURE);
    }
}

fn attach(src: Option<RawFd>, dst: RawFd) -> nix::Result<()> {
    match src {
        None => Ok(()),
        Some(src) if src == dst => {
            fcntl(src, FcntlArg::F_SETFD(FdFlag::empty()))?;
            Ok(())
        }
        Some(src) => dup2(src, dst).map(|_| ()),
    }
}

fn abort_spawned(pgid: Option<Pid>, pids: &[Pid], opts: &LaunchOptions) {
    if let Some(pgid) = pgid {
        warn!("LAUNCH: killing partially started group {}", pgid);
        let _ = killpg(pgid, Signal::SIGKILL);
        for pid in pids {
            while !matches!(
                wait_pid_job(*pid, false),
                Some(WaitEvent::Exited(_) | WaitEvent::Signaled(_) | WaitEvent::Gone)
            ) {}
        }
    }
    if let Some(terminal) = opts.terminal {
        if opts.foreground {
            if let Err(e) = terminal.reclaim() {
                error!("LAUNCH: failed to reclaim terminal: {}", e);
            }
        }
    }
}
