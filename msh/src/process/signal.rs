use msh_types::JobSignal;
use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, killpg, sigaction, sigprocmask,
};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error};

static RECEIVED_SIGINT: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_sigint(_: i32) {
    RECEIVED_SIGINT.store(true, Ordering::SeqCst);
}

/// Records SIGINT in a flag. No `SA_RESTART`, so a blocking `waitpid` or
/// `poll` returns `EINTR` and the waiting loop gets to look at the flag.
pub(crate) fn install_sigint_handler() -> nix::Result<()> {
    debug!("SIGNAL: installing SIGINT handler");
    let action = SigAction::new(
        SigHandler::Handler(handle_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGINT, &action)?;
    }
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&set), None)?;
    Ok(())
}

pub(crate) fn check_and_clear_sigint() -> bool {
    RECEIVED_SIGINT.swap(false, Ordering::SeqCst)
}

/// Job-control signals the shell itself must not react to.
pub(crate) fn ignore_job_control_signals() -> nix::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    unsafe {
        sigaction(Signal::SIGQUIT, &ignore)?;
        sigaction(Signal::SIGTSTP, &ignore)?;
        sigaction(Signal::SIGTTIN, &ignore)?;
        sigaction(Signal::SIGTTOU, &ignore)?;
    }
    Ok(())
}

/// Runs in a freshly forked child before exec: everything back to default.
pub(crate) fn reset_job_control_signals() {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    for signal in [
        Signal::SIGINT,
        Signal::SIGQUIT,
        Signal::SIGTSTP,
        Signal::SIGTTIN,
        Signal::SIGTTOU,
        Signal::SIGCHLD,
    ] {
        unsafe {
            let _ = sigaction(signal, &default);
        }
    }
    let _ = sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None);
}

/// Deliver `signal` to every process of the group led by `pgid`.
pub(crate) fn send_to_group(pgid: Pid, signal: JobSignal) -> nix::Result<()> {
    debug!("SIGNAL: sending {} to group {}", signal, pgid);
    killpg(pgid, signal.to_signal()).inspect_err(|e| {
        error!("SIGNAL: failed to send {} to group {}: {}", signal, pgid, e);
    })
}
