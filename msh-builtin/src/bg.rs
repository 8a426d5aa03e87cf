use super::ShellProxy;
use msh_types::{Context, ExitStatus, JobSignal};

/// `bg <jid>` continues a stopped job without waiting for it. Continuing a
/// job that already runs does nothing harmful.
pub fn command(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    if argv.len() != 2 {
        return crate::usage(ctx, "bg", "<jid>");
    }
    match proxy.signal_job(ctx, &argv[1], JobSignal::Continue) {
        Ok(()) => ExitStatus::ExitedWith(0),
        Err(e) => crate::job_failure(ctx, "bg", e),
    }
}
