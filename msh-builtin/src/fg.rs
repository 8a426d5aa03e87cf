use super::ShellProxy;
use msh_types::{Context, ExitStatus};

/// `fg <jid>`: the wait itself happens in the shell, which owns the terminal.
pub fn command(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    if argv.len() != 2 {
        return crate::usage(ctx, "fg", "<jid>");
    }
    match proxy.dispatch(ctx, "fg", argv) {
        Ok(status) => status,
        Err(e) => crate::job_failure(ctx, "fg", e),
    }
}
