use super::ShellProxy;
use msh_types::{Context, ExitStatus};

pub fn command(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    match proxy.dispatch(ctx, "history", argv) {
        Ok(status) => status,
        Err(e) => {
            ctx.write_stderr(&format!("history: {e}")).ok();
            ExitStatus::ExitedWith(1)
        }
    }
}
