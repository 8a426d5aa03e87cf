use anyhow::Result;
use msh_types::{Context, ExitStatus, JobSignal, ShellError};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

mod bg;
pub mod cd;
mod fg;
mod history;
mod jobs;
mod kill;
pub mod pmon;

pub use pmon::MonitorSettings;

pub const BUILTIN_NAMES: &str = "cd, exit, help, history, jobs, fg, bg, kill, pmon";

/// What builtin commands may ask of the shell they run in.
pub trait ShellProxy {
    /// Ends the input loop once the current line is done.
    fn exit_shell(&mut self, code: i32);

    /// Runs a command that needs the shell's own state (`jobs`, `fg`, `history`).
    fn dispatch(&mut self, ctx: &Context, cmd: &str, argv: Vec<String>) -> Result<ExitStatus>;

    fn changepwd(&mut self, path: &str) -> Result<()>;

    /// Sends `signal` to the job named by `spec` (`N` or `%N`) and reports
    /// the result on the context's stdout.
    fn signal_job(&mut self, ctx: &Context, spec: &str, signal: JobSignal) -> Result<()>;

    fn monitor_settings(&self) -> MonitorSettings;
}

pub type BuiltinCommand =
    fn(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus;

pub static BUILTIN_COMMAND: Lazy<Mutex<HashMap<&str, BuiltinCommand>>> = Lazy::new(|| {
    let mut builtin = HashMap::new();

    builtin.insert("exit", exit as BuiltinCommand);
    builtin.insert("help", help as BuiltinCommand);
    builtin.insert("cd", cd::command as BuiltinCommand);
    builtin.insert("history", history::command as BuiltinCommand);

    // job control
    builtin.insert("jobs", jobs::command as BuiltinCommand);
    builtin.insert("fg", fg::command as BuiltinCommand);
    builtin.insert("bg", bg::command as BuiltinCommand);
    builtin.insert("kill", kill::command as BuiltinCommand);

    builtin.insert("pmon", pmon::command as BuiltinCommand);

    Mutex::new(builtin)
});

pub fn get_command(name: &str) -> Option<BuiltinCommand> {
    if let Ok(builtin) = BUILTIN_COMMAND.lock() {
        builtin.get(name).copied()
    } else {
        None
    }
}

/// `exit [code]`
pub fn exit(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    let code = match argv.get(1).map(|arg| arg.parse::<i32>()) {
        None => 0,
        Some(Ok(code)) => code,
        Some(Err(_)) => {
            ctx.write_stderr(&format!("exit: {}: numeric argument required", argv[1]))
                .ok();
            2
        }
    };
    debug!("exit builtin with {}", code);
    proxy.exit_shell(code);
    ExitStatus::ExitedWith(code)
}

pub fn help(ctx: &Context, _argv: Vec<String>, _proxy: &mut dyn ShellProxy) -> ExitStatus {
    match ctx.write_stdout(&format!("Built-ins: {BUILTIN_NAMES}")) {
        Ok(()) => ExitStatus::ExitedWith(0),
        Err(_) => ExitStatus::ExitedWith(1),
    }
}

/// Prints `<name>: usage: <name> <jid>` and returns the failure status.
pub(crate) fn usage(ctx: &Context, name: &str, args: &str) -> ExitStatus {
    ctx.write_stderr(&format!("{name}: usage: {name} {args}")).ok();
    ExitStatus::ExitedWith(2)
}

/// Reports a failed job operation. An unknown or finished job is an answer,
/// printed as is on stdout; anything else goes to stderr under `name`.
pub(crate) fn job_failure(ctx: &Context, name: &str, err: anyhow::Error) -> ExitStatus {
    match err.downcast_ref::<ShellError>() {
        Some(ShellError::JobNotFound(_) | ShellError::JobAlreadyFinished(_)) => {
            ctx.write_stdout(&err.to_string()).ok();
        }
        _ => {
            ctx.write_stderr(&format!("{name}: {err}")).ok();
        }
    }
    ExitStatus::ExitedWith(1)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn registry_has_every_builtin() {
        for name in BUILTIN_NAMES.split(", ") {
            assert!(get_command(name).is_some(), "{name}");
        }
        assert!(get_command("ls").is_none());
    }

    #[test]
    fn exit_with_code() {
        let (ctx, out, err) = piped_context();
        let mut proxy = RecordingProxy::default();
        let status = exit(&ctx, vec!["exit".into(), "3".into()], &mut proxy);
        assert_eq!(ExitStatus::ExitedWith(3), status);
        assert_eq!(Some(3), proxy.exited);

        let status = exit(&ctx, vec!["exit".into(), "x".into()], &mut proxy);
        assert_eq!(ExitStatus::ExitedWith(2), status);
        let (_, stderr) = finish(ctx, out, err);
        assert_eq!("exit: x: numeric argument required\n", stderr);
    }

    #[test]
    fn help_lists_builtins() {
        let (ctx, out, err) = piped_context();
        let mut proxy = RecordingProxy::default();
        help(&ctx, vec!["help".into()], &mut proxy);
        let (stdout, _) = finish(ctx, out, err);
        assert_eq!(
            "Built-ins: cd, exit, help, history, jobs, fg, bg, kill, pmon\n",
            stdout
        );
    }
}
