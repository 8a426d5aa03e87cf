use crate::ShellProxy;
use anyhow::Result;
use getopts::Options;
use msh_types::{Context, ExitStatus, JobSignal};

pub const COMMAND_NAME: &str = "kill";

/// `kill [-s SIGNAL] <jid>`, SIGTERM unless told otherwise.
pub fn command(ctx: &Context, args: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    match run(proxy, ctx, args) {
        Ok(code) => ExitStatus::ExitedWith(code),
        Err(e) => crate::job_failure(ctx, COMMAND_NAME, e),
    }
}

fn run(proxy: &mut dyn ShellProxy, ctx: &Context, args: Vec<String>) -> Result<i32> {
    let mut opts = Options::new();
    opts.optflag("h", "help", "print this help menu");
    opts.optopt("s", "signal", "signal to send (TERM, KILL, STOP, CONT, INT)", "SIGNAL");

    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            ctx.write_stderr(&format!("{COMMAND_NAME}: {f}"))?;
            return Ok(2);
        }
    };

    if matches.opt_present("h") {
        let brief = format!("Usage: {COMMAND_NAME} [options] <jid>");
        ctx.write_stdout(&opts.usage(&brief))?;
        return Ok(0);
    }

    let signal = match matches.opt_str("s") {
        Some(name) => match JobSignal::parse(&name) {
            Some(signal) => signal,
            None => {
                ctx.write_stderr(&format!("{COMMAND_NAME}: {name}: invalid signal"))?;
                return Ok(2);
            }
        },
        None => JobSignal::Terminate,
    };

    let [spec] = matches.free.as_slice() else {
        return Ok(crate::usage(ctx, COMMAND_NAME, "<jid>").code());
    };
    proxy.signal_job(ctx, spec, signal)?;
    Ok(0)
}
