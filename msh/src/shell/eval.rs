use crate::parser::{ParsedLine, parse_line};
use crate::process::pipeline::compile_stage;
use crate::process::{ForegroundOutcome, Job, LaunchOptions, Pipeline, launch};
use crate::shell::Shell;
use anyhow::Result;
use msh_builtin::BuiltinCommand;
use msh_types::{Context, JobSignal, ShellError};
use std::os::unix::io::AsRawFd;
use tracing::{debug, warn};

/// Exit status for a line that failed before or while starting.
pub fn error_status(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ShellError>() {
        Some(ShellError::CommandNotFound(_)) => 127,
        Some(ShellError::SpawnFailure { .. }) => 126,
        _ => 1,
    }
}

/// Runs one input line and returns its exit status.
pub fn eval_str(shell: &mut Shell, ctx: &mut Context, input: &str) -> Result<i32> {
    if ctx.save_history {
        shell.history.add(input);
    }

    let parsed = parse_line(input)?;
    if parsed.is_empty() {
        return Ok(shell.last_status);
    }

    if !parsed.background
        && let Some(builtin) = parsed.single_command_name().and_then(msh_builtin::get_command)
    {
        return run_builtin(shell, ctx, builtin, parsed);
    }

    let pipeline = Pipeline::compile(parsed, &shell.config.aliases)?;
    if pipeline.background() {
        run_background(shell, ctx, pipeline)
    } else {
        run_foreground(shell, ctx, pipeline)
    }
}

fn run_builtin(
    shell: &mut Shell,
    ctx: &mut Context,
    builtin: BuiltinCommand,
    mut parsed: ParsedLine,
) -> Result<i32> {
    let tokens = parsed.stages.pop().unwrap_or_default();
    let (argv, _input, output) = compile_stage(tokens)?.into_parts();
    debug!("builtin {:?} output redirected: {}", argv, output.is_some());

    let saved = ctx.outfile;
    if let Some(file) = &output {
        ctx.outfile = file.as_raw_fd();
    }
    let status = builtin(ctx, argv, shell);
    ctx.outfile = saved;
    Ok(status.code())
}

fn run_background(shell: &mut Shell, ctx: &mut Context, pipeline: Pipeline) -> Result<i32> {
    let command = pipeline.command().to_string();
    let opts = LaunchOptions {
        foreground: false,
        capture_output: false,
        terminal: None,
    };
    let job = Job::new(launch(pipeline, &opts)?, command);
    let pgid = job.pgid;
    let id = shell.jobs.register(job);
    ctx.write_stdout(&format!("[{id}] {pgid}"))?;
    Ok(0)
}

fn run_foreground(shell: &mut Shell, ctx: &mut Context, pipeline: Pipeline) -> Result<i32> {
    let command = pipeline.command().to_string();
    let terminal = if ctx.interactive {
        shell.terminal.as_ref()
    } else {
        None
    };
    let opts = LaunchOptions {
        foreground: true,
        capture_output: shell.config.capture_output,
        terminal,
    };
    let mut job = Job::new(launch(pipeline, &opts)?, command);

    let outcome = match job.put_in_foreground(terminal, false) {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("foreground wait for {} failed: {}", job.command, e);
            let _ = job.signal(JobSignal::Kill);
            job.pending.push(job.last_pid);
            shell.jobs.adopt_stragglers(&mut job.pending);
            return Err(e.into());
        }
    };

    match outcome {
        ForegroundOutcome::Stopped => {
            let notice = format!("Stopped: {}", job.command);
            let id = shell.jobs.register_stopped(job);
            debug!("foreground job stopped, registered as [{}]", id);
            if ctx.interactive {
                ctx.write_stdout("")?;
            }
            ctx.write_stdout(&notice)?;
        }
        ForegroundOutcome::Finished(_) => {
            shell.jobs.adopt_stragglers(&mut job.pending);
        }
    }
    Ok(outcome.status_code())
}

impl Shell {
    pub fn eval_str(&mut self, ctx: &mut Context, input: &str) -> Result<i32> {
        let status = eval_str(self, ctx, input)?;
        self.last_status = status;
        Ok(status)
    }
}
