use crate::input::{LineEditor, ReadLine};
use crate::process::signal::check_and_clear_sigint;
use crate::prompt;
use crate::shell::Shell;
use crate::shell::eval::error_status;
use anyhow::Result;
use msh_types::{Context, ExitStatus};
use std::io::BufRead;
use tracing::{debug, warn};

/// Evaluates one line and reports a failure as `msh: <error>`. Returns the
/// line's exit status either way.
pub fn run_line(shell: &mut Shell, ctx: &mut Context, line: &str) -> i32 {
    match shell.eval_str(ctx, line) {
        Ok(status) => status,
        Err(err) => {
            debug!("line {:?} failed: {:?}", line, err);
            shell.print_error(format!("{err}"));
            let status = error_status(&err);
            shell.last_status = status;
            status
        }
    }
}

fn report_finished_jobs(shell: &mut Shell, ctx: &Context) {
    for line in shell.check_job_state() {
        if let Err(e) = ctx.write_stdout(&line) {
            warn!("failed to report job state: {}", e);
        }
    }
}

fn final_status(shell: &Shell) -> i32 {
    match shell.exited {
        Some(ExitStatus::ExitedWith(code)) => code,
        None => shell.last_status,
    }
}

/// Reads commands from a non-terminal, one per line, until EOF or `exit`.
pub fn run_script(shell: &mut Shell, ctx: &mut Context, reader: impl BufRead) -> Result<i32> {
    for line in reader.lines() {
        let line = line?;
        report_finished_jobs(shell, ctx);
        run_line(shell, ctx, &line);
        if shell.exited.is_some() {
            break;
        }
    }
    report_finished_jobs(shell, ctx);
    Ok(final_status(shell))
}

pub struct Repl<'a> {
    pub shell: &'a mut Shell,
    editor: LineEditor,
}

impl<'a> Repl<'a> {
    pub fn new(shell: &'a mut Shell) -> Self {
        Repl {
            shell,
            editor: LineEditor::new(),
        }
    }

    pub fn run_interactive(&mut self, ctx: &mut Context) -> Result<i32> {
        while self.shell.exited.is_none() {
            report_finished_jobs(self.shell, ctx);

            let prompt = prompt::current(&self.shell.config.prompt, self.shell.last_status);
            let read = self.editor.read_line(&prompt, &self.shell.history)?;
            // an interrupt typed at the prompt must not reach the next job
            check_and_clear_sigint();

            match read {
                ReadLine::Line(line) => {
                    run_line(self.shell, ctx, &line);
                }
                ReadLine::Interrupted => {
                    self.shell.last_status = 130;
                }
                ReadLine::Eof => {
                    ctx.write_stdout("exit")?;
                    break;
                }
            }
        }

        if let Err(e) = self.shell.history.save() {
            warn!("failed to save history: {:#}", e);
        }
        Ok(final_status(self.shell))
    }
}
