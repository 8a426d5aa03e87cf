use crate::shell::job::{bring_to_foreground, list_jobs, send_signal};
use crate::shell::{JobRegistry, Shell};
use anyhow::{Result, bail};
use msh_builtin::{MonitorSettings, ShellProxy};
use msh_types::{Context, ExitStatus, JobSignal};
use std::time::Duration;
use tracing::debug;

impl ShellProxy for Shell {
    fn exit_shell(&mut self, code: i32) {
        self.exit(code);
    }

    fn dispatch(&mut self, ctx: &Context, cmd: &str, argv: Vec<String>) -> Result<ExitStatus> {
        debug!("dispatch {} {:?}", cmd, argv);
        match cmd {
            "jobs" => {
                for line in list_jobs(self) {
                    ctx.write_stdout(&line)?;
                }
            }
            "history" => {
                for line in self.history.numbered() {
                    ctx.write_stdout(&line)?;
                }
            }
            "fg" => {
                let Some(spec) = argv.get(1) else {
                    bail!("usage: fg <jid>");
                };
                let id = JobRegistry::parse_id(spec)?;
                let resumed = bring_to_foreground(self, id)?;
                if let Some(notice) = resumed.notice {
                    if ctx.interactive {
                        ctx.write_stdout("")?;
                    }
                    ctx.write_stdout(&notice)?;
                }
                return Ok(ExitStatus::ExitedWith(resumed.status));
            }
            _ => bail!("{cmd}: not handled by the shell"),
        }
        Ok(ExitStatus::ExitedWith(0))
    }

    fn changepwd(&mut self, path: &str) -> Result<()> {
        std::env::set_current_dir(path)?;
        Ok(())
    }

    fn signal_job(&mut self, ctx: &Context, spec: &str, signal: JobSignal) -> Result<()> {
        let id = JobRegistry::parse_id(spec)?;
        let msg = send_signal(self, id, signal)?;
        ctx.write_stdout(&msg)
    }

    fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_millis(self.config.pmon_interval_ms),
            max_rows: self.config.pmon_max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::history::History;
    use crate::process::io::pipe_cloexec;
    use std::io::Read;
    use std::os::fd::IntoRawFd;

    fn init() {
        let _ = tracing_subscriber::fmt::try_init();
    }

    fn shell_with_output() -> (Shell, Context, std::fs::File) {
        let shell = Shell::new(Config::default(), History::in_memory(10));
        let mut ctx = Context::non_interactive(shell.pid, shell.pgid);
        let (read, write) = pipe_cloexec().unwrap();
        ctx.outfile = write.into_raw_fd();
        (shell, ctx, std::fs::File::from(read))
    }

    fn output(ctx: Context, mut read: std::fs::File) -> String {
        nix::unistd::close(ctx.outfile).unwrap();
        let mut text = String::new();
        read.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn history_is_numbered() {
        init();
        let (mut shell, ctx, read) = shell_with_output();
        shell.history.add("echo one");
        shell.history.add("echo two");
        shell
            .dispatch(&ctx, "history", vec!["history".into()])
            .unwrap();
        assert_eq!(" 1\techo one\n 2\techo two\n", output(ctx, read));
    }

    #[test]
    fn kill_on_a_finished_job() {
        init();
        let (mut shell, mut ctx, read) = shell_with_output();
        shell.eval_str(&mut ctx, "true &").unwrap();
        for _ in 0..100 {
            shell.check_job_state();
            if shell.jobs.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        let err = shell
            .signal_job(&ctx, "1", JobSignal::Terminate)
            .unwrap_err();
        assert_eq!("Job 1 is already finished.", err.to_string());
        drop(output(ctx, read));
    }

    #[test]
    fn bg_on_a_running_job() {
        init();
        let (mut shell, mut ctx, read) = shell_with_output();
        shell.eval_str(&mut ctx, "sleep 30 &").unwrap();
        shell.signal_job(&ctx, "%1", JobSignal::Continue).unwrap();
        shell.signal_job(&ctx, "1", JobSignal::Kill).unwrap();
        let text = output(ctx, read);
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("[1] "));
        assert_eq!(
            vec!["Sent signal SIGCONT to job 1.", "Sent signal SIGKILL to job 1."],
            lines[1..]
        );
    }

    #[test]
    fn unknown_job() {
        init();
        let (mut shell, ctx, _read) = shell_with_output();
        let err = shell
            .dispatch(&ctx, "fg", vec!["fg".into(), "%4".into()])
            .unwrap_err();
        assert_eq!("Job not found: 4", err.to_string());
        let err = shell
            .signal_job(&ctx, "x", JobSignal::Terminate)
            .unwrap_err();
        assert_eq!("Job not found: x", err.to_string());
    }

    #[test]
    fn monitor_settings_follow_config() {
        let mut config = Config::default();
        config.pmon_interval_ms = 500;
        config.pmon_max = 3;
        let shell = Shell::new(config, History::in_memory(1));
        assert_eq!(
            MonitorSettings {
                interval: Duration::from_millis(500),
                max_rows: 3
            },
            shell.monitor_settings()
        );
    }
}
