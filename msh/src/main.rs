use anyhow::{Result, anyhow};
use clap::Parser;
use msh::repl::{Repl, run_line, run_script};
use msh::{Config, History, Shell};
use msh_types::Context;
use nix::unistd::isatty;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Evaluate one line and exit with its status
    #[arg(short, long)]
    command: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let (config, config_err) = Config::load();

    let log_path = config.log_path().ok();
    if let Err(err) = init_tracing(log_path.as_ref()) {
        eprintln!("msh: failed to initialize logging: {err:#}");
    }
    setup_panic_handler(log_path);

    if let Some(err) = config_err {
        eprintln!("msh: config: {err:#}");
        warn!("config: {:#}", err);
    }

    let status = match cli.command.as_deref() {
        Some(line) => execute_command(config, line),
        None if isatty(libc::STDIN_FILENO).unwrap_or(false) => run_interactive(config),
        None => run_piped(config),
    };
    match status {
        Ok(code) => ExitCode::from((code & 0xff) as u8),
        Err(err) => {
            eprintln!("msh: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(log_path: Option<&PathBuf>) -> Result<()> {
    let path = log_path.ok_or_else(|| anyhow!("no place for the log file"))?;
    let log_file = std::sync::Arc::new(
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?,
    );
    let filter = EnvFilter::try_from_env("MSH_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .try_init()
        .map_err(|e| anyhow!(e))
}

fn setup_panic_handler(log_path: Option<PathBuf>) {
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic payload".to_string()
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "Unknown location".to_string());

        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f UTC");
        tracing::error!("PANIC at {}: {} ({})", location, payload, timestamp);

        // the subscriber may not be up yet
        if let Some(path) = &log_path
            && let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
        {
            use std::io::Write;
            let _ = writeln!(file, "{timestamp} PANIC at {location}: {payload}");
        }

        eprintln!("msh: panic at {location}: {payload}");
    }));
}

fn execute_command(config: Config, line: &str) -> Result<i32> {
    let mut shell = Shell::new(config, History::in_memory(0));
    let mut ctx = Context::non_interactive(shell.pid, shell.pgid);
    shell.set_signals();
    let status = run_line(&mut shell, &mut ctx, line);
    debug!("run command mode {:?} : {}", line, status);
    Ok(status)
}

fn run_piped(config: Config) -> Result<i32> {
    debug!("Running in pipe mode");
    let mut shell = Shell::new(config, History::in_memory(0));
    let mut ctx = Context::non_interactive(shell.pid, shell.pgid);
    shell.set_signals();
    run_script(&mut shell, &mut ctx, BufReader::new(io::stdin().lock()))
}

fn run_interactive(config: Config) -> Result<i32> {
    debug!("Running in interactive mode");
    let history = match config.history_path() {
        Ok(path) => History::load(&path, config.history_limit).unwrap_or_else(|e| {
            eprintln!("msh: {e:#}");
            History::in_memory(config.history_limit)
        }),
        Err(e) => {
            warn!("history disabled: {:#}", e);
            History::in_memory(config.history_limit)
        }
    };

    let mut shell = Shell::new(config, history);
    let mut ctx = Context::new(shell.pid, shell.pgid);
    shell.take_terminal(&mut ctx)?;

    let mut repl = Repl::new(&mut shell);
    repl.run_interactive(&mut ctx)
}
