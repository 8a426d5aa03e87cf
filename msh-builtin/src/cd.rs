use super::ShellProxy;
use anyhow::Result;
use msh_types::{Context, ExitStatus};
use std::path::{Path, PathBuf};

/// Works out the directory `cd` should move to. No argument means home.
pub fn resolve(arg: Option<&str>, current_dir: &Path) -> Result<PathBuf> {
    let dir = match arg {
        Some(dir) if dir.starts_with('/') => PathBuf::from(dir),
        Some(dir) if dir.starts_with('~') => PathBuf::from(shellexpand::tilde(dir).into_owned()),
        Some(dir) => current_dir
            .join(dir)
            .canonicalize()
            .map_err(|err| anyhow::anyhow!("{dir}: {err}"))?,
        None => dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
    };
    Ok(dir)
}

pub fn command(ctx: &Context, argv: Vec<String>, proxy: &mut dyn ShellProxy) -> ExitStatus {
    let current_dir = match std::env::current_dir() {
        Ok(dir) => dir,
        Err(err) => {
            ctx.write_stderr(&format!("cd: {err}")).ok();
            return ExitStatus::ExitedWith(1);
        }
    };

    let dir = match resolve(argv.get(1).map(|s| s.as_str()), &current_dir) {
        Ok(dir) => dir,
        Err(err) => {
            ctx.write_stderr(&format!("cd: {err}")).ok();
            return ExitStatus::ExitedWith(1);
        }
    };

    let dir = dir.to_string_lossy();
    match proxy.changepwd(&dir) {
        Ok(_) => ExitStatus::ExitedWith(0),
        Err(err) => {
            ctx.write_stderr(&format!("cd: {dir}: {err}")).ok();
            ExitStatus::ExitedWith(1)
        }
    }
}
