use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const APP_NAME: &str = "msh";
pub const CONFIG_FILE: &str = "config.toml";
const HISTORY_FILE: &str = "history";
const LOG_FILE: &str = "msh.log";

pub const DEFAULT_PROMPT: &str = "{user}@msh:{cwd}$ ";
const DEFAULT_HISTORY_LIMIT: usize = 1000;
const DEFAULT_PMON_INTERVAL_MS: u64 = 1500;
const DEFAULT_PMON_MAX: usize = 15;

/// `config.toml` as written by the user. Every key may be left out.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    prompt: Option<String>,
    history_file: Option<String>,
    history_limit: Option<usize>,
    log_file: Option<String>,
    capture_output: Option<bool>,
    pmon_interval_ms: Option<u64>,
    pmon_max: Option<usize>,
    #[serde(default)]
    aliases: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub prompt: String,
    pub history_file: Option<PathBuf>,
    pub history_limit: usize,
    pub log_file: Option<PathBuf>,
    pub capture_output: bool,
    pub pmon_interval_ms: u64,
    pub pmon_max: usize,
    pub aliases: HashMap<String, String>,
}

fn default_aliases() -> HashMap<String, String> {
    [("ll", "ls -l"), ("cls", "clear"), ("gs", "git status")]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect()
}

fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

impl Default for Config {
    fn default() -> Self {
        Config {
            prompt: DEFAULT_PROMPT.to_string(),
            history_file: None,
            history_limit: DEFAULT_HISTORY_LIMIT,
            log_file: None,
            capture_output: true,
            pmon_interval_ms: DEFAULT_PMON_INTERVAL_MS,
            pmon_max: DEFAULT_PMON_MAX,
            aliases: default_aliases(),
        }
    }
}

impl From<ConfigFile> for Config {
    fn from(file: ConfigFile) -> Self {
        let defaults = Config::default();
        let mut aliases = defaults.aliases;
        aliases.extend(file.aliases);
        Config {
            prompt: file.prompt.unwrap_or(defaults.prompt),
            history_file: file.history_file.as_deref().map(expand_path),
            history_limit: file.history_limit.unwrap_or(defaults.history_limit),
            log_file: file.log_file.as_deref().map(expand_path),
            capture_output: file.capture_output.unwrap_or(defaults.capture_output),
            pmon_interval_ms: file.pmon_interval_ms.unwrap_or(defaults.pmon_interval_ms),
            pmon_max: file.pmon_max.unwrap_or(defaults.pmon_max),
            aliases,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(text).context("failed to parse config")?;
        Ok(file.into())
    }

    /// Reads `path`. A file that does not exist gives the defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("config: {} not found, using defaults", path.display());
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Config::from_toml(&text).with_context(|| format!("in {}", path.display()))
    }

    /// Loads `$XDG_CONFIG_HOME/msh/config.toml`. When it cannot be used the
    /// defaults come back together with the reason, for the caller to show once.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        let path = match xdg::BaseDirectories::with_prefix(APP_NAME) {
            Ok(dirs) => dirs.find_config_file(CONFIG_FILE),
            Err(e) => return (Config::default(), Some(e.into())),
        };
        let Some(path) = path else {
            return (Config::default(), None);
        };
        match Config::load_from(&path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    pub fn history_path(&self) -> Result<PathBuf> {
        match &self.history_file {
            Some(path) => Ok(path.clone()),
            None => get_data_file(HISTORY_FILE),
        }
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.log_file {
            Some(path) => Ok(path.clone()),
            None => get_state_file(LOG_FILE),
        }
    }
}

pub fn get_data_file(name: &str) -> Result<PathBuf> {
    let xdg_dir =
        xdg::BaseDirectories::with_prefix(APP_NAME).context("failed get xdg directory")?;
    xdg_dir.place_data_file(name).context("failed get path")
}

pub fn get_state_file(name: &str) -> Result<PathBuf> {
    let xdg_dir =
        xdg::BaseDirectories::with_prefix(APP_NAME).context("failed get xdg directory")?;
    xdg_dir.place_state_file(name).context("failed get path")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(Config::default(), config);
        assert_eq!(Some(&"ls -l".to_string()), config.aliases.get("ll"));
        assert_eq!(1000, config.history_limit);
        assert!(config.capture_output);
    }

    #[test]
    fn keys_override_and_aliases_merge() {
        let config = Config::from_toml(
            r#"
prompt = "$ "
history_limit = 10
capture_output = false
pmon_interval_ms = 500

[aliases]
ll = "ls -la"
k = "kill %1"
"#,
        )
        .unwrap();
        assert_eq!("$ ", config.prompt);
        assert_eq!(10, config.history_limit);
        assert!(!config.capture_output);
        assert_eq!(500, config.pmon_interval_ms);
        assert_eq!(15, config.pmon_max);
        assert_eq!(Some(&"ls -la".to_string()), config.aliases.get("ll"));
        assert_eq!(Some(&"kill %1".to_string()), config.aliases.get("k"));
        assert_eq!(Some(&"git status".to_string()), config.aliases.get("gs"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(Config::from_toml("history_limit = \"many\"").is_err());
        assert!(Config::from_toml("no_such_key = 1").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(Config::default(), config);
    }

    #[test]
    fn paths_are_tilde_expanded() {
        let config = Config::from_toml("history_file = \"~/.msh_history\"").unwrap();
        let path = config.history_path().unwrap();
        assert!(path.ends_with(".msh_history"));
        assert!(!path.starts_with("~"));
    }
}
