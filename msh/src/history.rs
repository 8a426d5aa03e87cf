use anyhow::{Context as _, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Command history kept in a plain text file, one entry per line.
#[derive(Debug, Default)]
pub struct History {
    path: Option<PathBuf>,
    entries: Vec<String>,
    limit: usize,
}

impl History {
    /// A history that lives only in memory.
    pub fn in_memory(limit: usize) -> Self {
        History {
            path: None,
            entries: Vec::new(),
            limit,
        }
    }

    pub fn load(path: &Path, limit: usize) -> Result<Self> {
        let mut history = History {
            path: Some(path.to_path_buf()),
            entries: Vec::new(),
            limit,
        };
        if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            history.entries = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(str::to_string)
                .collect();
            history.truncate();
        }
        debug!("history: {} entries from {}", history.entries.len(), path.display());
        Ok(history)
    }

    fn truncate(&mut self) {
        if self.entries.len() > self.limit {
            let excess = self.entries.len() - self.limit;
            self.entries.drain(..excess);
        }
    }

    /// Records an accepted line. Blank lines are not kept.
    pub fn add(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        self.entries.push(line.to_string());
        self.truncate();
        if let Some(path) = &self.path {
            let appended = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .and_then(|mut file| writeln!(file, "{line}"));
            if let Err(e) = appended {
                warn!("history: failed to append to {}: {}", path.display(), e);
            }
        }
    }

    /// Rewrites the file with at most `limit` entries.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut text = self.entries.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(String::as_str)
    }

    /// Numbered from 1, as the `history` builtin prints them.
    pub fn numbered(&self) -> Vec<String> {
        if self.entries.is_empty() {
            return vec!["(empty)".to_string()];
        }
        self.entries
            .iter()
            .enumerate()
            .map(|(i, entry)| format!(" {}\t{}", i + 1, entry))
            .collect()
    }
}
