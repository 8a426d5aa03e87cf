use msh_types::{ShellError, ShellResult};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::parser::RedirectOp;

/// A redirection whose target has already been opened. The file is closed
/// when this is dropped, so a failed compile leaks nothing.
#[derive(Debug)]
pub struct Redirect {
    op: RedirectOp,
    path: PathBuf,
    file: File,
}

impl Redirect {
    /// Expands `~` in `target` and opens it the way `op` asks.
    pub fn open(op: RedirectOp, target: &str) -> ShellResult<Self> {
        let expanded = shellexpand::tilde(target);
        let path = PathBuf::from(expanded.into_owned());
        let result = match op {
            RedirectOp::Read => File::open(&path),
            RedirectOp::Write => OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path),
            RedirectOp::Append => OpenOptions::new().append(true).create(true).open(&path),
        };
        let file = result.map_err(|source| ShellError::Redirection {
            path: target.to_string(),
            source,
        })?;
        debug!("redirect: {} {}", op.as_str(), path.display());
        Ok(Redirect { op, path, file })
    }

    pub fn is_input(&self) -> bool {
        self.op == RedirectOp::Read
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn into_file(self) -> File {
        self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};

    #[test]
    fn write_truncates_and_append_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        std::fs::write(&path, "old contents\n").unwrap();
        let target = path.to_str().unwrap();

        let redirect = Redirect::open(RedirectOp::Write, target).unwrap();
        assert!(!redirect.is_input());
        redirect.into_file().write_all(b"one\n").unwrap();

        let redirect = Redirect::open(RedirectOp::Append, target).unwrap();
        redirect.into_file().write_all(b"two\n").unwrap();

        assert_eq!("one\ntwo\n", std::fs::read_to_string(&path).unwrap());
    }

    #[test]
    fn read_opens_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.txt");
        std::fs::write(&path, "data").unwrap();

        let redirect = Redirect::open(RedirectOp::Read, path.to_str().unwrap()).unwrap();
        assert!(redirect.is_input());
        assert_eq!(path.as_path(), redirect.path());
        let mut buf = String::new();
        redirect.into_file().read_to_string(&mut buf).unwrap();
        assert_eq!("data", buf);
    }

    #[test]
    fn missing_input_names_the_path() {
        match Redirect::open(RedirectOp::Read, "/no/such/file") {
            Err(ShellError::Redirection { path, source }) => {
                assert_eq!("/no/such/file", path);
                assert_eq!(std::io::ErrorKind::NotFound, source.kind());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn tilde_is_expanded() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let redirect = Redirect::open(RedirectOp::Read, "~").unwrap();
        assert_eq!(home.as_path(), redirect.path());
    }
}
