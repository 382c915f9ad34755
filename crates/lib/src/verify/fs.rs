//! Read-only filesystem access used by assertions and diagnostics.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
  #[error("{} does not exist", .0.display())]
  NotFound(PathBuf),

  #[error("failed to read {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl FsError {
  fn from_io(path: &Path, source: io::Error) -> Self {
    if source.kind() == io::ErrorKind::NotFound {
      FsError::NotFound(path.to_path_buf())
    } else {
      FsError::Io {
        path: path.to_path_buf(),
        source,
      }
    }
  }
}

/// The filesystem operations extractors rely on. None of them modify anything.
pub trait Filesystem: Send + Sync {
  fn exists(&self, path: &Path) -> bool;

  /// First line of a file, without its line terminator. Empty for an empty file.
  fn read_first_line(&self, path: &Path) -> Result<String, FsError>;

  /// Last `lines` lines of a file.
  fn read_tail(&self, path: &Path, lines: usize) -> Result<String, FsError>;
}

/// The host filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFs;

impl Filesystem for HostFs {
  fn exists(&self, path: &Path) -> bool {
    path.exists()
  }

  fn read_first_line(&self, path: &Path) -> Result<String, FsError> {
    let file = File::open(path).map_err(|e| FsError::from_io(path, e))?;
    let mut line = String::new();
    BufReader::new(file)
      .read_line(&mut line)
      .map_err(|e| FsError::from_io(path, e))?;
    Ok(line.trim_end_matches(['\n', '\r']).to_string())
  }

  fn read_tail(&self, path: &Path, lines: usize) -> Result<String, FsError> {
    let bytes = std::fs::read(path).map_err(|e| FsError::from_io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(crate::execute::process::tail_lines(&text, lines))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn first_line_strips_terminator() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("version-manifest.txt");
    std::fs::write(&path, "agent 7.24.0  \r\nfoo 1.0\n").unwrap();

    assert_eq!(HostFs.read_first_line(&path).unwrap(), "agent 7.24.0  ");
  }

  #[test]
  fn empty_file_has_empty_first_line() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("empty");
    std::fs::write(&path, "").unwrap();

    assert_eq!(HostFs.read_first_line(&path).unwrap(), "");
  }

  #[test]
  fn missing_file_is_not_found() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("missing.log");

    assert!(!HostFs.exists(&path));
    assert!(matches!(HostFs.read_first_line(&path), Err(FsError::NotFound(_))));
    assert!(matches!(HostFs.read_tail(&path, 5), Err(FsError::NotFound(_))));
  }

  #[test]
  fn tail_returns_last_lines() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("service.log");
    let content: String = (1..=10).map(|i| format!("line {i}\n")).collect();
    std::fs::write(&path, content).unwrap();

    assert_eq!(HostFs.read_tail(&path, 3).unwrap(), "line 8\nline 9\nline 10");
  }
}
