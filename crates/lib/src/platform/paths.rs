//! Well-known directories.
//!
//! Install roots default to `<root_dir>/<target>`, where the root directory is
//! `$OMNIRIG_ROOT` when set and the per-user data directory otherwise.

use std::path::PathBuf;

use crate::consts::{APP_NAME, ROOT_ENV, TARGETS_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("C:\\"))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| PathBuf::from("/"))
}

/// Returns the directory for data files for the application
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join("AppData").join("Local"))
    .join(APP_NAME)
}

/// Returns the directory for data files for the application
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Parent directory for install roots of targets that do not declare one.
pub fn root_dir() -> PathBuf {
  match std::env::var(ROOT_ENV) {
    Ok(root) if !root.is_empty() => PathBuf::from(root),
    _ => data_dir().join("installs"),
  }
}

/// Directory searched for target definitions by name.
pub fn targets_dir() -> PathBuf {
  match std::env::var(TARGETS_ENV) {
    Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => PathBuf::from("targets"),
  }
}
