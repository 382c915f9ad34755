//! Test utilities for omnirig-lib.
//!
//! Scripted stand-ins for the process and filesystem capabilities, plus
//! cross-platform helpers for tests that run real shell commands.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::execute::process::{ExitStatus, Invocation, ProcessOutput, ProcessRunner};
use crate::verify::fs::{Filesystem, FsError};

/// Returns the shell command and args to execute a shell script.
#[cfg(unix)]
pub fn shell_cmd(script: &str) -> Vec<String> {
  vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

#[cfg(windows)]
pub fn shell_cmd(script: &str) -> Vec<String> {
  vec!["cmd.exe".to_string(), "/C".to_string(), script.to_string()]
}

/// A finished process with the given exit code and stdout.
pub fn exited(code: i32, stdout: &str) -> ProcessOutput {
  ProcessOutput {
    status: ExitStatus::Code(code),
    stdout: stdout.to_string(),
    stderr: String::new(),
    duration: Duration::from_millis(1),
  }
}

type Responder = Box<dyn Fn(&Invocation) -> io::Result<ProcessOutput> + Send + Sync>;

/// Process runner that answers from a closure and records every invocation.
pub struct ScriptedRunner {
  respond: Responder,
  calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
  pub fn new(respond: impl Fn(&Invocation) -> io::Result<ProcessOutput> + Send + Sync + 'static) -> Self {
    Self {
      respond: Box::new(respond),
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Every process exits 0 with empty output.
  pub fn succeeding() -> Self {
    Self::new(|_| Ok(exited(0, "")))
  }

  pub fn calls(&self) -> Vec<Invocation> {
    self.calls.lock().unwrap().clone()
  }

  /// Program and arguments of every call, joined with spaces.
  pub fn command_lines(&self) -> Vec<String> {
    self.calls().iter().map(ToString::to_string).collect()
  }
}

impl ProcessRunner for ScriptedRunner {
  async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
    self.calls.lock().unwrap().push(invocation.clone());
    (self.respond)(invocation)
  }
}

/// In-memory filesystem keyed by absolute path.
#[derive(Debug, Default)]
pub struct MemoryFs {
  files: BTreeMap<PathBuf, Result<String, String>>,
}

impl MemoryFs {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_file(mut self, path: impl Into<PathBuf>, content: &str) -> Self {
    self.files.insert(path.into(), Ok(content.to_string()));
    self
  }

  /// A file that exists but cannot be read.
  pub fn with_unreadable(mut self, path: impl Into<PathBuf>, message: &str) -> Self {
    self.files.insert(path.into(), Err(message.to_string()));
    self
  }

  fn read(&self, path: &Path) -> Result<&str, FsError> {
    match self.files.get(path) {
      Some(Ok(content)) => Ok(content),
      Some(Err(message)) => Err(FsError::Io {
        path: path.to_path_buf(),
        source: io::Error::other(message.clone()),
      }),
      None => Err(FsError::NotFound(path.to_path_buf())),
    }
  }
}

impl Filesystem for MemoryFs {
  fn exists(&self, path: &Path) -> bool {
    self.files.contains_key(path)
  }

  fn read_first_line(&self, path: &Path) -> Result<String, FsError> {
    Ok(self.read(path)?.lines().next().unwrap_or_default().to_string())
  }

  fn read_tail(&self, path: &Path, lines: usize) -> Result<String, FsError> {
    Ok(crate::execute::process::tail_lines(self.read(path)?, lines))
  }
}
