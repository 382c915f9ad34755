//! External process invocation.
//!
//! Every build step and command extractor goes through a [`ProcessRunner`].
//! [`SystemRunner`] spawns real processes with tokio; tests substitute a
//! scripted runner.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long output of a killed process is still collected. A grandchild may
/// keep the pipes open after the child itself is gone.
const KILLED_OUTPUT_GRACE: Duration = Duration::from_millis(500);

/// A fully resolved process invocation.
///
/// `env` is the complete environment of the child; nothing is inherited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invocation {
  pub program: String,
  pub args: Vec<String>,
  pub cwd: PathBuf,
  #[serde(skip)]
  pub env: BTreeMap<String, String>,
  #[serde(with = "humantime_opt", skip_serializing_if = "Option::is_none")]
  pub timeout: Option<Duration>,
}

impl Invocation {
  /// Build an invocation from an argument vector. Returns `None` for an empty vector.
  pub fn from_argv(argv: &[String], cwd: PathBuf, env: BTreeMap<String, String>) -> Option<Self> {
    let (program, args) = argv.split_first()?;
    Some(Self {
      program: program.clone(),
      args: args.to_vec(),
      cwd,
      env,
      timeout: None,
    })
  }

  pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.timeout = timeout;
    self
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", quote(&self.program))?;
    for arg in &self.args {
      write!(f, " {}", quote(arg))?;
    }
    Ok(())
  }
}

fn quote(arg: &str) -> String {
  if !arg.is_empty() && !arg.chars().any(|c| c.is_whitespace() || matches!(c, '\'' | '"' | '\\')) {
    return arg.to_string();
  }
  format!("'{}'", arg.replace('\'', r"'\''"))
}

mod humantime_opt {
  use std::time::Duration;

  use serde::Serializer;

  pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
      Some(d) => serializer.serialize_str(&humantime::format_duration(*d).to_string()),
      None => serializer.serialize_none(),
    }
  }
}

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ExitStatus {
  /// Exited normally with a code.
  Code(i32),
  /// Terminated by a signal, with the signal number when known.
  Killed(Option<i32>),
  /// Exceeded its timeout and was killed.
  TimedOut,
}

impl ExitStatus {
  pub fn code(&self) -> Option<i32> {
    match self {
      ExitStatus::Code(code) => Some(*code),
      _ => None,
    }
  }

  pub fn success(&self) -> bool {
    *self == ExitStatus::Code(0)
  }
}

impl fmt::Display for ExitStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ExitStatus::Code(code) => write!(f, "exit code {code}"),
      ExitStatus::Killed(Some(signal)) => write!(f, "killed by signal {signal}"),
      ExitStatus::Killed(None) => write!(f, "terminated without exit code"),
      ExitStatus::TimedOut => write!(f, "timed out"),
    }
  }
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
  pub status: ExitStatus,
  pub stdout: String,
  pub stderr: String,
  pub duration: Duration,
}

/// Runs external processes.
///
/// An `Err` means the process could not be started at all. Non-zero exits
/// and timeouts are reported through [`ProcessOutput::status`].
pub trait ProcessRunner: Send + Sync {
  fn run(&self, invocation: &Invocation) -> impl Future<Output = io::Result<ProcessOutput>> + Send;
}

/// Spawns real child processes with a cleared environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
  async fn run(&self, invocation: &Invocation) -> io::Result<ProcessOutput> {
    debug!(
      program = %invocation.program,
      args = ?invocation.args,
      cwd = %invocation.cwd.display(),
      "spawning process"
    );

    let mut command = Command::new(&invocation.program);
    command
      .args(&invocation.args)
      .current_dir(&invocation.cwd)
      .env_clear()
      .envs(&invocation.env)
      .stdin(Stdio::null())
      .stdout(Stdio::piped())
      .stderr(Stdio::piped())
      .kill_on_drop(true);

    let started = Instant::now();
    let mut child = command.spawn()?;
    let (stdout, stdout_task) = capture(child.stdout.take());
    let (stderr, stderr_task) = capture(child.stderr.take());

    let status = match invocation.timeout {
      Some(limit) => {
        let waited = tokio::time::timeout(limit, child.wait()).await;
        match waited {
          Ok(status) => Some(status?),
          Err(_) => {
            warn!(program = %invocation.program, timeout = ?limit, "process timed out");
            if let Err(e) = child.kill().await {
              debug!(program = %invocation.program, error = %e, "failed to kill timed out process");
            }
            None
          }
        }
      }
      None => Some(child.wait().await?),
    };

    for task in [stdout_task, stderr_task] {
      if status.is_some() {
        let _ = task.await;
      } else {
        let abort = task.abort_handle();
        if tokio::time::timeout(KILLED_OUTPUT_GRACE, task).await.is_err() {
          abort.abort();
        }
      }
    }

    let status = match status {
      Some(status) => match status.code() {
        Some(code) => ExitStatus::Code(code),
        None => ExitStatus::Killed(signal_of(&status)),
      },
      None => ExitStatus::TimedOut,
    };

    Ok(ProcessOutput {
      status,
      stdout: drain(&stdout),
      stderr: drain(&stderr),
      duration: started.elapsed(),
    })
  }
}

type Captured = Arc<Mutex<Vec<u8>>>;

/// Read a child pipe to the end in the background, keeping what arrives.
fn capture<R>(pipe: Option<R>) -> (Captured, JoinHandle<()>)
where
  R: AsyncRead + Unpin + Send + 'static,
{
  let buffer = Captured::default();
  let sink = Arc::clone(&buffer);
  let task = tokio::spawn(async move {
    let Some(mut pipe) = pipe else {
      return;
    };
    let mut chunk = [0u8; 8192];
    loop {
      match pipe.read(&mut chunk).await {
        Ok(0) | Err(_) => break,
        Ok(n) => {
          sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&chunk[..n]);
        }
      }
    }
  });
  (buffer, task)
}

fn drain(buffer: &Captured) -> String {
  let bytes = std::mem::take(&mut *buffer.lock().unwrap_or_else(PoisonError::into_inner));
  String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(unix)]
fn signal_of(status: &std::process::ExitStatus) -> Option<i32> {
  use std::os::unix::process::ExitStatusExt;
  status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: &std::process::ExitStatus) -> Option<i32> {
  None
}

/// Keep the last `lines` lines of `text`.
pub fn tail_lines(text: &str, lines: usize) -> String {
  let all: Vec<&str> = text.lines().collect();
  let start = all.len().saturating_sub(lines);
  all[start..].join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_quotes_arguments_with_spaces() {
    let inv = Invocation::from_argv(
      &["make".to_string(), "CFLAGS=-O2 -g".to_string(), "install".to_string()],
      PathBuf::from("/tmp"),
      BTreeMap::new(),
    )
    .unwrap();
    assert_eq!(inv.to_string(), "make 'CFLAGS=-O2 -g' install");
  }

  #[test]
  fn from_argv_rejects_empty() {
    assert!(Invocation::from_argv(&[], PathBuf::from("/"), BTreeMap::new()).is_none());
  }

  #[test]
  fn tail_keeps_last_lines() {
    assert_eq!(tail_lines("a\nb\nc\nd", 2), "c\nd");
    assert_eq!(tail_lines("a\nb", 10), "a\nb");
    assert_eq!(tail_lines("", 3), "");
  }

  #[test]
  fn exit_status_success_only_for_zero() {
    assert!(ExitStatus::Code(0).success());
    assert!(!ExitStatus::Code(2).success());
    assert!(!ExitStatus::TimedOut.success());
    assert_eq!(ExitStatus::Killed(Some(9)).to_string(), "killed by signal 9");
  }

  #[cfg(unix)]
  mod system {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str, cwd: PathBuf) -> Invocation {
      let mut env = BTreeMap::new();
      env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
      env.insert("GREETING".to_string(), "hello".to_string());
      Invocation {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), script.to_string()],
        cwd,
        env,
        timeout: None,
      }
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
      let temp = TempDir::new().unwrap();
      let out = SystemRunner
        .run(&sh("echo $GREETING; echo oops >&2; exit 3", temp.path().to_path_buf()))
        .await
        .unwrap();
      assert_eq!(out.status, ExitStatus::Code(3));
      assert_eq!(out.stdout.trim(), "hello");
      assert_eq!(out.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn environment_is_not_inherited() {
      let temp = TempDir::new().unwrap();
      let out = SystemRunner
        .run(&sh("echo \"[$HOME]\"", temp.path().to_path_buf()))
        .await
        .unwrap();
      assert_eq!(out.stdout.trim(), "[]");
    }

    #[tokio::test]
    async fn runs_in_requested_directory() {
      let temp = TempDir::new().unwrap();
      let cwd = dunce::canonicalize(temp.path()).unwrap();
      let out = SystemRunner.run(&sh("pwd", cwd.clone())).await.unwrap();
      assert_eq!(PathBuf::from(out.stdout.trim()), cwd);
    }

    #[tokio::test]
    async fn timeout_kills_process_and_keeps_output() {
      let temp = TempDir::new().unwrap();
      let inv = sh("echo started; echo warming up >&2; sleep 5", temp.path().to_path_buf())
        .with_timeout(Some(Duration::from_millis(500)));
      let out = SystemRunner.run(&inv).await.unwrap();
      assert_eq!(out.status, ExitStatus::TimedOut);
      assert!(out.duration < Duration::from_secs(5));
      assert_eq!(out.stdout.trim(), "started");
      assert_eq!(out.stderr.trim(), "warming up");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
      let temp = TempDir::new().unwrap();
      let mut inv = sh("true", temp.path().to_path_buf());
      inv.program = "/nonexistent/omnirig-no-such-binary".to_string();
      assert!(SystemRunner.run(&inv).await.is_err());
    }
  }
}
