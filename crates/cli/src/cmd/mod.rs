mod build;
mod info;
mod plan;
mod run;
mod verify;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::runtime::Runtime;
use tracing::debug;

use omnirig_lib::execute::{CancelFlag, ExecuteConfig};
use omnirig_lib::platform::paths;
use omnirig_lib::report::Verdict;
use omnirig_lib::target::{ConfigError, TargetDefinition, find_target};

use crate::output::{OutputFormat, print_error, print_warning};

pub use build::cmd_build;
pub use info::cmd_info;
pub use plan::cmd_plan;
pub use run::cmd_run;
pub use verify::cmd_verify;

/// Options shared by every command.
pub struct Settings {
  pub targets_dir: PathBuf,
  pub config: ExecuteConfig,
  pub output: OutputFormat,
  pub verbose: bool,
}

impl Settings {
  pub fn new(
    targets_dir: Option<PathBuf>,
    root: Option<PathBuf>,
    timeout: Option<Duration>,
    jobs: Option<usize>,
    output: OutputFormat,
    verbose: bool,
  ) -> Self {
    let mut config = ExecuteConfig::default();
    if let Some(root) = root {
      config.root_dir = root;
    }
    if timeout.is_some() {
      config.default_timeout = timeout;
    }
    if let Some(jobs) = jobs {
      config.parallelism = jobs.max(1);
    }

    Self {
      targets_dir: targets_dir.unwrap_or_else(paths::targets_dir),
      config,
      output,
      verbose,
    }
  }

  pub fn load(&self, target: &str) -> Result<TargetDefinition, ConfigError> {
    debug!(target = %target, targets_dir = %self.targets_dir.display(), "loading target");
    find_target(target, &self.targets_dir)
  }
}

/// Report a configuration error and produce its exit status.
fn config_failure(err: &ConfigError) -> u8 {
  print_error(&err.to_string());
  exit_status(Verdict::ConfigInvalid)
}

fn exit_status(verdict: Verdict) -> u8 {
  u8::try_from(verdict.exit_code()).unwrap_or(1)
}

/// Create the runtime for one command, with Ctrl-C wired to `cancel`.
///
/// Cancellation is cooperative: the running step finishes, nothing after it starts.
fn runtime(cancel: &CancelFlag) -> Result<Runtime> {
  let rt = Runtime::new().context("Failed to create async runtime")?;
  let cancel = cancel.clone();
  rt.spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      print_warning("interrupted, stopping after the current step");
      cancel.cancel();
    }
  });
  Ok(rt)
}

fn display_path(path: &Path) -> String {
  dunce::simplified(path).display().to_string()
}
