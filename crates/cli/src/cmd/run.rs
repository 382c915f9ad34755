//! Implementation of the `omnirig run` command.
//!
//! Builds a target and verifies the fresh install. Exit status: 0 success,
//! 1 build failure, 2 configuration error, 3 verification failure.

use anyhow::Result;

use omnirig_lib::execute::{CancelFlag, SystemRunner};
use omnirig_lib::pipeline::run_target;
use omnirig_lib::report::Verdict;
use omnirig_lib::verify::HostFs;

use crate::output::{print_diagnostics, print_error, print_json, print_success};

use super::{Settings, config_failure, display_path, exit_status, runtime, verify::print_report};

pub fn cmd_run(settings: &Settings, target: &str) -> Result<u8> {
  let definition = match settings.load(target) {
    Ok(definition) => definition,
    Err(e) => return Ok(config_failure(&e)),
  };

  let cancel = CancelFlag::new();
  let rt = runtime(&cancel)?;
  let summary = rt.block_on(run_target(&definition, &settings.config, &SystemRunner, &HostFs, &cancel));

  if settings.output.is_json() {
    print_json(&summary)?;
    return Ok(exit_status(summary.verdict));
  }

  match &summary.build {
    Some(build) => print_success(&format!(
      "Built {} {} into {}",
      build.target,
      build.version,
      display_path(&build.install_root)
    )),
    None => match summary.verdict {
      Verdict::ConfigInvalid => print_error(&format!("Definition of {} is invalid; nothing was run", summary.target)),
      Verdict::Cancelled => print_error(&format!("Build of {} was cancelled", summary.target)),
      _ => print_error(&format!("Build of {} failed", summary.target)),
    },
  }
  if let Some(report) = &summary.verification {
    print_report(report);
  }
  if let Some(error) = &summary.error {
    print_diagnostics(error);
  }

  Ok(exit_status(summary.verdict))
}
