//! Implementation of the `omnirig build` command.
//!
//! Builds every named target, in parallel up to `--jobs`, and exits with the
//! most severe outcome: 0 when all builds succeed, 1 when a step fails, 2 for
//! configuration errors.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;

use omnirig_lib::execute::{BuildResult, CancelFlag, SystemRunner};
use omnirig_lib::pipeline::build_targets;
use omnirig_lib::report::{Verdict, render_build_error};

use crate::output::{format_duration, print_diagnostics, print_error, print_json, print_stat, print_success, truncate_hash};

use super::{Settings, config_failure, display_path, exit_status, runtime};

#[derive(Serialize)]
struct BuildEntry<'a> {
  target: &'a str,
  verdict: Verdict,
  #[serde(skip_serializing_if = "Option::is_none")]
  result: Option<&'a BuildResult>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
}

pub fn cmd_build(settings: &Settings, targets: &[String]) -> Result<u8> {
  let mut definitions = Vec::with_capacity(targets.len());
  for target in targets {
    match settings.load(target) {
      Ok(definition) => definitions.push(definition),
      Err(e) => return Ok(config_failure(&e)),
    }
  }

  let cancel = CancelFlag::new();
  let rt = runtime(&cancel)?;
  let results = match rt.block_on(build_targets(&definitions, &settings.config, Arc::new(SystemRunner), &cancel)) {
    Ok(results) => results,
    Err(e) => return Ok(config_failure(&e)),
  };

  let verdict = Verdict::worst(
    results
      .iter()
      .filter_map(|(_, result)| result.as_ref().err().map(Verdict::from_build_error)),
  );

  if settings.output.is_json() {
    let entries: Vec<_> = results
      .iter()
      .map(|(target, result)| BuildEntry {
        target,
        verdict: result.as_ref().map_or_else(Verdict::from_build_error, |_| Verdict::Success),
        result: result.as_ref().ok(),
        error: result.as_ref().err().map(render_build_error),
      })
      .collect();
    print_json(&entries)?;
    return Ok(exit_status(verdict));
  }

  for (target, result) in &results {
    match result {
      Ok(build) => {
        print_success(&format!(
          "Built {} {} into {}",
          build.target,
          build.version,
          display_path(&build.install_root)
        ));
        let total: u64 = build.steps.iter().map(|s| s.duration_ms).sum();
        print_stat("Steps", &build.steps.len().to_string());
        print_stat("Duration", &format_duration(Duration::from_millis(total)));
        print_stat("Plan", truncate_hash(&build.digest));
        if settings.verbose {
          for step in &build.steps {
            print_stat(
              &format!("  {}. {}", step.index + 1, step.kind),
              &format!("{} ({}ms)", step.description, step.duration_ms),
            );
          }
        }
      }
      Err(e) => {
        print_error(&format!("Build of {target} failed"));
        print_diagnostics(&render_build_error(e));
      }
    }
  }

  Ok(exit_status(verdict))
}
