//! Implementation of the `omnirig plan` command.
//!
//! Resolves a target into its concrete steps and assertions and prints them.
//! Nothing is executed.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use omnirig_lib::pipeline::{VerifyOptions, plan_build, plan_verify};
use omnirig_lib::plan::{Pin, PlannedStep};
use omnirig_lib::verify::{Assertion, Diagnostic};

use crate::output::{print_info, print_json, print_stat, symbols};

use super::{Settings, config_failure, display_path};

#[derive(Serialize)]
struct PlanOutput<'a> {
  target: &'a str,
  version: &'a str,
  install_root: &'a Path,
  digest: String,
  steps: &'a [PlannedStep],
  pins: &'a [Pin],
  assertions: &'a [Assertion],
  diagnostics: &'a [Diagnostic],
}

pub fn cmd_plan(settings: &Settings, target: &str) -> Result<u8> {
  let definition = match settings.load(target) {
    Ok(definition) => definition,
    Err(e) => return Ok(config_failure(&e)),
  };

  let build = match plan_build(&definition, &settings.config) {
    Ok(plan) => plan,
    Err(e) => return Ok(config_failure(&e)),
  };
  let verify = match plan_verify(&definition, &settings.config, VerifyOptions::default()) {
    Ok(plan) => plan,
    Err(e) => return Ok(config_failure(&e)),
  };

  if settings.output.is_json() {
    print_json(&PlanOutput {
      target: build.target(),
      version: build.context.version(),
      install_root: build.install_root(),
      digest: build.digest(),
      steps: &build.steps,
      pins: &build.pins,
      assertions: &verify.assertions,
      diagnostics: &verify.diagnostics,
    })?;
    return Ok(0);
  }

  print_info(&format!(
    "Plan for {} {} into {}",
    build.target(),
    build.context.version(),
    display_path(build.install_root())
  ));
  print_stat("Digest", &build.digest());

  println!();
  println!("Steps:");
  for step in &build.steps {
    println!("  {}. [{}] {}", step.index + 1, step.kind, step.description);
    println!("     {} {}", symbols::ARROW, step.invocation);
    if settings.verbose {
      println!("     cwd: {}", display_path(&step.invocation.cwd));
      if let Some(timeout) = step.invocation.timeout {
        println!("     timeout: {}", humantime::format_duration(timeout));
      }
      if step.success_codes != [0] {
        println!("     success codes: {:?}", step.success_codes);
      }
    }
  }

  if !verify.assertions.is_empty() {
    println!();
    println!("Assertions:");
    for assertion in &verify.assertions {
      println!("  {}. [{}] {}", assertion.index + 1, assertion.check.kind(), assertion.description);
    }
  }

  if !verify.diagnostics.is_empty() {
    println!();
    println!("Diagnostics on failure:");
    for diagnostic in &verify.diagnostics {
      println!("  {} {}", symbols::INFO, diagnostic.label());
    }
  }

  Ok(0)
}
