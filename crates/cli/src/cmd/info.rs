//! Implementation of the `omnirig info` command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;

use omnirig_lib::consts::TARGET_FILE_EXT;
use omnirig_lib::platform::platform_triple;

use crate::output::{print_info, print_json, print_stat};

use super::{Settings, display_path};

#[derive(Serialize)]
struct Info<'a> {
  version: &'a str,
  platform: String,
  root_dir: &'a Path,
  targets_dir: &'a Path,
  targets: Vec<String>,
}

pub fn cmd_info(settings: &Settings) -> Result<u8> {
  let info = Info {
    version: env!("CARGO_PKG_VERSION"),
    platform: platform_triple(),
    root_dir: &settings.config.root_dir,
    targets_dir: &settings.targets_dir,
    targets: available_targets(&settings.targets_dir),
  };

  if settings.output.is_json() {
    print_json(&info)?;
    return Ok(0);
  }

  print_info(&format!("omnirig v{}", info.version));
  print_stat("Platform", &info.platform);
  print_stat("Install roots", &display_path(info.root_dir));
  print_stat("Targets dir", &display_path(info.targets_dir));
  if info.targets.is_empty() {
    print_stat("Targets", "(none)");
  } else {
    print_stat("Targets", &info.targets.join(", "));
  }

  Ok(0)
}

/// Names of the definition files in `dir`, sorted.
fn available_targets(dir: &Path) -> Vec<String> {
  let Ok(entries) = std::fs::read_dir(dir) else {
    return Vec::new();
  };
  let mut names: Vec<String> = entries
    .filter_map(|entry| entry.ok().map(|e| e.path()))
    .filter(|path: &PathBuf| path.extension().is_some_and(|ext| ext == TARGET_FILE_EXT))
    .filter_map(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
    .collect();
  names.sort();
  names
}
