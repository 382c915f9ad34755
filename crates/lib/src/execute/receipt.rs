//! Records written into the install root after a successful build.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::consts::BUILD_RECEIPT_FILE;
use crate::plan::BuildPlan;

use super::types::StepRecord;

/// Current receipt format version.
pub const RECEIPT_FORMAT: u32 = 1;

/// Contents of the build receipt file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReceipt {
  pub format: u32,
  pub target: String,
  pub version: String,
  pub platform: String,
  /// Digest of the plan that produced this install.
  pub digest: String,
  pub steps: Vec<StepRecord>,
}

pub fn receipt_path(install_root: &Path) -> PathBuf {
  install_root.join(BUILD_RECEIPT_FILE)
}

pub(super) async fn write_receipt(install_root: &Path, receipt: &BuildReceipt) -> std::io::Result<()> {
  let content = serde_json::to_string_pretty(receipt).map_err(std::io::Error::other)?;
  let path = receipt_path(install_root);
  fs::write(&path, format!("{content}\n")).await?;
  debug!(path = %path.display(), "wrote build receipt");
  Ok(())
}

/// Read the receipt of a previous build, if there is a readable one.
pub fn read_receipt(install_root: &Path) -> Option<BuildReceipt> {
  let path = receipt_path(install_root);
  let content = std::fs::read_to_string(&path).ok()?;
  match serde_json::from_str(&content) {
    Ok(receipt) => Some(receipt),
    Err(e) => {
      warn!(path = %path.display(), error = %e, "ignoring unreadable build receipt");
      None
    }
  }
}

/// Text of the version manifest: `<name> <version>` then one `<component> <ref>` line per pin.
pub fn version_manifest(plan: &BuildPlan) -> String {
  let mut text = format!("{} {}\n", plan.target(), plan.context.version());
  for pin in &plan.pins {
    text.push_str(&format!("{} {}\n", pin.component, pin.reference));
  }
  text
}

pub(super) async fn write_version_manifest(plan: &BuildPlan, path: &Path) -> std::io::Result<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).await?;
  }
  fs::write(path, version_manifest(plan)).await?;
  debug!(path = %path.display(), "wrote version manifest");
  Ok(())
}
