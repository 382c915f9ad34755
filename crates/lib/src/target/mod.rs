//! Target definitions: data model, TOML loading and lookup.

mod error;
mod fields;
mod types;

pub use error::ConfigError;
pub use types::*;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::consts::TARGET_FILE_EXT;

impl TargetDefinition {
  /// Parse and validate a definition from TOML text.
  ///
  /// `origin` is only used in error messages.
  pub fn from_toml(text: &str, origin: &Path) -> Result<Self, ConfigError> {
    let parse_error = |e: toml::de::Error| ConfigError::Parse {
      path: origin.to_path_buf(),
      message: e.to_string(),
    };
    let definition: TargetDefinition = toml::from_str(text).map_err(parse_error)?;
    let document: toml::Table = toml::from_str(text).map_err(parse_error)?;
    fields::check_unknown_fields(&definition.name, &document)?;
    definition.validate()?;
    Ok(definition)
  }
}

/// Load a target definition from a TOML file.
pub fn load_target(path: &Path) -> Result<TargetDefinition, ConfigError> {
  let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  let definition = TargetDefinition::from_toml(&text, path)?;

  if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
    && stem != definition.name
  {
    warn!(file = %path.display(), name = %definition.name, "target name differs from file name");
  }

  debug!(target = %definition.name, steps = definition.steps.len(), "loaded target definition");
  Ok(definition)
}

/// Find the definition file for `target`.
///
/// `target` is either a path to a `.toml` file or a bare name looked up as
/// `<targets_dir>/<name>.toml`.
pub fn locate_target(target: &str, targets_dir: &Path) -> Result<PathBuf, ConfigError> {
  let direct = Path::new(target);
  let looks_like_path =
    direct.extension().is_some_and(|ext| ext == TARGET_FILE_EXT) || direct.components().count() > 1;

  if looks_like_path && direct.is_file() {
    return Ok(direct.to_path_buf());
  }

  let candidate = targets_dir.join(format!("{target}.{TARGET_FILE_EXT}"));
  if candidate.is_file() {
    return Ok(candidate);
  }

  Err(ConfigError::NotFound {
    name: target.to_string(),
    searched: targets_dir.to_path_buf(),
  })
}

/// Locate and load a target by name or path.
pub fn find_target(target: &str, targets_dir: &Path) -> Result<TargetDefinition, ConfigError> {
  let path = locate_target(target, targets_dir)?;
  load_target(&path)
}
