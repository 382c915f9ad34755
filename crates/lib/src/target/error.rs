use std::path::PathBuf;

use thiserror::Error;

use crate::placeholder::PlaceholderError;

/// Errors detected before any external command runs.
///
/// Every variant is fatal for the target it names: nothing is retried and no
/// step is executed once one of these is returned.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read target definition {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse target definition {}: {message}", .path.display())]
  Parse { path: PathBuf, message: String },

  #[error("target '{name}' not found in {}", .searched.display())]
  NotFound { name: String, searched: PathBuf },

  #[error("target '{target}': {message}")]
  Invalid { target: String, message: String },

  /// A template could not be resolved, including references to undefined variables.
  #[error("target '{target}': {context}: {source}")]
  Template {
    target: String,
    context: String,
    #[source]
    source: PlaceholderError,
  },

  /// Environment substitution did not converge.
  #[error("target '{target}': cyclic variable reference: {}", .cycle.join(" -> "))]
  CyclicReference { target: String, cycle: Vec<String> },

  #[error("target '{target}': step {} is invalid: {message}", .index + 1)]
  InvalidStep {
    target: String,
    index: usize,
    message: String,
  },

  #[error("targets '{first}' and '{second}' share install root {}", .root.display())]
  SharedInstallRoot {
    first: String,
    second: String,
    root: PathBuf,
  },
}

impl ConfigError {
  pub(crate) fn invalid(target: &str, message: impl Into<String>) -> Self {
    Self::Invalid {
      target: target.to_string(),
      message: message.into(),
    }
  }

  pub(crate) fn template(target: &str, context: impl Into<String>, source: PlaceholderError) -> Self {
    Self::Template {
      target: target.to_string(),
      context: context.into(),
      source,
    }
  }
}
