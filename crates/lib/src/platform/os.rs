use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating system variants a target can specialize for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Os {
  #[serde(rename = "linux")]
  Linux,
  #[serde(rename = "darwin")]
  MacOs,
  #[serde(rename = "windows")]
  Windows,
}

impl Os {
  /// Detect the current operating system at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::OS {
      "linux" => Some(Self::Linux),
      "macos" => Some(Self::MacOs),
      "windows" => Some(Self::Windows),
      _ => None,
    }
  }

  /// Returns the lowercase string identifier for this OS
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Linux => "linux",
      Self::MacOs => "darwin",
      Self::Windows => "windows",
    }
  }
}

impl fmt::Display for Os {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// Error returned when a platform key in a target definition names no known OS.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform '{0}' (expected one of: linux, darwin, macos, windows)")]
pub struct UnknownOs(pub String);

impl FromStr for Os {
  type Err = UnknownOs;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "linux" => Ok(Self::Linux),
      "darwin" | "macos" => Ok(Self::MacOs),
      "windows" => Ok(Self::Windows),
      _ => Err(UnknownOs(s.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn current_returns_supported_os() {
    assert!(Os::current().is_some(), "Current OS should be supported");
  }

  #[test]
  fn macos_uses_darwin_identifier() {
    assert_eq!(Os::MacOs.as_str(), "darwin");
  }

  #[test]
  fn parses_platform_keys() {
    assert_eq!("linux".parse::<Os>().unwrap(), Os::Linux);
    assert_eq!("macos".parse::<Os>().unwrap(), Os::MacOs);
    assert_eq!("Darwin".parse::<Os>().unwrap(), Os::MacOs);
    assert_eq!("windows".parse::<Os>().unwrap(), Os::Windows);
    assert_eq!("suse".parse::<Os>(), Err(UnknownOs("suse".to_string())));
  }
}
