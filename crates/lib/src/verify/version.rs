//! Version matching.

use std::sync::LazyLock;

use regex::Regex;

static VERSION_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\.?\d)+").expect("valid version pattern"));

/// The numeric part of a version string: the first run of digits and dots.
///
/// ```
/// use omnirig_lib::verify::version::short_version;
///
/// assert_eq!(short_version("1:7.24.0-1"), Some("1"));
/// assert_eq!(short_version("7.24.0~rc.3-1"), Some("7.24.0"));
/// assert_eq!(short_version("nightly"), None);
/// ```
pub fn short_version(expected: &str) -> Option<&str> {
  VERSION_PATTERN.find(expected).map(|m| m.as_str())
}

/// The text that must appear in command output for `expected` to match.
pub fn version_needle(expected: &str, prefix: Option<&str>) -> Option<String> {
  short_version(expected).map(|short| format!("{}{short}", prefix.unwrap_or_default()))
}

/// Does `actual` report `expected`?
///
/// Returns `None` when `expected` contains no version number.
pub fn matches_version(actual: &str, expected: &str, prefix: Option<&str>) -> Option<bool> {
  version_needle(expected, prefix).map(|needle| actual.contains(&needle))
}
