//! Names and defaults shared across the crate.

pub const APP_NAME: &str = "omnirig";

/// Overrides the parent directory of default install roots.
pub const ROOT_ENV: &str = "OMNIRIG_ROOT";

/// Overrides the directory searched for `<target>.toml` definitions.
pub const TARGETS_ENV: &str = "OMNIRIG_TARGETS";

/// File extension of target definitions.
pub const TARGET_FILE_EXT: &str = "toml";

/// Build receipt written into the install root after a successful build.
pub const BUILD_RECEIPT_FILE: &str = ".omnirig-build.json";

/// Variables taken from the process environment when a target does not list its own.
pub const DEFAULT_INHERITED_VARS: &[&str] = &[
  "PATH",
  "HOME",
  "USER",
  "LANG",
  "TMPDIR",
  "TEMP",
  "TMP",
  "SYSTEMROOT",
  "USERPROFILE",
];

/// Lines of captured process output kept in rendered diagnostics.
pub const OUTPUT_TAIL_LINES: usize = 40;

/// Lines read from a log file by a `log-tail` diagnostic without an explicit count.
pub const DEFAULT_LOG_TAIL_LINES: usize = 100;

/// Program used for repository steps.
pub const DEFAULT_GIT_PROGRAM: &str = "git";
