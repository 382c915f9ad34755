//! Target definition data model.
//!
//! A [`TargetDefinition`] is the declarative description of one buildable and
//! verifiable unit. It is deserialized from TOML, validated once, specialized
//! for the running platform with [`TargetDefinition::for_platform`] and never
//! mutated afterwards.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::consts::DEFAULT_INHERITED_VARS;
use crate::platform::os::Os;

use super::ConfigError;

/// One named buildable/verifiable unit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDefinition {
  pub name: String,

  /// Pinned version, available to templates as `$${version}`.
  pub version: String,

  /// Install root template. Defaults to `<root_dir>/<name>`.
  #[serde(default)]
  pub install_root: Option<String>,

  /// Variables passed through from the process environment.
  #[serde(default)]
  pub inherit: Option<Vec<String>>,

  /// File (relative to the install root) that receives the version manifest after a build.
  #[serde(default)]
  pub version_manifest: Option<String>,

  /// Environment overlay: variable name to value template.
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  #[serde(default)]
  pub steps: Vec<StepSpec>,

  #[serde(default)]
  pub verify: VerifySpec,

  /// Per-OS overrides, keyed by platform identifier (`linux`, `darwin`, `windows`).
  #[serde(default)]
  pub platform: BTreeMap<String, PlatformOverride>,
}

/// A declared build step.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StepSpec {
  #[serde(flatten)]
  pub action: StepAction,

  #[serde(default)]
  pub description: Option<String>,

  /// Working directory template; relative paths are joined onto the install root.
  #[serde(default)]
  pub cwd: Option<String>,

  /// Step-local environment overlay, resolved against the target environment.
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Timeout in humantime syntax, e.g. `"90s"` or `"30m"`.
  #[serde(default)]
  pub timeout: Option<String>,

  /// Exit codes treated as success. Defaults to `[0]`.
  #[serde(default)]
  pub success_codes: Option<Vec<i32>>,
}

/// What a build step does.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum StepAction {
  /// Clone a repository into `dest`.
  FetchRepo { url: String, dest: String },

  /// Pin an already cloned repository to a ref.
  CheckoutRef { repo: String, reference: String },

  /// Initialize the submodules of an already cloned repository.
  InitSubmodules {
    repo: String,
    #[serde(default)]
    recursive: bool,
  },

  /// Run an arbitrary build command, given as an argument vector.
  RunBuildCommand { argv: Vec<String> },
}

impl StepAction {
  pub fn kind(&self) -> &'static str {
    match self {
      StepAction::FetchRepo { .. } => "fetch-repo",
      StepAction::CheckoutRef { .. } => "checkout-ref",
      StepAction::InitSubmodules { .. } => "init-submodules",
      StepAction::RunBuildCommand { .. } => "run-build-command",
    }
  }
}

/// Post-install checks and the diagnostics gathered when they fail.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifySpec {
  #[serde(default)]
  pub assertions: Vec<AssertionSpec>,

  #[serde(default)]
  pub diagnostics: Vec<DiagnosticSpec>,
}

/// A declared assertion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssertionSpec {
  #[serde(flatten)]
  pub check: CheckSpec,

  #[serde(default)]
  pub description: Option<String>,

  /// Timeout for command extractors, in humantime syntax.
  #[serde(default)]
  pub timeout: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CheckSpec {
  FileExists {
    path: String,
  },

  /// Trimmed first line of `path` must contain `expected`.
  FileFirstLine {
    path: String,
    expected: String,
  },

  /// Stdout of `argv` must contain `expected`.
  CommandOutput {
    argv: Vec<String>,
    expected: String,
  },

  /// Stdout of `argv` must contain the numeric part of `expected`, optionally prefixed.
  Version {
    argv: Vec<String>,
    #[serde(default)]
    expected: Option<String>,
    #[serde(default)]
    prefix: Option<String>,
  },
}

/// Auxiliary output captured for a failing verification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum DiagnosticSpec {
  LogTail {
    label: String,
    path: String,
    #[serde(default)]
    lines: Option<usize>,
  },

  Command {
    label: String,
    argv: Vec<String>,
    #[serde(default)]
    timeout: Option<String>,
  },
}

/// Platform-specific replacements applied by [`TargetDefinition::for_platform`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PlatformOverride {
  #[serde(default)]
  pub install_root: Option<String>,

  /// Merged over the target overlay; these entries win.
  #[serde(default)]
  pub env: BTreeMap<String, String>,

  /// Replaces the target's steps entirely.
  #[serde(default)]
  pub steps: Option<Vec<StepSpec>>,

  /// Replaces the target's verification suite entirely.
  #[serde(default)]
  pub verify: Option<VerifySpec>,
}

impl TargetDefinition {
  /// Check the invariants deserialization cannot express.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let name = self.name.as_str();

    if name.is_empty() {
      return Err(ConfigError::invalid("<unnamed>", "target name is empty"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')) {
      return Err(ConfigError::invalid(
        name,
        "target name may only contain ASCII letters, digits, '-', '_' and '.'",
      ));
    }
    if self.version.trim().is_empty() {
      return Err(ConfigError::invalid(name, "version is empty"));
    }

    let inherited = self.inherited_names();
    for var in self.env.keys().map(String::as_str).chain(inherited) {
      validate_var_name(name, var)?;
    }

    for (key, overlay) in &self.platform {
      key.parse::<Os>().map_err(|e| ConfigError::invalid(name, e.to_string()))?;
      for var in overlay.env.keys() {
        validate_var_name(name, var)?;
      }
    }

    Ok(())
  }

  /// Names of variables passed through from the process environment.
  pub fn inherited_names(&self) -> Vec<&str> {
    match &self.inherit {
      Some(names) => names.iter().map(String::as_str).collect(),
      None => DEFAULT_INHERITED_VARS.to_vec(),
    }
  }

  /// Produce the definition as seen on `os`, with its platform override applied.
  ///
  /// The returned definition has an empty `platform` table.
  pub fn for_platform(&self, os: Os) -> Result<TargetDefinition, ConfigError> {
    let mut selected: Option<&PlatformOverride> = None;
    for (key, overlay) in &self.platform {
      let key_os = key
        .parse::<Os>()
        .map_err(|e| ConfigError::invalid(&self.name, e.to_string()))?;
      if key_os == os {
        if selected.is_some() {
          return Err(ConfigError::invalid(
            &self.name,
            format!("platform '{os}' is declared more than once"),
          ));
        }
        selected = Some(overlay);
      }
    }

    let mut specialized = TargetDefinition {
      platform: BTreeMap::new(),
      ..self.clone()
    };

    if let Some(overlay) = selected {
      if let Some(root) = &overlay.install_root {
        specialized.install_root = Some(root.clone());
      }
      for (key, value) in &overlay.env {
        specialized.env.insert(key.clone(), value.clone());
      }
      if let Some(steps) = &overlay.steps {
        specialized.steps = steps.clone();
      }
      if let Some(verify) = &overlay.verify {
        specialized.verify = verify.clone();
      }
    }

    Ok(specialized)
  }
}

fn validate_var_name(target: &str, var: &str) -> Result<(), ConfigError> {
  if var.is_empty() || var.contains('=') || var.contains('\0') || var.chars().any(char::is_whitespace) {
    return Err(ConfigError::invalid(target, format!("invalid environment variable name '{var}'")));
  }
  Ok(())
}
