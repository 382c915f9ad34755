//! Environment resolution.
//!
//! Builds the [`ExecutionContext`] of a target: the variables inherited from
//! the process environment, overlaid with the target's own variables, whose
//! values may reference each other through `$${var:NAME}`.
//!
//! Substitution runs in passes. Each pass resolves every overlay variable whose
//! references are already final, so a pass either makes progress or proves the
//! remaining variables reference each other. The number of passes is bounded
//! by the number of overlay variables.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::{debug, trace};

use crate::placeholder::{self, PlaceholderError, Resolver, Segment};
use crate::target::{ConfigError, TargetDefinition};

/// Resolved environment and install root for one target run.
///
/// Owned by exactly one build or verification run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
  target: String,
  version: String,
  install_root: PathBuf,
  install_root_str: String,
  base: BTreeMap<String, String>,
  env: BTreeMap<String, String>,
}

/// Inputs to [`resolve_context`] that do not come from the definition.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions<'a> {
  /// The process environment (or a stand-in for it).
  pub base_env: &'a BTreeMap<String, String>,

  /// Parent of the install root when the definition declares none.
  pub default_root: &'a Path,

  /// Forces the install root, e.g. when verifying an existing install.
  pub install_root: Option<&'a Path>,

  /// Replaces the pinned version, e.g. an expected version supplied at verify time.
  pub version: Option<&'a str>,
}

impl ExecutionContext {
  pub fn target(&self) -> &str {
    &self.target
  }

  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn install_root(&self) -> &Path {
    &self.install_root
  }

  /// The merged environment handed to every process.
  pub fn env(&self) -> &BTreeMap<String, String> {
    &self.env
  }

  /// Resolve a template against this context.
  ///
  /// `context` describes where the template came from and only appears in errors.
  pub fn resolve(&self, template: &str, context: &str) -> Result<String, ConfigError> {
    placeholder::substitute(template, self).map_err(|e| ConfigError::template(&self.target, context, e))
  }

  /// Resolve a path template; relative results are joined onto the install root.
  pub fn resolve_path(&self, template: &str, context: &str) -> Result<PathBuf, ConfigError> {
    let resolved = PathBuf::from(self.resolve(template, context)?);
    if resolved.is_absolute() {
      Ok(resolved)
    } else {
      Ok(self.install_root.join(resolved))
    }
  }

  /// Merge a step-local overlay over the context environment.
  ///
  /// Overlay values are resolved against the context, not against each other.
  pub fn overlay(&self, overlay: &BTreeMap<String, String>, context: &str) -> Result<BTreeMap<String, String>, ConfigError> {
    let mut merged = self.env.clone();
    for (key, template) in overlay {
      let value = self.resolve(template, &format!("{context} env.{key}"))?;
      merged.insert(key.clone(), value);
    }
    Ok(merged)
  }
}

impl Resolver for ExecutionContext {
  fn resolve_out(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.install_root_str)
  }

  fn resolve_name(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.target)
  }

  fn resolve_version(&self) -> Result<&str, PlaceholderError> {
    Ok(&self.version)
  }

  fn resolve_var(&self, name: &str) -> Result<&str, PlaceholderError> {
    lookup(&self.env, name).ok_or_else(|| PlaceholderError::UnresolvedVar(name.to_string()))
  }

  fn resolve_base(&self, name: &str) -> Result<&str, PlaceholderError> {
    lookup(&self.base, name).ok_or_else(|| PlaceholderError::UnresolvedBase(name.to_string()))
  }
}

/// Resolver used while the context is still being assembled.
struct PartialResolver<'a> {
  target: &'a str,
  version: &'a str,
  out: Option<&'a str>,
  base: &'a BTreeMap<String, String>,
  vars: &'a BTreeMap<String, String>,
}

impl Resolver for PartialResolver<'_> {
  fn resolve_out(&self) -> Result<&str, PlaceholderError> {
    self.out.ok_or(PlaceholderError::Unavailable("out"))
  }

  fn resolve_name(&self) -> Result<&str, PlaceholderError> {
    Ok(self.target)
  }

  fn resolve_version(&self) -> Result<&str, PlaceholderError> {
    Ok(self.version)
  }

  fn resolve_var(&self, name: &str) -> Result<&str, PlaceholderError> {
    lookup(self.vars, name).ok_or_else(|| PlaceholderError::UnresolvedVar(name.to_string()))
  }

  fn resolve_base(&self, name: &str) -> Result<&str, PlaceholderError> {
    lookup(self.base, name).ok_or_else(|| PlaceholderError::UnresolvedBase(name.to_string()))
  }
}

fn lookup<'m>(map: &'m BTreeMap<String, String>, name: &str) -> Option<&'m str> {
  map.get(name).map(String::as_str)
}

/// Compute the execution context of `def`.
///
/// This is a pure function of its inputs: the same definition and options
/// always produce the same context.
///
/// # Errors
///
/// - [`ConfigError::Template`] when a template is malformed or references an undefined variable
/// - [`ConfigError::CyclicReference`] when overlay variables reference each other in a cycle
pub fn resolve_context(def: &TargetDefinition, opts: &ResolveOptions<'_>) -> Result<ExecutionContext, ConfigError> {
  let target = def.name.as_str();
  let version = opts.version.unwrap_or(&def.version);

  let base: BTreeMap<String, String> = def
    .inherited_names()
    .into_iter()
    .filter_map(|name| opts.base_env.get(name).map(|value| (name.to_string(), value.clone())))
    .collect();

  let install_root = resolve_install_root(def, opts, version, &base)?;
  let install_root_str = install_root
    .to_str()
    .ok_or_else(|| ConfigError::invalid(target, format!("install root {} is not valid UTF-8", install_root.display())))?
    .to_string();

  let env = resolve_overlay(def, version, &install_root_str, &base)?;

  debug!(
    target = %target,
    install_root = %install_root.display(),
    inherited = base.len(),
    overlay = def.env.len(),
    "resolved execution context"
  );

  Ok(ExecutionContext {
    target: target.to_string(),
    version: version.to_string(),
    install_root,
    install_root_str,
    base,
    env,
  })
}

fn resolve_install_root(
  def: &TargetDefinition,
  opts: &ResolveOptions<'_>,
  version: &str,
  base: &BTreeMap<String, String>,
) -> Result<PathBuf, ConfigError> {
  let root = match (opts.install_root, &def.install_root) {
    (Some(root), _) => root.to_path_buf(),
    (None, Some(template)) => {
      // The overlay may reference the install root, so the root itself only sees inherited values.
      let resolver = PartialResolver {
        target: &def.name,
        version,
        out: None,
        base,
        vars: base,
      };
      let resolved = placeholder::substitute(template, &resolver)
        .map_err(|e| ConfigError::template(&def.name, "install_root", e))?;
      PathBuf::from(resolved)
    }
    (None, None) => opts.default_root.join(&def.name),
  };

  let absolute = std::path::absolute(&root)
    .map_err(|e| ConfigError::invalid(&def.name, format!("invalid install root {}: {e}", root.display())))?;
  Ok(dunce::simplified(&absolute).to_path_buf())
}

fn resolve_overlay(
  def: &TargetDefinition,
  version: &str,
  out: &str,
  base: &BTreeMap<String, String>,
) -> Result<BTreeMap<String, String>, ConfigError> {
  let mut pending: BTreeMap<&str, Vec<Segment>> = BTreeMap::new();
  for (name, template) in &def.env {
    let segments =
      placeholder::parse(template).map_err(|e| ConfigError::template(&def.name, format!("env.{name}"), e))?;
    pending.insert(name.as_str(), segments);
  }

  let mut resolved = base.clone();
  let max_passes = pending.len() + 1;

  for pass in 0..max_passes {
    if pending.is_empty() {
      break;
    }

    let ready: Vec<&str> = pending
      .iter()
      .filter(|(_, segments)| {
        placeholder::var_references(segments)
          .iter()
          .all(|name| !pending.contains_key(name))
      })
      .map(|(name, _)| *name)
      .collect();

    if ready.is_empty() {
      break;
    }

    for name in ready {
      let Some(segments) = pending.remove(name) else {
        continue;
      };
      let value = {
        let resolver = PartialResolver {
          target: &def.name,
          version,
          out: Some(out),
          base,
          vars: &resolved,
        };
        placeholder::substitute_segments(&segments, &resolver)
          .map_err(|e| ConfigError::template(&def.name, format!("env.{name}"), e))?
      };
      resolved.insert(name.to_string(), value);
    }

    trace!(target = %def.name, pass, remaining = pending.len(), "substitution pass");
  }

  if !pending.is_empty() {
    return Err(ConfigError::CyclicReference {
      target: def.name.clone(),
      cycle: find_cycle(&pending),
    });
  }

  Ok(resolved)
}

/// Name the variables of one reference cycle among the unresolved variables.
///
/// The cycle starts at its alphabetically first member and ends where it began.
fn find_cycle(pending: &BTreeMap<&str, Vec<Segment>>) -> Vec<String> {
  let mut graph: DiGraph<&str, ()> = DiGraph::new();
  let nodes: BTreeMap<&str, NodeIndex> = pending.keys().map(|name| (*name, graph.add_node(*name))).collect();

  for (name, segments) in pending {
    for reference in placeholder::var_references(segments) {
      if let Some(&to) = nodes.get(reference) {
        graph.update_edge(nodes[name], to, ());
      }
    }
  }

  let cyclic: Vec<BTreeSet<&str>> = tarjan_scc(&graph)
    .into_iter()
    .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
    .map(|scc| scc.into_iter().map(|idx| graph[idx]).collect())
    .collect();

  let Some(members) = cyclic.into_iter().min_by_key(|members| members.first().copied()) else {
    return pending.keys().map(|name| name.to_string()).collect();
  };

  let Some(&start) = members.first() else {
    return Vec::new();
  };

  // Walk successors inside the component, preferring the smallest unvisited name.
  let mut path = vec![start];
  let mut current = start;
  loop {
    let next = graph
      .neighbors(nodes[current])
      .map(|idx| graph[idx])
      .filter(|name| members.contains(name) && !path.contains(name))
      .min();
    match next {
      Some(name) => {
        path.push(name);
        current = name;
      }
      None => break,
    }
  }
  path.push(start);

  path.into_iter().map(str::to_string).collect()
}
