//! Placeholder parsing and substitution for target templates.
//!
//! Every string in a target definition (environment values, step arguments,
//! working directories, assertion paths and expectations) is a template that
//! is resolved against an execution context before anything runs.
//!
//! # Placeholder Formats
//!
//! - `$${out}` - the target's install root
//! - `$${name}` - the target name
//! - `$${version}` - the pinned (or overridden) target version
//! - `$${var:NAME}` - the merged value of variable `NAME`
//! - `$${base:NAME}` - the inherited value of `NAME`, ignoring the target overlay
//!
//! # Shell Variables
//!
//! Single `$` characters pass through unchanged, so shell variables like
//! `$HOME` and `$PATH` work naturally without any escaping.
//!
//! # Escaping
//!
//! Use `$$$` before `{` to produce a literal `$${` sequence.
//!
//! # Example
//!
//! ```
//! use omnirig_lib::placeholder::{parse, Segment, Placeholder};
//!
//! let segments = parse("-L$${out}/embedded/lib:$HOME").unwrap();
//! assert_eq!(segments, vec![
//!     Segment::Literal("-L".to_string()),
//!     Segment::Placeholder(Placeholder::Out),
//!     Segment::Literal("/embedded/lib:$HOME".to_string()),
//! ]);
//! ```

use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placeholder {
  /// `$${out}` - the install root
  Out,

  /// `$${name}` - the target name
  Name,

  /// `$${version}` - the target version
  Version,

  /// `$${var:NAME}` - a merged environment variable
  Var(String),

  /// `$${base:NAME}` - an inherited environment variable
  Base(String),
}

/// A segment of parsed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders)
  Literal(String),

  /// A placeholder to be resolved
  Placeholder(Placeholder),
}

/// Errors that can occur during placeholder parsing or resolution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder type: {0}")]
  UnknownType(String),

  #[error("malformed placeholder: {0}")]
  Malformed(String),

  #[error("undefined variable '{0}'")]
  UnresolvedVar(String),

  #[error("variable '{0}' is not inherited from the environment")]
  UnresolvedBase(String),

  #[error("'$${{{0}}}' is not available here")]
  Unavailable(&'static str),
}

/// Trait for resolving placeholder values.
pub trait Resolver {
  /// Resolve the install root.
  fn resolve_out(&self) -> Result<&str, PlaceholderError>;

  /// Resolve the target name.
  fn resolve_name(&self) -> Result<&str, PlaceholderError>;

  /// Resolve the target version.
  fn resolve_version(&self) -> Result<&str, PlaceholderError>;

  /// Resolve a merged variable by name.
  fn resolve_var(&self, name: &str) -> Result<&str, PlaceholderError>;

  /// Resolve an inherited variable by name.
  fn resolve_base(&self, name: &str) -> Result<&str, PlaceholderError>;
}

/// Parse a string containing placeholders into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is malformed (unclosed, unknown type, etc.)
pub fn parse(input: &str) -> Result<Vec<Segment>, PlaceholderError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch != '$' {
      literal.push(ch);
      continue;
    }

    match chars.peek() {
      Some((_, '$')) => {
        chars.next(); // second $

        match chars.peek() {
          Some((_, '$')) => {
            chars.next(); // third $

            if let Some((_, '{')) = chars.peek() {
              // Escaped: $$${ -> $${ (literal)
              literal.push_str("$${");
              chars.next();
            } else {
              literal.push_str("$$$");
            }
          }
          Some((_, '{')) => {
            chars.next(); // {

            if !literal.is_empty() {
              segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }

            let mut content = String::new();
            let mut found_close = false;

            for (_, c) in chars.by_ref() {
              if c == '}' {
                found_close = true;
                break;
              }
              content.push(c);
            }

            if !found_close {
              return Err(PlaceholderError::Unclosed(pos));
            }

            segments.push(Segment::Placeholder(parse_placeholder_content(&content)?));
          }
          _ => literal.push_str("$$"),
        }
      }
      // A lone $ is literal so shell variables like $HOME pass through.
      _ => literal.push('$'),
    }
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Parse the content inside a placeholder (everything between `$${` and `}`).
fn parse_placeholder_content(content: &str) -> Result<Placeholder, PlaceholderError> {
  match content {
    "out" => return Ok(Placeholder::Out),
    "name" => return Ok(Placeholder::Name),
    "version" => return Ok(Placeholder::Version),
    _ => {}
  }

  let (kind, rest) = content
    .split_once(':')
    .ok_or_else(|| PlaceholderError::Malformed(format!("missing colon in '{content}'")))?;

  let name = rest.trim();
  if name.is_empty() || name.chars().any(char::is_whitespace) {
    return Err(PlaceholderError::Malformed(format!("invalid variable name in '{content}'")));
  }

  match kind {
    "var" => Ok(Placeholder::Var(name.to_string())),
    "base" => Ok(Placeholder::Base(name.to_string())),
    _ => Err(PlaceholderError::UnknownType(kind.to_string())),
  }
}

/// Names referenced through `$${var:NAME}` in pre-parsed segments, in order of appearance.
pub fn var_references(segments: &[Segment]) -> Vec<&str> {
  segments
    .iter()
    .filter_map(|segment| match segment {
      Segment::Placeholder(Placeholder::Var(name)) => Some(name.as_str()),
      _ => None,
    })
    .collect()
}

/// Substitute all placeholders in a string using the provided resolver.
///
/// # Errors
///
/// Returns an error if parsing fails or if any placeholder cannot be resolved.
pub fn substitute(input: &str, resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let segments = parse(input)?;
  substitute_segments(&segments, resolver)
}

/// Substitute placeholders in pre-parsed segments.
pub fn substitute_segments(segments: &[Segment], resolver: &impl Resolver) -> Result<String, PlaceholderError> {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(p) => {
        let value = match p {
          Placeholder::Out => resolver.resolve_out()?,
          Placeholder::Name => resolver.resolve_name()?,
          Placeholder::Version => resolver.resolve_version()?,
          Placeholder::Var(name) => resolver.resolve_var(name)?,
          Placeholder::Base(name) => resolver.resolve_base(name)?,
        };
        result.push_str(value);
      }
    }
  }

  Ok(result)
}
