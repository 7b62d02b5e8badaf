//! Edge selectors.
//!
//! A selector is a named, pure function applied to an upstream value before
//! it is delivered to a downstream input. Built-in policies cover the common
//! "pick one element of a list" reshaping; [`NamedSelector`] wraps any other
//! plain function so it can be tested on its own.
//!
//! Policies parse from tags, case-insensitively:
//!
//! | tag | policy |
//! |---|---|
//! | `identity` | deliver the value unchanged |
//! | `first` | first element |
//! | `last` | last element |
//! | `middle` | element at `len / 2` |
//! | `index:N` | element at `N` |
//!
//! A non-list value is treated as a list of one, so `first` on a single file
//! delivers that file.

use std::fmt;
use std::str::FromStr;

use weft_artifact::Artifact;

use crate::error::SelectorError;

/// Signature of a named selector function.
pub type SelectorFn = fn(&Artifact) -> Result<Artifact, SelectorError>;

/// A user-provided selector function with a stable name.
#[derive(Clone, Copy)]
pub struct NamedSelector {
  name: &'static str,
  func: SelectorFn,
}

impl NamedSelector {
  pub const fn new(name: &'static str, func: SelectorFn) -> Self {
    Self { name, func }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl fmt::Debug for NamedSelector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("NamedSelector").field(&self.name).finish()
  }
}

impl PartialEq for NamedSelector {
  fn eq(&self, other: &Self) -> bool {
    self.name == other.name
  }
}

impl Eq for NamedSelector {}

/// Selection policy attached to an edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Selector {
  #[default]
  Identity,
  First,
  Last,
  Middle,
  Index(usize),
  Named(NamedSelector),
}

impl Selector {
  pub fn is_identity(&self) -> bool {
    matches!(self, Self::Identity)
  }

  /// Apply the selector to an upstream value.
  pub fn apply(&self, value: &Artifact) -> Result<Artifact, SelectorError> {
    let items = match value {
      Artifact::List(items) => items.as_slice(),
      single => std::slice::from_ref(single),
    };

    let index = match self {
      Self::Identity => return Ok(value.clone()),
      Self::Named(named) => return (named.func)(value),
      Self::First => 0,
      Self::Last => items.len().saturating_sub(1),
      Self::Middle => items.len() / 2,
      Self::Index(index) => *index,
    };

    if items.is_empty() {
      if let Self::Index(index) = self {
        return Err(SelectorError::IndexOutOfRange {
          index: *index,
          len: 0,
        });
      }
      return Err(SelectorError::EmptyList {
        selector: self.to_string(),
      });
    }

    items
      .get(index)
      .cloned()
      .ok_or(SelectorError::IndexOutOfRange {
        index,
        len: items.len(),
      })
  }
}

impl fmt::Display for Selector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Identity => write!(f, "identity"),
      Self::First => write!(f, "first"),
      Self::Last => write!(f, "last"),
      Self::Middle => write!(f, "middle"),
      Self::Index(index) => write!(f, "index:{}", index),
      Self::Named(named) => write!(f, "{}", named.name),
    }
  }
}

impl FromStr for Selector {
  type Err = SelectorError;

  fn from_str(tag: &str) -> Result<Self, Self::Err> {
    let normalized = tag.trim().to_ascii_lowercase();
    match normalized.as_str() {
      "identity" => Ok(Self::Identity),
      "first" => Ok(Self::First),
      "last" => Ok(Self::Last),
      "middle" => Ok(Self::Middle),
      other => other
        .strip_prefix("index:")
        .and_then(|n| n.trim().parse().ok())
        .map(Self::Index)
        .ok_or_else(|| SelectorError::UnknownPolicy(tag.to_string())),
    }
  }
}
