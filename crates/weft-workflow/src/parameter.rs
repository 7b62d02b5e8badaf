//! Parameter sets and iteration contexts.

use serde::{Deserialize, Serialize};

use crate::error::ParameterError;

/// A named axis with a finite sequence of opaque values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axis {
  pub name: String,
  pub values: Vec<serde_json::Value>,
}

/// An ordered sequence of uniquely named axes.
///
/// The iteration space is the Cartesian product of all axes. An empty set
/// has exactly one (empty) iteration context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
  axes: Vec<Axis>,
}

impl ParameterSet {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_axis<I, V>(&mut self, name: impl Into<String>, values: I) -> Result<(), ParameterError>
  where
    I: IntoIterator<Item = V>,
    V: Into<serde_json::Value>,
  {
    let name = name.into();
    if self.get(&name).is_some() {
      return Err(ParameterError::DuplicateAxis(name));
    }
    self.axes.push(Axis {
      name,
      values: values.into_iter().map(Into::into).collect(),
    });
    Ok(())
  }

  /// Builder form of [`ParameterSet::add_axis`].
  pub fn with_axis<I, V>(mut self, name: impl Into<String>, values: I) -> Result<Self, ParameterError>
  where
    I: IntoIterator<Item = V>,
    V: Into<serde_json::Value>,
  {
    self.add_axis(name, values)?;
    Ok(self)
  }

  pub fn axes(&self) -> &[Axis] {
    &self.axes
  }

  pub fn get(&self, name: &str) -> Option<&Axis> {
    self.axes.iter().find(|a| a.name == name)
  }

  pub fn is_empty(&self) -> bool {
    self.axes.is_empty()
  }

  /// Number of iteration contexts (product of axis sizes).
  pub fn context_count(&self) -> usize {
    self.axes.iter().map(|a| a.values.len()).product()
  }

  /// Enumerate the Cartesian product. The last axis varies fastest.
  pub fn contexts(&self) -> Vec<IterationContext> {
    let mut combos: Vec<Vec<(String, serde_json::Value)>> = vec![Vec::new()];

    for axis in &self.axes {
      combos = combos
        .into_iter()
        .flat_map(move |prefix| {
          axis.values.iter().map(move |value| {
            let mut combo = prefix.clone();
            combo.push((axis.name.clone(), value.clone()));
            combo
          })
        })
        .collect();
    }

    combos
      .into_iter()
      .enumerate()
      .map(|(index, values)| IterationContext { index, values })
      .collect()
  }
}

/// One concrete combination of axis values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationContext {
  pub index: usize,
  pub values: Vec<(String, serde_json::Value)>,
}

impl IterationContext {
  /// The single context of an empty parameter set.
  pub fn empty() -> Self {
    Self {
      index: 0,
      values: Vec::new(),
    }
  }

  pub fn get(&self, axis: &str) -> Option<&serde_json::Value> {
    self.values.iter().find(|(name, _)| name == axis).map(|(_, v)| v)
  }

  /// `subject_id=sub01,run=2`, or an empty string for the empty context.
  pub fn label(&self) -> String {
    self
      .values
      .iter()
      .map(|(name, value)| match value {
        serde_json::Value::String(s) => format!("{}={}", name, s),
        other => format!("{}={}", name, other),
      })
      .collect::<Vec<_>>()
      .join(",")
  }

  pub fn to_json(&self) -> serde_json::Value {
    serde_json::Value::Object(self.values.iter().cloned().collect())
  }
}
