use std::collections::HashMap;
use std::sync::Arc;

use weft_action::Action;
use weft_workflow::NamedSelector;

/// Rust functions and selectors that pipeline files may reference by name.
#[derive(Default, Clone)]
pub struct Registry {
  functions: HashMap<String, Arc<dyn Action>>,
  selectors: HashMap<&'static str, NamedSelector>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an action for `"action": "function"` nodes.
  pub fn function(mut self, name: impl Into<String>, action: Arc<dyn Action>) -> Self {
    self.functions.insert(name.into(), action);
    self
  }

  /// Register a selector usable as an edge tag.
  pub fn selector(mut self, selector: NamedSelector) -> Self {
    self.selectors.insert(selector.name(), selector);
    self
  }

  pub fn get_function(&self, name: &str) -> Option<&Arc<dyn Action>> {
    self.functions.get(name)
  }

  pub fn get_selector(&self, name: &str) -> Option<NamedSelector> {
    self.selectors.get(name).copied()
  }
}
