//! Template rendering shared by sinks, data sources, and command actions.
//!
//! Templates use minijinja syntax and are rendered in strict mode, so a
//! reference to a variable that is not in the context is an error rather than
//! an empty string:
//!
//! ```json
//! "{{ subject_id }}/anatomy/highres001.nii.gz"
//! ```

use minijinja::{Environment, UndefinedBehavior, Value};

pub use minijinja::Error as TemplateError;

/// Render a template string against a JSON context.
pub fn render(template: &str, context: &serde_json::Value) -> Result<String, TemplateError> {
  let mut env = Environment::new();
  env.set_undefined_behavior(UndefinedBehavior::Strict);
  env.render_str(template, Value::from_serialize(context))
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_render_context_value() {
    let rendered = render("{{ subject_id }}/anat", &json!({"subject_id": "sub01"})).unwrap();
    assert_eq!(rendered, "sub01/anat");
  }

  #[test]
  fn test_render_literal() {
    let rendered = render("out", &json!({})).unwrap();
    assert_eq!(rendered, "out");
  }

  #[test]
  fn test_render_missing_variable_fails() {
    assert!(render("{{ missing }}", &json!({})).is_err());
  }
}
