//! Integration tests for CommandAction using the system shell.
#![cfg(unix)]

use std::time::Duration;

use weft_action::{Action, ActionContext, ActionError, CommandAction, Inputs};
use weft_artifact::Artifact;

fn context(work_dir: &std::path::Path) -> ActionContext {
  ActionContext::detached("cmd", work_dir)
}

#[tokio::test]
async fn test_command_produces_declared_output() {
  let dir = tempfile::tempdir().unwrap();
  let action = CommandAction::new("sh")
    .args(["-c", "printf '%s' \"$1\" > \"$2\"", "sh"])
    .arg("{{ message }}")
    .arg("{{ work_dir }}/out.txt")
    .output("out_file", "{{ work_dir }}/out.txt");

  let inputs = Inputs::from([("message".to_string(), Artifact::value("hello"))]);
  let work_dir = dir.path().join("instance");
  let outputs = action.invoke(inputs, &context(&work_dir)).await.unwrap();

  let out = work_dir.join("out.txt");
  assert_eq!(outputs["out_file"], Artifact::File(out.clone()));
  assert_eq!(std::fs::read_to_string(out).unwrap(), "hello");
}

#[tokio::test]
async fn test_command_nonzero_exit_reports_stderr() {
  let dir = tempfile::tempdir().unwrap();
  let action = CommandAction::new("sh").args(["-c", "echo broken >&2; exit 3"]);

  let err = action
    .invoke(Inputs::new(), &context(dir.path()))
    .await
    .unwrap_err();

  match err {
    ActionError::CommandFailed { program, stderr, .. } => {
      assert_eq!(program, "sh");
      assert_eq!(stderr, "broken");
    }
    other => panic!("unexpected error: {other}"),
  }
}

#[tokio::test]
async fn test_command_missing_output() {
  let dir = tempfile::tempdir().unwrap();
  let action = CommandAction::new("sh")
    .args(["-c", "true"])
    .output("out_file", "{{ work_dir }}/never.txt");

  let err = action
    .invoke(Inputs::new(), &context(dir.path()))
    .await
    .unwrap_err();

  assert!(matches!(err, ActionError::MissingOutput { .. }));
}

#[tokio::test]
async fn test_command_unknown_template_variable() {
  let dir = tempfile::tempdir().unwrap();
  let action = CommandAction::new("echo").arg("{{ not_an_input }}");

  let err = action
    .invoke(Inputs::new(), &context(dir.path()))
    .await
    .unwrap_err();

  assert!(matches!(err, ActionError::Template { .. }));
}

#[tokio::test]
async fn test_command_terminates_on_cancel() {
  let dir = tempfile::tempdir().unwrap();
  let action = CommandAction::new("sleep").arg("30");
  let ctx = context(dir.path());

  let cancel = ctx.cancel.clone();
  tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
  });

  let started = std::time::Instant::now();
  let err = action.invoke(Inputs::new(), &ctx).await.unwrap_err();

  assert!(matches!(err, ActionError::Cancelled));
  assert!(started.elapsed() < Duration::from_secs(10));
}
