//! Shell handlers. Commands run through the configured interpreter in the current view.

use anyhow::Result;
use serde_json::json;
use tracing::info;

use crate::core::action::{ActionContext, ActionResult, Params};
use crate::io::process::run_shell;
use crate::io::transaction::Transaction;

use super::{ActionSupervisor, reject};

fn run(sup: &ActionSupervisor, command: &str) -> Result<ActionResult> {
    let command = command.trim();
    if command.is_empty() {
        return Err(reject("No command provided", "Missing command"));
    }
    let view = sup.current_view();
    let shell = &sup.config().shell;
    let out = run_shell(&shell.program, command, &view, shell.output_limit_bytes)?;
    let code = out.status.code();
    info!(command, exit_code = ?code, "shell command finished");

    let mut stderr = out.stderr_text();
    stderr.push_str(&out.truncated_notice());
    let message = format!("Command executed: {command}");
    let data = json!({ "stdout": out.stdout_text(), "stderr": stderr, "returncode": code });
    if out.success() {
        return Ok(ActionResult::success(message).with_data(data));
    }
    let error = match stderr.trim() {
        "" => match code {
            Some(code) => format!("Command exited with code {code}"),
            None => "Command terminated by signal".to_string(),
        },
        text => text.to_string(),
    };
    Ok(ActionResult::failure(message, error).with_data(data))
}

pub(super) fn run_shell_command(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let command = params.require_str(&["command", "cmd"])?;
    run(sup, &command)
}

/// `<command> <path>`; the command defaults to `shell.test_command`.
pub(super) fn run_tests(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let command = params
        .str(&["command", "test_command"])
        .unwrap_or_else(|| sup.config().shell.test_command.clone());
    let path = params.str(&["path", "test_path"]).unwrap_or_else(|| ".".to_string());
    run(sup, &format!("{} {}", command.trim(), path.trim()))
}

pub(super) fn build_project(
    sup: &ActionSupervisor,
    params: Params<'_>,
    _ctx: &ActionContext,
    _tx: &mut Transaction,
) -> Result<ActionResult> {
    let command = params
        .str(&["command", "build_command"])
        .unwrap_or_else(|| sup.config().shell.build_command.clone());
    run(sup, &command)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::action::{Action, ActionStatus};
    use crate::io::config::EngineConfig;

    fn setup() -> (tempfile::TempDir, ActionSupervisor) {
        let temp = tempfile::tempdir().expect("tempdir");
        let sup = ActionSupervisor::new(temp.path(), EngineConfig::default()).expect("supervisor");
        (temp, sup)
    }

    #[test]
    fn command_runs_in_current_view() {
        let (temp, sup) = setup();
        std::fs::create_dir(temp.path().join("demo")).expect("mkdir");
        sup.change_directory("demo").expect("cd");
        let action = Action::new("RunShellCommand", json!({ "command": "pwd" }));
        let result = sup.dispatch(&action, &ActionContext::default());
        assert!(result.is_success());
        let data = result.data.expect("data");
        assert_eq!(data["returncode"], 0);
        assert!(data["stdout"].as_str().expect("stdout").trim().ends_with("demo"));
    }

    #[test]
    fn nonzero_exit_is_a_failure_with_output() {
        let (_temp, sup) = setup();
        let action = Action::new("RunShellCommand", json!({ "command": "echo oops >&2; exit 3" }));
        let result = sup.dispatch(&action, &ActionContext::default());
        assert_eq!(result.status, ActionStatus::Failure);
        assert_eq!(result.error.as_deref(), Some("oops"));
        assert_eq!(result.data.expect("data")["returncode"], 3);
    }

    #[test]
    fn run_tests_appends_path_to_command() {
        let (_temp, sup) = setup();
        let action = Action::new("RunTests", json!({ "command": "echo testing", "path": "tests/" }));
        let result = sup.dispatch(&action, &ActionContext::default());
        assert_eq!(result.message, "Command executed: echo testing tests/");
        assert_eq!(result.data.expect("data")["stdout"], "testing tests/\n");
    }
}
