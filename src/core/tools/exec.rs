use serde_json::Value;

use super::{ProducedOutputs, RenderedStep, ToolHandler, ToolInvocation};
use crate::error::{Error, Result, ToolFailureDetails};
use crate::utils::command;

fn command_of(step: &RenderedStep) -> Option<&str> {
    step.option_str("command")
        .or_else(|| step.src.first().map(String::as_str))
        .filter(|c| !c.trim().is_empty())
}

fn env_of(step: &RenderedStep) -> Vec<(String, String)> {
    step.option("env")
        .and_then(Value::as_object)
        .map(|env| {
            env.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Runs `options.command` (or the first `src` entry) through the platform shell.
pub struct Exec;

impl ToolHandler for Exec {
    fn id(&self) -> &str {
        "exec"
    }

    fn declared_outputs(&self) -> Vec<String> {
        vec!["stdout".to_string(), "exitCode".to_string()]
    }

    fn check(&self, step: &RenderedStep) -> Result<()> {
        match command_of(step) {
            Some(_) => Ok(()),
            None => Err(Error::tool_failed(
                "exec",
                format!("step '{}' has no command", step.key),
            )),
        }
    }

    fn preview(&self, invocation: &ToolInvocation<'_>) -> Result<Option<String>> {
        Ok(command_of(invocation.step).map(str::to_string))
    }

    fn invoke(&self, invocation: &ToolInvocation<'_>) -> Result<ProducedOutputs> {
        let step = invocation.step;
        let cmd = command_of(step).ok_or_else(|| invocation.fail("no command configured"))?;

        tracing::debug!(step = %step.key, command = cmd, "exec");
        let output = command::run_shell(cmd, &invocation.base_dir(), &env_of(step));

        if !output.success {
            return Err(Error::tool_invocation_failed(ToolFailureDetails {
                tool: step.tool.clone(),
                step: Some(step.key.clone()),
                problem: format!("command exited with code {}: {}", output.exit_code, cmd),
                exit_code: Some(output.exit_code),
                stderr: Some(output.error_text()),
                cause: None,
            }));
        }

        let mut outputs = ProducedOutputs::new();
        outputs.insert(
            "stdout".to_string(),
            Value::String(output.stdout.trim_end().to_string()),
        );
        outputs.insert("exitCode".to_string(), Value::from(output.exit_code));
        Ok(outputs)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::tools::testing;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn captures_stdout_and_exit_code() {
        let dir = TempDir::new().unwrap();
        let step = testing::step("exec", json!({ "options": { "command": "echo built" } }));
        let outputs = testing::invoke(&Exec, &step, dir.path()).unwrap();

        assert_eq!(outputs["stdout"], "built");
        assert_eq!(outputs["exitCode"], 0);
    }

    #[test]
    fn first_src_is_the_command_fallback() {
        let dir = TempDir::new().unwrap();
        let step = testing::step("exec", json!({ "src": ["printf hi > out.txt"] }));
        testing::invoke(&Exec, &step, dir.path()).unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("out.txt")).unwrap(), "hi");
    }

    #[test]
    fn non_zero_exit_reports_code_and_stderr() {
        let dir = TempDir::new().unwrap();
        let step = testing::step(
            "exec",
            json!({ "options": { "command": "echo broken >&2; exit 4" } }),
        );
        let err = testing::invoke(&Exec, &step, dir.path()).unwrap_err();

        assert_eq!(err.code, ErrorCode::ToolInvocationFailed);
        assert_eq!(err.details["exitCode"], 4);
        assert_eq!(err.details["stderr"], "broken");
    }

    #[test]
    fn env_option_is_passed_through() {
        let dir = TempDir::new().unwrap();
        let step = testing::step(
            "exec",
            json!({ "options": { "command": "printf %s \"$FEI_MODE\"", "env": { "FEI_MODE": "ci" } } }),
        );
        let outputs = testing::invoke(&Exec, &step, dir.path()).unwrap();
        assert_eq!(outputs["stdout"], "ci");
    }

    #[test]
    fn missing_command_fails_check() {
        let step = testing::step("exec", json!({}));
        assert!(Exec.check(&step).is_err());
    }
}
