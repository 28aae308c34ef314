//! Local process execution primitives.

use std::path::Path;
use std::process::Command;

use serde::Serialize;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandOutput {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Prefers stderr, falls back to stdout if stderr is empty.
    pub fn error_text(&self) -> String {
        if !self.stderr.trim().is_empty() {
            self.stderr.trim().to_string()
        } else {
            self.stdout.trim().to_string()
        }
    }
}

/// Run a command line through the platform shell.
pub fn run_shell(command: &str, current_dir: &Path, env: &[(String, String)]) -> CommandOutput {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    };

    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    };

    cmd.current_dir(current_dir);
    cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    capture(cmd)
}

/// Run a program directly with an argument vector (no shell).
pub fn run_program(
    program: &str,
    args: &[String],
    current_dir: &Path,
    env: &[(String, String)],
) -> CommandOutput {
    let mut cmd = Command::new(program);
    cmd.args(args).current_dir(current_dir);
    cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    capture(cmd)
}

fn capture(mut cmd: Command) -> CommandOutput {
    match cmd.output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput {
            stdout: String::new(),
            stderr: format!("Command error: {}", e),
            success: false,
            exit_code: -1,
        },
    }
}
