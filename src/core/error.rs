use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigNotFound,
    ConfigReadFailed,
    ConfigInvalidFormat,
    ConfigMissingKey,
    ConfigInvalidValue,

    TemplateSyntax,
    TemplateUnresolved,
    TemplateRecursive,
    TemplateInvalidValue,

    TaskDuplicate,
    TaskUnknown,
    TaskCyclic,

    ToolNotFound,
    ToolInvocationFailed,
    RunLocked,

    ValidationInvalidArgument,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigNotFound => "config.not_found",
            ErrorCode::ConfigReadFailed => "config.read_failed",
            ErrorCode::ConfigInvalidFormat => "config.invalid_format",
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::TemplateSyntax => "template.syntax",
            ErrorCode::TemplateUnresolved => "template.unresolved",
            ErrorCode::TemplateRecursive => "template.recursive",
            ErrorCode::TemplateInvalidValue => "template.invalid_value",

            ErrorCode::TaskDuplicate => "task.duplicate",
            ErrorCode::TaskUnknown => "task.unknown",
            ErrorCode::TaskCyclic => "task.cyclic",

            ErrorCode::ToolNotFound => "tool.not_found",
            ErrorCode::ToolInvocationFailed => "tool.invocation_failed",
            ErrorCode::RunLocked => "run.locked",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ErrorCode::ConfigNotFound
            | ErrorCode::ConfigReadFailed
            | ErrorCode::ConfigInvalidFormat
            | ErrorCode::ConfigMissingKey
            | ErrorCode::ConfigInvalidValue => ErrorKind::Config,

            ErrorCode::TemplateSyntax
            | ErrorCode::TemplateUnresolved
            | ErrorCode::TemplateRecursive
            | ErrorCode::TemplateInvalidValue => ErrorKind::Template,

            ErrorCode::TaskDuplicate => ErrorKind::DuplicateTask,
            ErrorCode::TaskUnknown => ErrorKind::UnknownTask,
            ErrorCode::TaskCyclic => ErrorKind::CyclicTask,

            ErrorCode::ToolNotFound | ErrorCode::ToolInvocationFailed | ErrorCode::RunLocked => {
                ErrorKind::ToolInvocation
            }

            ErrorCode::ValidationInvalidArgument => ErrorKind::Validation,

            ErrorCode::InternalIoError
            | ErrorCode::InternalJsonError
            | ErrorCode::InternalUnexpected => ErrorKind::Internal,
        }
    }
}

/// Coarse error families reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "ConfigError")]
    Config,
    #[serde(rename = "TemplateError")]
    Template,
    #[serde(rename = "DuplicateTaskError")]
    DuplicateTask,
    #[serde(rename = "UnknownTaskError")]
    UnknownTask,
    #[serde(rename = "CyclicTaskError")]
    CyclicTask,
    #[serde(rename = "ToolInvocationError")]
    ToolInvocation,
    #[serde(rename = "ValidationError")]
    Validation,
    #[serde(rename = "InternalError")]
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Config => "ConfigError",
            ErrorKind::Template => "TemplateError",
            ErrorKind::DuplicateTask => "DuplicateTaskError",
            ErrorKind::UnknownTask => "UnknownTaskError",
            ErrorKind::CyclicTask => "CyclicTaskError",
            ErrorKind::ToolInvocation => "ToolInvocationError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// Graph and template problems that are detected before any step runs.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            ErrorKind::Template
                | ErrorKind::DuplicateTask
                | ErrorKind::UnknownTask
                | ErrorKind::CyclicTask
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFileDetails {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateTaskDetails {
    pub key: String,
    pub existing: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnknownTaskDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_by: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclicTaskDetails {
    pub cycle: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolNotFoundDetails {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub available: Vec<String>,
}

/// Handler-specific failure detail carried by `tool.invocation_failed`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolFailureDetails {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code.kind()
    }

    pub fn config_not_found(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path),
            to_details(ConfigFileDetails { path, error: None }),
        )
    }

    pub fn config_read_failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigReadFailed,
            format!("Failed to read configuration file: {}", path),
            to_details(ConfigFileDetails {
                path,
                error: Some(error.into()),
            }),
        )
    }

    pub fn config_invalid_format(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::ConfigInvalidFormat,
            format!("Configuration file could not be parsed: {}", path),
            to_details(ConfigFileDetails {
                path,
                error: Some(error.into()),
            }),
        )
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            to_details(ConfigMissingKeyDetails { key, path }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for '{}': {}", key, problem),
            to_details(ConfigInvalidValueDetails {
                key,
                value,
                problem,
            }),
        )
    }

    pub fn template_syntax(template: impl Into<String>, problem: impl Into<String>) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::TemplateSyntax,
            format!("Invalid template: {}", problem),
            to_details(TemplateDetails {
                template: Some(template.into()),
                reference: None,
                chain: Vec::new(),
                problem: Some(problem),
            }),
        )
    }

    pub fn template_unresolved(reference: impl Into<String>, template: Option<String>) -> Self {
        let reference = reference.into();
        Self::new(
            ErrorCode::TemplateUnresolved,
            format!("Unresolved template reference '{}'", reference),
            to_details(TemplateDetails {
                template,
                reference: Some(reference),
                chain: Vec::new(),
                problem: None,
            }),
        )
    }

    pub fn template_recursive(chain: Vec<String>) -> Self {
        Self::new(
            ErrorCode::TemplateRecursive,
            format!("Recursive template reference: {}", chain.join(" -> ")),
            to_details(TemplateDetails {
                template: None,
                reference: chain.last().cloned(),
                chain,
                problem: None,
            }),
        )
    }

    pub fn template_invalid_value(reference: impl Into<String>, problem: impl Into<String>) -> Self {
        let reference = reference.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::TemplateInvalidValue,
            format!("Template reference '{}' {}", reference, problem),
            to_details(TemplateDetails {
                template: None,
                reference: Some(reference),
                chain: Vec::new(),
                problem: Some(problem),
            }),
        )
    }

    pub fn task_duplicate(key: impl Into<String>, existing: impl Into<String>) -> Self {
        let key = key.into();
        let existing = existing.into();
        Self::new(
            ErrorCode::TaskDuplicate,
            format!("Task '{}' is already registered as {}", key, existing),
            to_details(DuplicateTaskDetails { key, existing }),
        )
    }

    pub fn task_unknown(
        key: impl Into<String>,
        referenced_by: Option<String>,
        suggestions: Vec<String>,
    ) -> Self {
        let key = key.into();
        let message = match &referenced_by {
            Some(parent) => format!("Unknown task '{}' referenced by '{}'", key, parent),
            None => format!("Unknown task '{}'", key),
        };
        let hints: Vec<Hint> = suggestions
            .iter()
            .map(|s| Hint {
                message: format!("Did you mean '{}'?", s),
            })
            .collect();
        let mut err = Self::new(
            ErrorCode::TaskUnknown,
            message,
            to_details(UnknownTaskDetails {
                key,
                referenced_by,
                suggestions,
            }),
        );
        err.hints = hints;
        err.with_hint("Run 'assetline list' to see registered tasks")
    }

    pub fn task_cyclic(cycle: Vec<String>) -> Self {
        Self::new(
            ErrorCode::TaskCyclic,
            format!("Task cycle detected: {}", cycle.join(" -> ")),
            to_details(CyclicTaskDetails { cycle }),
        )
    }

    pub fn tool_not_found(tool: impl Into<String>, step: Option<String>, available: Vec<String>) -> Self {
        let tool = tool.into();
        Self::new(
            ErrorCode::ToolNotFound,
            format!("No tool handler registered for '{}'", tool),
            to_details(ToolNotFoundDetails {
                tool,
                step,
                available,
            }),
        )
        .with_hint("Declare it under \"tools\" in the manifest or set the group's \"tool\" field")
    }

    pub fn tool_invocation_failed(details: ToolFailureDetails) -> Self {
        let message = format!("Tool '{}' failed: {}", details.tool, details.problem);
        Self::new(ErrorCode::ToolInvocationFailed, message, to_details(details))
    }

    /// Shorthand for a handler reporting its own failure.
    pub fn tool_failed(tool: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::tool_invocation_failed(ToolFailureDetails {
            tool: tool.into(),
            problem: problem.into(),
            ..Default::default()
        })
    }

    /// Wrap a non-tool error raised inside a handler so the cause is preserved.
    pub fn wrap_tool_failure(self, tool: &str, step: &str) -> Self {
        if self.code == ErrorCode::ToolInvocationFailed {
            let mut wrapped = self;
            if let Value::Object(map) = &mut wrapped.details {
                map.entry("step")
                    .or_insert_with(|| Value::String(step.to_string()));
            }
            return wrapped;
        }

        let cause = serde_json::json!({
            "code": self.code.as_str(),
            "message": self.message,
            "details": self.details,
        });
        let mut wrapped = Self::tool_invocation_failed(ToolFailureDetails {
            tool: tool.to_string(),
            step: Some(step.to_string()),
            problem: self.message.clone(),
            exit_code: None,
            stderr: None,
            cause: Some(cause),
        });
        wrapped.hints = self.hints;
        wrapped
    }

    pub fn run_locked(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(
            ErrorCode::RunLocked,
            "Another pipeline run holds the workspace lock",
            serde_json::json!({ "lockFile": path }),
        )
        .with_hint(format!(
            "Wait for the other run to finish, or remove {} if it is stale",
            path
        ))
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalIoErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalIoError, "IO error", details)
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let details = to_details(InternalJsonErrorDetails {
            error: error.into(),
            context,
        });

        Self::new(ErrorCode::InternalJsonError, "JSON error", details)
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::InternalUnexpected,
            "Unexpected error",
            serde_json::json!({ "error": error.into() }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_error_families() {
        assert_eq!(ErrorCode::ConfigMissingKey.kind(), ErrorKind::Config);
        assert_eq!(ErrorCode::TemplateUnresolved.kind(), ErrorKind::Template);
        assert_eq!(ErrorCode::TaskCyclic.kind(), ErrorKind::CyclicTask);
        assert_eq!(ErrorCode::RunLocked.kind(), ErrorKind::ToolInvocation);
        assert!(ErrorKind::UnknownTask.is_resolution());
        assert!(!ErrorKind::ToolInvocation.is_resolution());
    }

    #[test]
    fn unknown_task_carries_suggestion_hints() {
        let err = Error::task_unknown("complie", Some("build".to_string()), vec!["compile".into()]);
        assert_eq!(err.code.as_str(), "task.unknown");
        assert!(err.message.contains("referenced by 'build'"));
        assert_eq!(err.details["suggestions"][0], "compile");
        assert!(err.hints.iter().any(|h| h.message.contains("'compile'")));
    }

    #[test]
    fn wrapping_preserves_original_cause() {
        let cause = Error::internal_io("permission denied", Some("write dist/a.js".into()));
        let wrapped = cause.wrap_tool_failure("concat", "concat:core");

        assert_eq!(wrapped.code, ErrorCode::ToolInvocationFailed);
        assert_eq!(wrapped.details["step"], "concat:core");
        assert_eq!(wrapped.details["cause"]["code"], "internal.io_error");
    }

    #[test]
    fn wrapping_a_tool_failure_does_not_nest() {
        let err = Error::tool_failed("exec", "exit status 2");
        let wrapped = err.wrap_tool_failure("exec", "exec:docs");

        assert_eq!(wrapped.code, ErrorCode::ToolInvocationFailed);
        assert_eq!(wrapped.details["step"], "exec:docs");
        assert!(wrapped.details.get("cause").is_none());
    }
}
