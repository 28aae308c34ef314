//! Manifest-declared command-line tools.
//!
//! A definition names a program and argv templates. Templates see the global
//! scope first, then step-local roots:
//!
//! - `src`: the step's rendered source patterns
//! - `sources`: files those patterns matched, relative to the step's `cwd`. While
//!   planning, a pattern with no match yet stands in for its own files.
//! - `files`: rendered `{dest, src}` mappings
//! - `dest`, `cwd`, `key`, `options`
//!
//! An argv element that is exactly one reference to a list expands into one
//! argument per item, so `"<%= sources %>"` passes every matched file.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ProducedOutputs, ToolHandler, ToolInvocation};
use crate::error::{Error, Result, ToolFailureDetails};
use crate::template::{Layered, Template};
use crate::utils::{command, files, shell};

/// Raw `tools.<id>` entry as written in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToolDefinition {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ExternalTool {
    id: String,
    program: Template,
    args: Vec<Template>,
    cwd: Option<Template>,
    env: Vec<(String, Template)>,
    outputs: IndexMap<String, Template>,
    description: Option<String>,
}

impl ExternalTool {
    pub fn from_definition(id: &str, definition: &ToolDefinition) -> Result<Self> {
        if definition.program.trim().is_empty() {
            return Err(Error::config_invalid_value(
                format!("tools.{}.program", id),
                None,
                "must not be empty",
            ));
        }

        Ok(Self {
            id: id.to_string(),
            program: Template::parse(&definition.program)?,
            args: definition
                .args
                .iter()
                .map(|a| Template::parse(a))
                .collect::<Result<Vec<_>>>()?,
            cwd: definition.cwd.as_deref().map(Template::parse).transpose()?,
            env: definition
                .env
                .iter()
                .map(|(k, v)| Template::parse(v).map(|t| (k.clone(), t)))
                .collect::<Result<Vec<_>>>()?,
            outputs: definition
                .outputs
                .iter()
                .map(|(k, v)| Template::parse(v).map(|t| (k.clone(), t)))
                .collect::<Result<IndexMap<_, _>>>()?,
            description: definition.description.clone(),
        })
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn local_scope(&self, invocation: &ToolInvocation<'_>) -> Result<Map<String, Value>> {
        let step = invocation.step;
        let sources: Vec<Value> = if invocation.planning {
            files::expand_planned(&step.src, &invocation.base_dir())?
                .into_iter()
                .map(Value::String)
                .collect()
        } else {
            invocation
                .sources()?
                .into_iter()
                .filter(|s| s.path.is_file())
                .map(|s| Value::String(s.relative))
                .collect()
        };

        let mut local = Map::new();
        local.insert("key".to_string(), Value::String(step.key.clone()));
        local.insert(
            "src".to_string(),
            Value::Array(step.src.iter().cloned().map(Value::String).collect()),
        );
        local.insert("sources".to_string(), Value::Array(sources));
        if let Some(dest) = &step.dest {
            local.insert("dest".to_string(), Value::String(dest.clone()));
        }
        if let Some(cwd) = &step.cwd {
            local.insert("cwd".to_string(), Value::String(cwd.clone()));
        }
        if !step.files.is_empty() {
            let files = serde_json::to_value(&step.files).map_err(|e| {
                Error::internal_json(e.to_string(), Some(format!("render {}", step.key)))
            })?;
            local.insert("files".to_string(), files);
        }
        local.insert("options".to_string(), Value::Object(step.options.clone()));
        Ok(local)
    }

    fn command(&self, invocation: &ToolInvocation<'_>) -> Result<PreparedCommand> {
        let local = self.local_scope(invocation)?;
        let scope = Layered::new().with(invocation.scope).with(&local);

        let mut args = Vec::new();
        for template in &self.args {
            args.extend(template.render_list(&scope)?);
        }
        let dir = match &self.cwd {
            Some(cwd) => invocation.resolve(&cwd.render(&scope)?),
            None => invocation.base_dir(),
        };
        let env = self
            .env
            .iter()
            .map(|(k, t)| t.render(&scope).map(|v| (k.clone(), v)))
            .collect::<Result<Vec<_>>>()?;

        Ok(PreparedCommand {
            program: self.program.render(&scope)?,
            args,
            dir,
            env,
            local,
        })
    }
}

struct PreparedCommand {
    program: String,
    args: Vec<String>,
    dir: std::path::PathBuf,
    env: Vec<(String, String)>,
    local: Map<String, Value>,
}

impl ToolHandler for ExternalTool {
    fn id(&self) -> &str {
        &self.id
    }

    fn declared_outputs(&self) -> Vec<String> {
        let mut outputs: Vec<String> = self.outputs.keys().cloned().collect();
        if !outputs.iter().any(|o| o == "exitCode") {
            outputs.push("exitCode".to_string());
        }
        outputs
    }

    fn preview(&self, invocation: &ToolInvocation<'_>) -> Result<Option<String>> {
        let prepared = self.command(invocation)?;
        Ok(Some(shell::command_line(&prepared.program, &prepared.args)))
    }

    fn invoke(&self, invocation: &ToolInvocation<'_>) -> Result<ProducedOutputs> {
        let PreparedCommand {
            program,
            args,
            dir,
            env,
            mut local,
        } = self.command(invocation)?;

        tracing::debug!(
            tool = %self.id,
            command = %shell::command_line(&program, &args),
            "running external tool"
        );
        let output = command::run_program(&program, &args, &dir, &env);

        if !output.success {
            return Err(Error::tool_invocation_failed(ToolFailureDetails {
                tool: self.id.clone(),
                step: Some(invocation.step.key.clone()),
                problem: format!("'{}' exited with code {}", program, output.exit_code),
                exit_code: Some(output.exit_code),
                stderr: Some(output.error_text()),
                cause: None,
            }));
        }

        local.insert(
            "stdout".to_string(),
            Value::String(output.stdout.trim_end().to_string()),
        );
        local.insert(
            "stderr".to_string(),
            Value::String(output.stderr.trim_end().to_string()),
        );
        let scope = Layered::new().with(invocation.scope).with(&local);

        let mut produced = ProducedOutputs::new();
        for (name, template) in &self.outputs {
            produced.insert(name.clone(), template.render_value(&scope)?);
        }
        produced.insert("exitCode".to_string(), Value::from(output.exit_code));
        Ok(produced)
    }
}
