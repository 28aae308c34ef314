//! Tool handlers: the units of work an atomic step delegates to.
//!
//! Built-in handlers cover file housekeeping (`clean`, `copy`, `concat`,
//! `usebanner`) and shell commands (`exec`). Everything else (linters,
//! minifiers, style compilers, doc generators) is an [`external::ExternalTool`]
//! declared in the manifest.

pub mod banner;
pub mod clean;
pub mod concat;
pub mod copy;
pub mod exec;
pub mod external;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::ExecutionContext;
use crate::error::{Error, Result};
use crate::registry::AtomicTask;
use crate::template::Lookup;
use crate::utils::files::{self, SourceFile};

/// Named values a handler hands back to the run context.
pub type ProducedOutputs = Map<String, Value>;

/// One rendered `dest: [src...]` mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSet {
    pub dest: String,
    pub src: Vec<String>,
}

/// An atomic task with every template rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedStep {
    pub key: String,
    pub tool: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub src: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub expand: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileSet>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub options: Map<String, Value>,
}

impl RenderedStep {
    pub fn render(task: &AtomicTask, scope: &dyn Lookup) -> Result<Self> {
        let mut src = Vec::new();
        for template in &task.src {
            src.extend(template.render_list(scope)?);
        }

        let mut file_sets = Vec::with_capacity(task.files.len());
        for mapping in &task.files {
            let mut mapping_src = Vec::new();
            for template in &mapping.src {
                mapping_src.extend(template.render_list(scope)?);
            }
            file_sets.push(FileSet {
                dest: mapping.dest.render(scope)?,
                src: mapping_src,
            });
        }

        let mut options = Map::new();
        for (name, value) in &task.options {
            options.insert(name.clone(), value.render(scope)?);
        }

        Ok(Self {
            key: task.key.to_string(),
            tool: task.tool.clone(),
            src,
            dest: task.dest.as_ref().map(|t| t.render(scope)).transpose()?,
            cwd: task.cwd.as_ref().map(|t| t.render(scope)).transpose()?,
            expand: task.expand,
            files: file_sets,
            options,
        })
    }

    pub fn option(&self, name: &str) -> Option<&Value> {
        self.options.get(name)
    }

    pub fn option_str(&self, name: &str) -> Option<&str> {
        self.options.get(name).and_then(Value::as_str)
    }

    pub fn option_bool(&self, name: &str, default: bool) -> bool {
        self.options
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }
}

/// Everything a handler sees for one step.
pub struct ToolInvocation<'a> {
    pub step: &'a RenderedStep,
    pub workspace: &'a Path,
    pub context: &'a ExecutionContext,
    /// Global template scope, for handlers that render their own templates.
    pub scope: &'a dyn Lookup,
    /// Set while checking or dry-running: earlier steps have not produced their files.
    pub planning: bool,
}

impl ToolInvocation<'_> {
    /// Directory source patterns are relative to: the workspace, or `cwd` inside it.
    pub fn base_dir(&self) -> PathBuf {
        match &self.step.cwd {
            Some(cwd) => self.workspace.join(cwd),
            None => self.workspace.to_path_buf(),
        }
    }

    pub fn sources(&self) -> Result<Vec<SourceFile>> {
        files::expand(&self.step.src, &self.base_dir())
    }

    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.workspace.join(relative)
    }

    pub fn dest(&self) -> Result<&str> {
        self.step
            .dest
            .as_deref()
            .ok_or_else(|| self.fail("no 'dest' configured"))
    }

    pub fn fail(&self, problem: impl Into<String>) -> Error {
        Error::tool_failed(self.step.tool.clone(), problem)
    }
}

pub trait ToolHandler: Send + Sync {
    fn id(&self) -> &str;

    /// Output keys `invoke` merges into the context under `group.target`.
    fn declared_outputs(&self) -> Vec<String>;

    /// Static validation of a rendered step before the run starts.
    fn check(&self, _step: &RenderedStep) -> Result<()> {
        Ok(())
    }

    /// Human-readable form of what `invoke` would do, for plans and dry runs.
    fn preview(&self, _invocation: &ToolInvocation<'_>) -> Result<Option<String>> {
        Ok(None)
    }

    fn invoke(&self, invocation: &ToolInvocation<'_>) -> Result<ProducedOutputs>;
}

#[derive(Clone, Default)]
pub struct ToolRegistry {
    handlers: IndexMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.insert(Arc::new(clean::Clean));
        registry.insert(Arc::new(copy::CopyFiles));
        registry.insert(Arc::new(concat::Concat));
        registry.insert(Arc::new(banner::UseBanner));
        registry.insert(Arc::new(exec::Exec));
        registry
    }

    fn insert(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.id().to_string(), handler);
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        let id = handler.id().to_string();
        if self.handlers.contains_key(&id) {
            return Err(Error::config_invalid_value(
                format!("tools.{}", id),
                None,
                "a tool with this id is already registered",
            ));
        }
        self.handlers.insert(id, handler);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&dyn ToolHandler> {
        self.handlers.get(id).map(|h| h.as_ref())
    }

    pub fn ids(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}
