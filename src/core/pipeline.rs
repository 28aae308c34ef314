//! Library entry point: a loaded manifest, its descriptor, the task registry and
//! the tool registry, bound to one workspace.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::descriptor::{self, Descriptor};
use crate::error::{Error, Result};
use crate::executor::{self, ExecutionResult, Executor, PlannedStep};
use crate::lock::RunLock;
use crate::manifest::{self, Manifest};
use crate::registry::{AtomicTask, TaskRegistry};
use crate::resolver;
use crate::template::Layered;
use crate::tools::external::ExternalTool;
use crate::tools::{ToolHandler, ToolRegistry};

pub struct Pipeline {
    manifest: Manifest,
    descriptor: Descriptor,
    registry: TaskRegistry,
    tools: ToolRegistry,
    workspace: PathBuf,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub task: String,
    pub workspace: String,
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeSummary {
    pub name: String,
    pub refs: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub key: String,
    pub tool: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSummary {
    pub id: String,
    pub outputs: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListing {
    pub composites: Vec<CompositeSummary>,
    pub tasks: Vec<TaskSummary>,
    pub tools: Vec<ToolSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub task: String,
    pub code: String,
    pub message: String,
    pub details: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub composites: Vec<(String, usize)>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<ValidationIssue>,
    #[serde(skip)]
    pub first_error: Option<Error>,
}

impl Pipeline {
    /// Load the manifest and its descriptor. The workspace defaults to the
    /// manifest's directory.
    pub fn open(manifest_path: &Path, workspace: Option<&Path>) -> Result<Self> {
        let manifest = manifest::load(manifest_path)?;
        let descriptor = descriptor::load(&manifest.descriptor_path())?;
        let workspace = workspace
            .map(Path::to_path_buf)
            .unwrap_or_else(|| manifest.dir());
        tracing::debug!(
            manifest = %manifest_path.display(),
            workspace = %workspace.display(),
            tasks = manifest.tasks.len(),
            "pipeline opened"
        );
        Self::from_parts(manifest, descriptor, workspace)
    }

    pub fn from_parts(manifest: Manifest, descriptor: Descriptor, workspace: PathBuf) -> Result<Self> {
        let registry = manifest.registry()?;
        let mut tools = ToolRegistry::with_builtins();
        for (id, definition) in &manifest.tools {
            tools.register(Arc::new(ExternalTool::from_definition(id, definition)?))?;
        }

        Ok(Self {
            manifest,
            descriptor,
            registry,
            tools,
            workspace,
        })
    }

    /// Add a handler beyond the built-ins and manifest tools.
    pub fn register_tool(&mut self, handler: Arc<dyn ToolHandler>) -> Result<()> {
        self.tools.register(handler)
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Descriptor, then vars, then the task configuration tree.
    fn scope(&self) -> Layered<'_> {
        Layered::new()
            .with(&self.descriptor)
            .with(&self.manifest.vars)
            .with(&self.manifest.config)
    }

    pub fn resolve(&self, task: &str) -> Result<Vec<&AtomicTask>> {
        resolver::resolve(&self.registry, task)
    }

    pub fn plan(&self, task: &str) -> Result<Plan> {
        let sequence = self.resolve(task)?;
        let steps = executor::preflight(&sequence, &self.tools, &self.scope(), &self.workspace)?;
        Ok(Plan {
            task: task.to_string(),
            workspace: self.workspace.display().to_string(),
            steps,
        })
    }

    /// Resolve and check `task`, then execute it. Errors before the first step are
    /// returned as `Err`; failures during the run are reported in the result.
    pub fn run(&self, task: &str, dry_run: bool) -> Result<ExecutionResult> {
        let sequence = self.resolve(task)?;
        let scope = self.scope();
        executor::preflight(&sequence, &self.tools, &scope, &self.workspace)?;

        let executor = Executor::new(&self.tools, &scope, &self.workspace).dry_run(dry_run);
        if dry_run {
            return Ok(executor.run(task, &sequence));
        }

        let run_id = uuid::Uuid::new_v4().to_string();
        let _lock = RunLock::acquire(&self.workspace, &run_id)?;
        log_status!("run", "{} ({} steps)", task, sequence.len());
        Ok(executor.run_with_id(run_id, task, &sequence))
    }

    pub fn list(&self) -> TaskListing {
        TaskListing {
            composites: self
                .registry
                .composites()
                .map(|c| CompositeSummary {
                    name: c.name.clone(),
                    refs: c.refs.clone(),
                })
                .collect(),
            tasks: self
                .registry
                .atomics()
                .map(|t| TaskSummary {
                    key: t.key.to_string(),
                    tool: t.tool.clone(),
                })
                .collect(),
            tools: self
                .tools
                .ids()
                .into_iter()
                .filter_map(|id| {
                    self.tools.get(&id).map(|h| ToolSummary {
                        outputs: h.declared_outputs(),
                        id,
                    })
                })
                .collect(),
        }
    }

    /// Resolve and preflight every composite, collecting every problem found.
    pub fn validate(&self) -> ValidationReport {
        let mut composites = Vec::new();
        let mut issues = Vec::new();
        let mut first_error = None;

        let names: Vec<String> = self.registry.composites().map(|c| c.name.clone()).collect();
        for name in names {
            match self.plan(&name) {
                Ok(plan) => composites.push((name, plan.steps.len())),
                Err(err) => {
                    issues.push(ValidationIssue {
                        task: name,
                        code: err.code.as_str().to_string(),
                        message: err.message.clone(),
                        details: err.details.clone(),
                    });
                    first_error.get_or_insert(err);
                }
            }
        }

        ValidationReport {
            valid: issues.is_empty(),
            composites,
            issues,
            first_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::executor::RunStatus;
    use crate::lock::LOCK_FILE;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn write_project(manifest: serde_json::Value) -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("package.json"),
            json!({ "name": "fei-demo", "version": "1.2.0", "author": "Fei Team", "license": "MIT" })
                .to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("assetline.json"), manifest.to_string()).unwrap();
        fs::create_dir_all(dir.path().join("public/js")).unwrap();
        fs::write(dir.path().join("public/main.js"), "var main;").unwrap();
        fs::write(dir.path().join("public/js/util.js"), "var util;").unwrap();
        dir
    }

    fn js_manifest() -> serde_json::Value {
        json!({
            "vars": { "banner": "/* <%= pkg.name %> v<%= pkg.version %> */" },
            "tasks": {
                "clean": { "dist": "dist" },
                "concat": {
                    "options": { "banner": "<%= banner %>" },
                    "core": { "src": ["public/main.js", "public/js/*.js"], "dest": "dist/<%= pkg.name %>.js" }
                },
                "copy": {
                    "docs": { "src": "<%= concat.core.dest %>", "dest": "docs/assets/js/" }
                }
            },
            "aliases": {
                "compile-js": ["clean:dist", "concat"],
                "default": ["compile-js", "copy:docs"]
            }
        })
    }

    fn open(dir: &TempDir) -> Pipeline {
        Pipeline::open(&dir.path().join("assetline.json"), None).unwrap()
    }

    #[test]
    fn run_executes_builtin_tools_end_to_end() {
        let dir = write_project(js_manifest());
        let pipeline = open(&dir);

        let result = pipeline.run("default", false).unwrap();
        assert_eq!(result.status, RunStatus::Completed, "{:?}", result.error);
        assert_eq!(result.steps.len(), 3);

        let built = fs::read_to_string(dir.path().join("dist/fei-demo.js")).unwrap();
        assert_eq!(built, "/* fei-demo v1.2.0 */\nvar main;\nvar util;");
        assert!(dir.path().join("docs/assets/js/dist/fei-demo.js").is_file());
        assert!(!dir.path().join(LOCK_FILE).exists());
    }

    #[test]
    fn plan_resolves_without_side_effects() {
        let dir = write_project(js_manifest());
        let pipeline = open(&dir);

        let plan = pipeline.plan("default").unwrap();
        let keys: Vec<&str> = plan.steps.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(keys, vec!["clean:dist", "concat:core", "copy:docs"]);
        assert_eq!(plan.steps[1].step.dest.as_deref(), Some("dist/fei-demo.js"));
        assert!(!dir.path().join("dist").exists());
    }

    #[test]
    fn resolution_errors_abort_before_any_step() {
        let mut manifest = js_manifest();
        manifest["aliases"]["broken"] = json!(["clean:dist", "uglify:build"]);
        let dir = write_project(manifest);
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        let pipeline = open(&dir);

        let err = pipeline.run("broken", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskUnknown);
        assert!(dir.path().join("dist").exists());
    }

    #[test]
    fn unresolved_templates_abort_before_any_step() {
        let mut manifest = js_manifest();
        manifest["tasks"]["copy"]["docs"]["dest"] = json!("docs/<%= pkg.missing %>/");
        let dir = write_project(manifest);
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        let pipeline = open(&dir);

        let err = pipeline.run("default", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::TemplateUnresolved);
        assert_eq!(err.details["step"], "copy:docs");
        assert!(dir.path().join("dist").exists());
    }

    #[test]
    fn held_lock_rejects_a_second_run() {
        let dir = write_project(js_manifest());
        let pipeline = open(&dir);
        let _held = RunLock::acquire(dir.path(), "other").unwrap();

        let err = pipeline.run("default", false).unwrap_err();
        assert_eq!(err.code, ErrorCode::RunLocked);
        assert!(!dir.path().join("dist").exists());
    }

    #[test]
    fn dry_run_skips_the_lock_and_writes_nothing() {
        let dir = write_project(js_manifest());
        let pipeline = open(&dir);
        let _held = RunLock::acquire(dir.path(), "other").unwrap();

        let result = pipeline.run("default", true).unwrap();
        assert!(result.succeeded());
        assert!(result.dry_run);
        assert!(!dir.path().join("dist").exists());
    }

    #[test]
    fn list_reports_registered_names_in_order() {
        let dir = write_project(js_manifest());
        let listing = open(&dir).list();

        let composites: Vec<&str> = listing.composites.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(composites, vec!["compile-js", "default"]);
        let tasks: Vec<&str> = listing.tasks.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(tasks, vec!["clean:dist", "concat:core", "copy:docs"]);
        assert!(listing.tools.iter().any(|t| t.id == "usebanner"));
    }

    #[test]
    fn validate_collects_issues_per_composite() {
        let mut manifest = js_manifest();
        manifest["aliases"]["loop"] = json!(["loop"]);
        let dir = write_project(manifest);

        let report = open(&dir).validate();
        assert!(!report.valid);
        assert_eq!(report.composites.len(), 2);
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].code, "task.cyclic");
        assert_eq!(report.first_error.unwrap().code, ErrorCode::TaskCyclic);
    }

    #[test]
    fn manifest_tools_cannot_shadow_builtins() {
        let mut manifest = js_manifest();
        manifest["tools"] = json!({ "copy": { "program": "cp" } });
        let dir = write_project(manifest);

        let result = Pipeline::open(&dir.path().join("assetline.json"), None);
        assert_eq!(result.err().unwrap().code, ErrorCode::ConfigInvalidValue);
    }
}
