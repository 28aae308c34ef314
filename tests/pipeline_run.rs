use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use assetline::descriptor;
use assetline::error::ErrorKind;
use assetline::executor::StepStatus;
use assetline::lock::RunLock;
use assetline::manifest::{self, Format};
use assetline::tools::{ProducedOutputs, ToolHandler, ToolInvocation};
use assetline::{ErrorCode, Pipeline, Result, RunStatus};
use serde_json::json;
use tempfile::TempDir;

/// Fake tool that records each rendered step and fails on demand.
struct Scripted {
    id: &'static str,
    fail: bool,
    calls: Arc<Mutex<Vec<(String, Option<String>)>>>,
}

impl ToolHandler for Scripted {
    fn id(&self) -> &str {
        self.id
    }

    fn declared_outputs(&self) -> Vec<String> {
        vec!["out".to_string()]
    }

    fn invoke(&self, invocation: &ToolInvocation<'_>) -> Result<ProducedOutputs> {
        self.calls
            .lock()
            .unwrap()
            .push((invocation.step.key.clone(), invocation.step.dest.clone()));
        if self.fail {
            return Err(invocation.fail("scripted failure"));
        }
        let mut outputs = ProducedOutputs::new();
        outputs.insert("out".to_string(), json!(format!("{}.out", self.id)));
        Ok(outputs)
    }
}

type Calls = Arc<Mutex<Vec<(String, Option<String>)>>>;

fn scripted_pipeline(workspace: &Path, failing: &[&'static str]) -> (Pipeline, Calls) {
    let manifest = manifest::parse(
        &json!({
            "tasks": {
                "a": { "one": { "dest": "a/<%= pkg.name %>" } },
                "b": { "one": { "dest": "<%= a.one.out %>/b" } },
                "c": { "one": { "dest": "<%= b.one.out %>/c" } }
            },
            "aliases": { "build": ["a:one", "b:one", "c:one"] }
        })
        .to_string(),
        Format::Json,
        &workspace.join("assetline.json"),
    )
    .unwrap();
    let descriptor = descriptor::from_value(
        json!({ "name": "fei-demo", "version": "1.2.0", "author": "Fei Team", "license": "MIT" }),
        "package.json",
    )
    .unwrap();

    let mut pipeline =
        Pipeline::from_parts(manifest, descriptor, PathBuf::from(workspace)).unwrap();
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    for id in ["a", "b", "c"] {
        pipeline
            .register_tool(Arc::new(Scripted {
                id,
                fail: failing.contains(&id),
                calls: calls.clone(),
            }))
            .unwrap();
    }
    (pipeline, calls)
}

#[test]
fn failing_middle_step_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let (pipeline, calls) = scripted_pipeline(dir.path(), &["b"]);

    let result = pipeline.run("build", false).unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    let failed = result.failed_step.as_ref().unwrap();
    assert_eq!(failed.index, 1);
    assert_eq!(failed.key, "b:one");

    let keys: Vec<String> = calls.lock().unwrap().iter().map(|(k, _)| k.clone()).collect();
    assert_eq!(keys, vec!["a:one", "b:one"]);

    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].status, StepStatus::Succeeded);
    assert_eq!(result.steps[1].status, StepStatus::Failed);

    let error = result.error.as_ref().unwrap();
    assert_eq!(error.kind, ErrorKind::ToolInvocation);
    assert_eq!(error.details["step"], "b:one");
    assert_eq!(error.details["index"], 1);
}

#[test]
fn outputs_of_earlier_steps_feed_later_templates() {
    let dir = TempDir::new().unwrap();
    let (pipeline, calls) = scripted_pipeline(dir.path(), &[]);

    let result = pipeline.run("build", false).unwrap();
    assert!(result.succeeded());

    let dests: Vec<Option<String>> = calls.lock().unwrap().iter().map(|(_, d)| d.clone()).collect();
    assert_eq!(
        dests,
        vec![
            Some("a/fei-demo".to_string()),
            Some("a.out/b".to_string()),
            Some("b.out/c".to_string()),
        ]
    );
    assert_eq!(result.steps[2].outputs["out"], "c.out");
}

#[test]
fn held_lock_prevents_any_step_from_running() {
    let dir = TempDir::new().unwrap();
    let (pipeline, calls) = scripted_pipeline(dir.path(), &[]);
    let _held = RunLock::acquire(dir.path(), "someone-else").unwrap();

    let err = pipeline.run("build", false).unwrap_err();

    assert_eq!(err.code, ErrorCode::RunLocked);
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn dry_run_renders_with_placeholders_and_invokes_nothing() {
    let dir = TempDir::new().unwrap();
    let (pipeline, calls) = scripted_pipeline(dir.path(), &[]);

    let result = pipeline.run("build", true).unwrap();

    assert!(result.succeeded());
    assert!(calls.lock().unwrap().is_empty());
    assert!(result.steps.iter().all(|s| s.status == StepStatus::Planned));
    let rendered = result.steps[1].rendered.as_ref().unwrap();
    assert_eq!(rendered.dest.as_deref(), Some("<pending a.one.out>/b"));
}

#[test]
fn yaml_manifest_drives_builtin_tools() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::write(
        root.join("package.json"),
        json!({ "name": "fei-demo", "version": "1.2.0", "author": "Fei Team", "license": "MIT" })
            .to_string(),
    )
    .unwrap();
    fs::create_dir_all(root.join("less")).unwrap();
    fs::create_dir_all(root.join("dist/stale")).unwrap();
    fs::write(root.join("less/base.css"), "body{}").unwrap();
    fs::write(root.join("less/theme.css"), "a{}").unwrap();
    fs::write(
        root.join("assetline.yaml"),
        r#"
vars:
  banner: "/* <%= pkg.name %> v<%= pkg.version %> | <%= pkg.license %> */"
tasks:
  clean:
    dist: dist
  concat:
    css:
      src: ["less/base.css", "less/theme.css"]
      dest: "dist/css/<%= pkg.name %>.css"
  usebanner:
    options:
      banner: "<%= banner %>"
    css:
      src: "<%= concat.css.dest %>"
  copy:
    docs:
      src: "<%= concat.css.dest %>"
      dest: "docs/"
      options:
        flatten: true
aliases:
  compile-css: ["clean:dist", "concat", "usebanner", "copy:docs"]
"#,
    )
    .unwrap();

    let pipeline = Pipeline::open(&root.join("assetline.yaml"), None).unwrap();
    let result = pipeline.run("compile-css", false).unwrap();

    assert!(result.succeeded(), "{:?}", result.error);
    assert!(!root.join("dist/stale").exists());
    let css = fs::read_to_string(root.join("dist/css/fei-demo.css")).unwrap();
    assert_eq!(css, "/* fei-demo v1.2.0 | MIT */\nbody{}\na{}");
    assert_eq!(
        fs::read_to_string(root.join("docs/fei-demo.css")).unwrap(),
        css
    );
}

#[test]
fn unknown_task_suggests_close_names() {
    let dir = TempDir::new().unwrap();
    let (pipeline, calls) = scripted_pipeline(dir.path(), &[]);

    let err = pipeline.run("biuld", false).unwrap_err();

    assert_eq!(err.code, ErrorCode::TaskUnknown);
    assert_eq!(err.details["suggestions"][0], "build");
    assert!(calls.lock().unwrap().is_empty());
}

#[test]
fn failed_run_serializes_step_position_and_cause() {
    let dir = TempDir::new().unwrap();
    let (pipeline, _) = scripted_pipeline(dir.path(), &["c"]);

    let result = pipeline.run("build", false).unwrap();
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["status"], "failed");
    assert_eq!(value["failedStep"]["index"], 2);
    assert_eq!(value["failedStep"]["key"], "c:one");
    assert_eq!(value["error"]["code"], "tool.invocation_failed");
    assert_eq!(value["error"]["kind"], "ToolInvocationError");
    assert!(value.get("dryRun").is_none());
    assert_eq!(value["steps"].as_array().unwrap().len(), 3);
}

#[cfg(unix)]
#[test]
fn external_tool_consumes_files_an_earlier_step_writes() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    let manifest = manifest::parse(
        &json!({
            "tools": {
                "minify": { "program": "cp", "args": ["<%= sources.0 %>", "<%= dest %>"] }
            },
            "tasks": {
                "exec": { "gen": "mkdir -p dist && printf 'var a;' > dist/app.js" },
                "minify": { "js": { "src": ["dist/app.js"], "dest": "dist/app.min.js" } }
            },
            "aliases": { "build": ["exec:gen", "minify:js"] }
        })
        .to_string(),
        Format::Json,
        &root.join("assetline.json"),
    )
    .unwrap();
    let descriptor = descriptor::from_value(
        json!({ "name": "fei-demo", "version": "1.2.0", "author": "Fei Team", "license": "MIT" }),
        "package.json",
    )
    .unwrap();
    let pipeline = Pipeline::from_parts(manifest, descriptor, PathBuf::from(root)).unwrap();

    let plan = pipeline.plan("build").unwrap();
    assert_eq!(
        plan.steps[1].command.as_deref(),
        Some("cp dist/app.js dist/app.min.js")
    );
    assert!(!root.join("dist").exists());

    let result = pipeline.run("build", false).unwrap();
    assert!(result.succeeded(), "{:?}", result.error);
    assert_eq!(
        fs::read_to_string(root.join("dist/app.min.js")).unwrap(),
        "var a;"
    );
}
