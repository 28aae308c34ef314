//! Sequential, fail-fast execution of a resolved step sequence.
//!
//! Each step is rendered against the run context layered over the static scope,
//! handed to its tool, and its declared outputs are merged back into the context
//! for later steps. The first failure ends the run.

use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::context::{ExecutionContext, PendingOutputs};
use crate::error::{Error, ErrorCode, ErrorKind, Hint, Result};
use crate::registry::AtomicTask;
use crate::template::{Layered, Lookup};
use crate::tools::{ProducedOutputs, RenderedStep, ToolInvocation, ToolRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Succeeded,
    Failed,
    /// Rendered during a dry run; the tool was not invoked.
    Planned,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub index: usize,
    pub key: String,
    pub tool: String,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub outputs: ProducedOutputs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered: Option<RenderedStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedStep {
    pub index: usize,
    pub key: String,
    pub tool: String,
}

/// Serializable form of the error that ended a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    pub details: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hints: Vec<Hint>,
    #[serde(skip)]
    pub error_code: ErrorCode,
}

impl From<&Error> for RunError {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code.as_str().to_string(),
            kind: err.kind(),
            message: err.message.clone(),
            details: err.details.clone(),
            hints: err.hints.clone(),
            error_code: err.code,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub run_id: String,
    pub task: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<FailedStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RunError>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

// Run state machine: Idle -> Running(i) -> Completed | Failed(i).
// Each transition consumes the previous state.

struct Idle;

struct Running {
    index: usize,
    total: usize,
}

enum Finished {
    Completed,
    Failed(usize),
}

enum Progress {
    Running(Running),
    Done(Finished),
}

impl Idle {
    fn start(self, total: usize) -> Progress {
        if total == 0 {
            Progress::Done(Finished::Completed)
        } else {
            Progress::Running(Running { index: 0, total })
        }
    }
}

impl Running {
    fn succeed(self) -> Progress {
        let next = self.index + 1;
        if next == self.total {
            Progress::Done(Finished::Completed)
        } else {
            Progress::Running(Running {
                index: next,
                total: self.total,
            })
        }
    }

    fn fail(self) -> Finished {
        Finished::Failed(self.index)
    }
}

/// Attach the failing step's position to an error's details.
fn at_step(mut err: Error, index: usize, key: &str) -> Error {
    if let Value::Object(details) = &mut err.details {
        details
            .entry("step")
            .or_insert_with(|| Value::String(key.to_string()));
        details.entry("index").or_insert_with(|| Value::from(index));
    }
    err
}

pub struct Executor<'a> {
    tools: &'a ToolRegistry,
    scope: &'a dyn Lookup,
    workspace: &'a Path,
    dry_run: bool,
}

impl<'a> Executor<'a> {
    /// `scope` holds the static layers (descriptor, vars, task configuration).
    pub fn new(tools: &'a ToolRegistry, scope: &'a dyn Lookup, workspace: &'a Path) -> Self {
        Self {
            tools,
            scope,
            workspace,
            dry_run: false,
        }
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn run(&self, task: &str, sequence: &[&AtomicTask]) -> ExecutionResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        self.run_with_id(run_id, task, sequence)
    }

    pub fn run_with_id(
        &self,
        run_id: String,
        task: &str,
        sequence: &[&AtomicTask],
    ) -> ExecutionResult {
        let started_at = Utc::now();
        let mut context = ExecutionContext::new();
        let mut steps = Vec::with_capacity(sequence.len());
        let mut error = None;

        tracing::info!(run_id = %run_id, task, steps = sequence.len(), dry_run = self.dry_run, "run started");

        let mut progress = Idle.start(sequence.len());
        let finished = loop {
            let running = match progress {
                Progress::Running(running) => running,
                Progress::Done(finished) => break finished,
            };
            let index = running.index;
            let step = sequence[index];
            log_status!("run", "[{}/{}] {}", index + 1, sequence.len(), step.key);

            match self.execute_step(index, step, &mut context) {
                Ok(record) => {
                    steps.push(record);
                    progress = running.succeed();
                }
                Err((record, err)) => {
                    tracing::error!(step = %step.key, index, code = err.code.as_str(), "{}", err.message);
                    steps.push(record);
                    error = Some(err);
                    break running.fail();
                }
            }
        };

        let (status, failed_step) = match finished {
            Finished::Completed => (RunStatus::Completed, None),
            Finished::Failed(index) => (
                RunStatus::Failed,
                Some(FailedStep {
                    index,
                    key: sequence[index].key.to_string(),
                    tool: sequence[index].tool.clone(),
                }),
            ),
        };
        tracing::info!(run_id = %run_id, ?status, "run finished");

        ExecutionResult {
            run_id,
            task: task.to_string(),
            status,
            dry_run: self.dry_run,
            started_at,
            finished_at: Utc::now(),
            steps,
            failed_step,
            error: error.as_ref().map(RunError::from),
        }
    }

    fn execute_step(
        &self,
        index: usize,
        task: &AtomicTask,
        context: &mut ExecutionContext,
    ) -> std::result::Result<StepRecord, (StepRecord, Error)> {
        let started = Instant::now();
        let key = task.key.to_string();
        let mut record = StepRecord {
            index,
            key: key.clone(),
            tool: task.tool.clone(),
            status: StepStatus::Failed,
            duration_ms: 0,
            command: None,
            outputs: ProducedOutputs::new(),
            rendered: None,
        };

        let outcome = self.invoke_step(task, context, &mut record);
        record.duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(outputs) => {
                record.status = if self.dry_run {
                    StepStatus::Planned
                } else {
                    StepStatus::Succeeded
                };
                context.insert(&task.key, outputs.clone());
                if !self.dry_run {
                    record.outputs = outputs;
                }
                tracing::debug!(step = %key, ms = record.duration_ms, "step finished");
                Ok(record)
            }
            Err(err) => Err((record, at_step(err, index, &key))),
        }
    }

    fn invoke_step(
        &self,
        task: &AtomicTask,
        context: &ExecutionContext,
        record: &mut StepRecord,
    ) -> Result<ProducedOutputs> {
        let key = task.key.to_string();
        let scope = Layered::new().with(context).with(self.scope);
        let rendered = RenderedStep::render(task, &scope)?;

        let handler = self
            .tools
            .get(&task.tool)
            .ok_or_else(|| Error::tool_not_found(&task.tool, Some(key.clone()), self.tools.ids()))?;

        let invocation = ToolInvocation {
            step: &rendered,
            workspace: self.workspace,
            context,
            scope: &scope,
            planning: self.dry_run,
        };

        if self.dry_run {
            record.command = handler.preview(&invocation)?;
            let outputs = handler
                .declared_outputs()
                .into_iter()
                .map(|name| {
                    let placeholder =
                        PendingOutputs::placeholder(&task.key.group, &task.key.target, &name);
                    (name, Value::String(placeholder))
                })
                .collect();
            record.rendered = Some(rendered.clone());
            return Ok(outputs);
        }

        record.command = match handler.preview(&invocation) {
            Ok(command) => command,
            Err(err) => {
                tracing::warn!(step = %key, error = %err, "could not render command preview");
                None
            }
        };
        handler
            .invoke(&invocation)
            .map_err(|e| e.wrap_tool_failure(&task.tool, &key))
    }
}

/// A step as checked before anything runs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    pub index: usize,
    pub key: String,
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub produces: Vec<String>,
    pub step: RenderedStep,
}

/// Check a whole sequence without side effects: every tool exists, every template
/// renders (outputs of earlier steps stand in as placeholders), every tool accepts
/// its step.
pub fn preflight(
    sequence: &[&AtomicTask],
    tools: &ToolRegistry,
    scope: &dyn Lookup,
    workspace: &Path,
) -> Result<Vec<PlannedStep>> {
    let mut pending = PendingOutputs::new();
    let context = ExecutionContext::new();
    let mut planned = Vec::with_capacity(sequence.len());

    for (index, task) in sequence.iter().enumerate() {
        let key = task.key.to_string();
        let handler = tools.get(&task.tool).ok_or_else(|| {
            at_step(
                Error::tool_not_found(&task.tool, Some(key.clone()), tools.ids()),
                index,
                &key,
            )
        })?;

        let layered = Layered::new().with(&pending).with(scope);
        let rendered =
            RenderedStep::render(task, &layered).map_err(|e| at_step(e, index, &key))?;
        handler
            .check(&rendered)
            .map_err(|e| at_step(e, index, &key))?;

        let command = handler
            .preview(&ToolInvocation {
                step: &rendered,
                workspace,
                context: &context,
                scope: &layered,
                planning: true,
            })
            .map_err(|e| at_step(e, index, &key))?;

        let produces = handler.declared_outputs();
        pending.declare(&task.key, &produces);
        planned.push(PlannedStep {
            index,
            key,
            tool: task.tool.clone(),
            command,
            produces,
            step: rendered,
        });
    }

    tracing::debug!(steps = planned.len(), "preflight passed");
    Ok(planned)
}
