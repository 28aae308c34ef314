use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{ProducedOutputs, ToolHandler, ToolInvocation};
use crate::error::{Error, Result};
use crate::lock::LOCK_FILE;
use crate::utils::files::SourceFile;
use crate::utils::io;

/// Deletes every matched file or directory.
///
/// Matches must lie strictly inside the workspace unless `options.force` is set.
/// Every match is checked before anything is removed. The run lock is never removed.
pub struct Clean;

impl ToolHandler for Clean {
    fn id(&self) -> &str {
        "clean"
    }

    fn declared_outputs(&self) -> Vec<String> {
        vec!["removed".to_string()]
    }

    fn invoke(&self, invocation: &ToolInvocation<'_>) -> Result<ProducedOutputs> {
        let force = invocation.step.option_bool("force", false);
        let root = canonical(invocation.workspace)?;
        let mut targets = Vec::new();
        for source in invocation.sources()? {
            let resolved = canonical(&source.path)?;
            if !force {
                check_inside(invocation, &root, &source, &resolved)?;
            }
            targets.push((source, resolved));
        }

        let lock = root.join(LOCK_FILE);
        let mut removed = Vec::new();
        for (source, resolved) in targets {
            if resolved == lock {
                tracing::debug!(path = %source.relative, "clean skipped the run lock");
                continue;
            }
            if io::remove_path(&source.path, "clean")? {
                removed.push(Value::String(source.relative));
            }
        }
        tracing::debug!(count = removed.len(), "clean removed paths");

        let mut outputs = ProducedOutputs::new();
        outputs.insert("removed".to_string(), Value::Array(removed));
        Ok(outputs)
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("clean resolve {}", path.display())))
    })
}

fn check_inside(
    invocation: &ToolInvocation<'_>,
    root: &Path,
    target: &SourceFile,
    resolved: &Path,
) -> Result<()> {
    if resolved == root {
        return Err(invocation.fail(format!(
            "refusing to delete the workspace itself ('{}'); set options.force to override",
            target.relative
        )));
    }
    if !resolved.starts_with(root) {
        return Err(invocation.fail(format!(
            "refusing to delete '{}' outside the workspace; set options.force to override",
            resolved.display()
        )));
    }
    Ok(())
}
