use std::path::Path;

use serde_json::Value;

use super::{ProducedOutputs, ToolHandler, ToolInvocation};
use crate::error::Result;
use crate::utils::files::{self, SourceFile};
use crate::utils::io;

/// Copies matched sources into `dest`, plus any `files` mappings.
///
/// `dest` is a directory when it ends in `/`, when `expand` is set, or when several
/// sources matched; otherwise it names the target file. Inside a directory the
/// source's path relative to `cwd` is preserved unless `options.flatten` is true.
pub struct CopyFiles;

impl ToolHandler for CopyFiles {
    fn id(&self) -> &str {
        "copy"
    }

    fn declared_outputs(&self) -> Vec<String> {
        vec!["files".to_string()]
    }

    fn invoke(&self, invocation: &ToolInvocation<'_>) -> Result<ProducedOutputs> {
        let step = invocation.step;
        let flatten = step.option_bool("flatten", false);
        let mut written = Vec::new();

        if !step.src.is_empty() {
            let sources = invocation.sources()?;
            let dest = invocation.dest()?;
            copy_set(invocation, &sources, dest, &step.src, flatten, &mut written)?;
        }

        for set in &step.files {
            let sources = files::expand(&set.src, &invocation.base_dir())?;
            copy_set(invocation, &sources, &set.dest, &set.src, flatten, &mut written)?;
        }

        let mut outputs = ProducedOutputs::new();
        outputs.insert(
            "files".to_string(),
            Value::Array(written.into_iter().map(Value::String).collect()),
        );
        Ok(outputs)
    }
}

fn copy_set(
    invocation: &ToolInvocation<'_>,
    sources: &[SourceFile],
    dest: &str,
    patterns: &[String],
    flatten: bool,
    written: &mut Vec<String>,
) -> Result<()> {
    let files: Vec<&SourceFile> = sources.iter().filter(|s| s.path.is_file()).collect();
    if files.is_empty() {
        return Err(invocation.fail(format!(
            "no source files matched {}",
            patterns.join(", ")
        )));
    }

    let into_dir = dest.ends_with('/') || invocation.step.expand || files.len() > 1;
    for source in files {
        let target = if into_dir {
            let name = if flatten {
                file_name(&source.path)
            } else {
                source.relative.clone()
            };
            format!("{}/{}", dest.trim_end_matches('/'), name)
        } else {
            dest.to_string()
        };

        io::copy_file(&source.path, &invocation.resolve(&target), "copy")?;
        tracing::trace!(from = %source.relative, to = %target, "copied");
        written.push(target);
    }
    Ok(())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
