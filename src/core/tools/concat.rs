use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{ProducedOutputs, RenderedStep, ToolHandler, ToolInvocation};
use crate::error::{Error, Result};
use crate::utils::files::{self, SourceFile};
use crate::utils::io;

/// Joins matched files into `dest`.
///
/// Options: `separator` (default `"\n"`), `banner` (written first, followed by a
/// newline), `stripBanners` (drop each source's leading comment).
///
/// `stripBanners: true` keeps `/*!` license blocks; `{ "block": true }` strips
/// those too and `{ "line": true }` also strips leading `//` lines.
pub struct Concat;

impl ToolHandler for Concat {
    fn id(&self) -> &str {
        "concat"
    }

    fn declared_outputs(&self) -> Vec<String> {
        vec!["dest".to_string(), "files".to_string()]
    }

    fn check(&self, step: &RenderedStep) -> Result<()> {
        if step.dest.is_none() && step.files.is_empty() {
            return Err(Error::tool_failed(
                "concat",
                format!("step '{}' needs 'dest' or 'files'", step.key),
            ));
        }
        Ok(())
    }

    fn invoke(&self, invocation: &ToolInvocation<'_>) -> Result<ProducedOutputs> {
        let step = invocation.step;
        let mut written = Vec::new();

        if let Some(dest) = &step.dest {
            let sources = invocation.sources()?;
            join_into(invocation, &sources, dest, &step.src)?;
            written.push(dest.clone());
        }
        for set in &step.files {
            let sources = files::expand(&set.src, &invocation.base_dir())?;
            join_into(invocation, &sources, &set.dest, &set.src)?;
            written.push(set.dest.clone());
        }

        let mut outputs = ProducedOutputs::new();
        if let Some(last) = written.last() {
            outputs.insert("dest".to_string(), Value::String(last.clone()));
        }
        outputs.insert(
            "files".to_string(),
            Value::Array(written.into_iter().map(Value::String).collect()),
        );
        Ok(outputs)
    }
}

fn join_into(
    invocation: &ToolInvocation<'_>,
    sources: &[SourceFile],
    dest: &str,
    patterns: &[String],
) -> Result<()> {
    let step = invocation.step;
    let files: Vec<&SourceFile> = sources.iter().filter(|s| s.path.is_file()).collect();
    if files.is_empty() {
        return Err(invocation.fail(format!(
            "no source files matched {}",
            patterns.join(", ")
        )));
    }

    let separator = step.option_str("separator").unwrap_or("\n");
    let strip = BannerStrip::from_option(step.option("stripBanners"));

    let mut parts = Vec::with_capacity(files.len());
    for source in files {
        let content = io::read_file(&source.path, "concat")?;
        parts.push(match strip {
            Some(strip) => strip.apply(&content).to_string(),
            None => content,
        });
    }

    let mut output = String::new();
    if let Some(banner) = step.option_str("banner").filter(|b| !b.is_empty()) {
        output.push_str(banner);
        output.push('\n');
    }
    output.push_str(&parts.join(separator));

    io::write_file(&invocation.resolve(dest), &output, "concat")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BannerStrip {
    block: bool,
    line: bool,
}

impl BannerStrip {
    fn from_option(value: Option<&Value>) -> Option<Self> {
        match value? {
            Value::Bool(true) => Some(Self {
                block: false,
                line: false,
            }),
            Value::Object(map) => {
                let flag = |name: &str| map.get(name).and_then(Value::as_bool).unwrap_or(false);
                Some(Self {
                    block: flag("block"),
                    line: flag("line"),
                })
            }
            _ => None,
        }
    }

    fn pattern(self) -> &'static Regex {
        static COMMENT: OnceLock<Regex> = OnceLock::new();
        static ANY_BLOCK: OnceLock<Regex> = OnceLock::new();
        static COMMENT_OR_LINES: OnceLock<Regex> = OnceLock::new();
        static ANY_BLOCK_OR_LINES: OnceLock<Regex> = OnceLock::new();

        match (self.block, self.line) {
            (false, false) => COMMENT.get_or_init(|| {
                Regex::new(r"^\s*/\*[^!][\s\S]*?\*/\s*").expect("banner pattern is valid")
            }),
            (true, false) => ANY_BLOCK.get_or_init(|| {
                Regex::new(r"^\s*/\*[\s\S]*?\*/\s*").expect("banner pattern is valid")
            }),
            (false, true) => COMMENT_OR_LINES.get_or_init(|| {
                Regex::new(r"^\s*(?:/\*[^!][\s\S]*?\*/|(?://[^\n]*\n)+)\s*")
                    .expect("banner pattern is valid")
            }),
            (true, true) => ANY_BLOCK_OR_LINES.get_or_init(|| {
                Regex::new(r"^\s*(?:/\*[\s\S]*?\*/|(?://[^\n]*\n)+)\s*")
                    .expect("banner pattern is valid")
            }),
        }
    }

    fn apply(self, content: &str) -> &str {
        match self.pattern().find(content) {
            Some(m) => &content[m.end()..],
            None => content,
        }
    }
}
