use serde_json::Value;

use super::{ProducedOutputs, RenderedStep, ToolHandler, ToolInvocation};
use crate::error::{Error, Result};
use crate::utils::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Top,
    Bottom,
}

fn position(step: &RenderedStep) -> Result<Position> {
    match step.option_str("position") {
        None | Some("top") => Ok(Position::Top),
        Some("bottom") => Ok(Position::Bottom),
        Some(other) => Err(Error::tool_failed(
            "usebanner",
            format!("unknown banner position '{}' (expected top or bottom)", other),
        )),
    }
}

/// Adds `options.banner` to every matched file in place.
pub struct UseBanner;

impl ToolHandler for UseBanner {
    fn id(&self) -> &str {
        "usebanner"
    }

    fn declared_outputs(&self) -> Vec<String> {
        vec!["files".to_string()]
    }

    fn check(&self, step: &RenderedStep) -> Result<()> {
        position(step).map(|_| ())
    }

    fn invoke(&self, invocation: &ToolInvocation<'_>) -> Result<ProducedOutputs> {
        let step = invocation.step;
        let position = position(step)?;
        let linebreak = step.option_bool("linebreak", true);
        let banner = step.option_str("banner").unwrap_or_default();

        let mut touched = Vec::new();
        for source in invocation.sources()? {
            if !source.path.is_file() {
                continue;
            }
            let content = io::read_file(&source.path, "usebanner")?;
            let sep = if linebreak { "\n" } else { "" };
            let updated = match position {
                Position::Top => format!("{}{}{}", banner, sep, content),
                Position::Bottom => format!("{}{}{}", content, sep, banner),
            };
            io::write_file(&source.path, &updated, "usebanner")?;
            touched.push(Value::String(source.relative));
        }

        if touched.is_empty() {
            tracing::warn!(step = %step.key, "usebanner matched no files");
        }

        let mut outputs = ProducedOutputs::new();
        outputs.insert("files".to_string(), Value::Array(touched));
        Ok(outputs)
    }
}
