use std::path::{Path, PathBuf};

use assetline::Pipeline;

pub type CmdResult<T> = assetline::Result<(T, i32)>;

/// Options shared by every subcommand.
pub(crate) struct GlobalArgs {
    pub manifest: String,
    pub workspace: Option<String>,
}

impl GlobalArgs {
    pub fn manifest_path(&self) -> assetline::Result<PathBuf> {
        expand_path("file", &self.manifest)
    }

    pub fn workspace_path(&self) -> assetline::Result<Option<PathBuf>> {
        self.workspace
            .as_deref()
            .map(|w| expand_path("workspace", w))
            .transpose()
    }

    /// Load the manifest named by `--file` into a pipeline.
    pub fn open(&self) -> assetline::Result<Pipeline> {
        let manifest = self.manifest_path()?;
        let workspace = self.workspace_path()?;
        Pipeline::open(&manifest, workspace.as_deref())
    }
}

/// Expand `~` and `$VAR` in a path argument.
fn expand_path(field: &str, raw: &str) -> assetline::Result<PathBuf> {
    let expanded = shellexpand::full(raw).map_err(|e| {
        assetline::Error::validation_invalid_argument(
            field,
            format!("Cannot expand '{}': {}", raw, e),
            None,
            None,
        )
    })?;
    Ok(Path::new(expanded.as_ref()).to_path_buf())
}

pub mod list;
pub mod plan;
pub mod run;
pub mod validate;

macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (assetline::Result<serde_json::Value>, i32) {
    crate::tty::status("assetline is working...");

    match command {
        crate::Commands::Run(args) => dispatch!(args, global, run),
        crate::Commands::Plan(args) => dispatch!(args, global, plan),
        crate::Commands::List(args) => dispatch!(args, global, list),
        crate::Commands::Validate(args) => dispatch!(args, global, validate),
    }
}
