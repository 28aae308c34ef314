use assetline::executor::ExecutionResult;
use clap::Args;

use super::{CmdResult, GlobalArgs};
use crate::output::exit_code_for_error;

#[derive(Args)]
pub struct RunArgs {
    /// Task to run: an alias, a group, or a `group:target` key
    pub task: String,

    /// Render every step and report what would run without invoking tools
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(args: RunArgs, global: &GlobalArgs) -> CmdResult<ExecutionResult> {
    let pipeline = global.open()?;
    let result = pipeline.run(&args.task, args.dry_run)?;

    let exit_code = match &result.error {
        None => 0,
        Some(error) => {
            if let Some(failed) = &result.failed_step {
                assetline::log_status!(
                    "run",
                    "Failed at step {} ({}): {}",
                    failed.index,
                    failed.key,
                    error.message
                );
            }
            exit_code_for_error(error.error_code)
        }
    };

    Ok((result, exit_code))
}
