use assetline::pipeline::ValidationReport;
use clap::Args;

use super::{CmdResult, GlobalArgs};
use crate::output::exit_code_for_error;

#[derive(Args)]
pub struct ValidateArgs {}

/// Resolve and preflight every alias. The exit code follows the first problem found.
pub fn run(_args: ValidateArgs, global: &GlobalArgs) -> CmdResult<ValidationReport> {
    let pipeline = global.open()?;
    let report = pipeline.validate();
    let exit_code = report
        .first_error
        .as_ref()
        .map(|e| exit_code_for_error(e.code))
        .unwrap_or(0);
    Ok((report, exit_code))
}
