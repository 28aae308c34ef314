use assetline::pipeline::Plan;
use clap::Args;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct PlanArgs {
    /// Task whose step sequence should be shown
    pub task: String,
}

pub fn run(args: PlanArgs, global: &GlobalArgs) -> CmdResult<Plan> {
    let pipeline = global.open()?;
    Ok((pipeline.plan(&args.task)?, 0))
}
