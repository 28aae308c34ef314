use assetline::pipeline::TaskListing;
use clap::Args;

use super::{CmdResult, GlobalArgs};

#[derive(Args)]
pub struct ListArgs {}

pub fn run(_args: ListArgs, global: &GlobalArgs) -> CmdResult<TaskListing> {
    let pipeline = global.open()?;
    Ok((pipeline.list(), 0))
}
