use clap::Args;

use capstan::config::Overrides;
use capstan::lifecycle::{DeltaReport, HeadReport};

use super::{resolve_env, run_on_hosts, CmdResult, GlobalArgs, StageOutput};

#[derive(Args)]
pub struct DeltaArgs {
    /// Slack channel to announce the pending delta in
    #[arg(long)]
    pub slack_channel: Option<String>,

    /// Branch to compare against (default: from config)
    #[arg(long)]
    pub branch: Option<String>,
}

/// Pending merge commits, read from the first host of the stage.
pub fn run_delta(args: DeltaArgs, global: &GlobalArgs) -> CmdResult<StageOutput<DeltaReport>> {
    let overrides = Overrides {
        branch: args.branch,
        slack_channel: args.slack_channel,
        ..Overrides::default()
    };
    let env = resolve_env(global, overrides)?;
    run_on_hosts("delta", &env, true, |deployer| deployer.delta())
}

pub fn run_head(global: &GlobalArgs) -> CmdResult<StageOutput<HeadReport>> {
    let env = resolve_env(global, Overrides::default())?;
    run_on_hosts("head", &env, true, |deployer| deployer.head())
}
