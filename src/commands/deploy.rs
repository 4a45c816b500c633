use clap::Args;

use capstan::config::Overrides;
use capstan::lifecycle::{
    CleanupFailedReport, CleanupReport, ReleaseReport, ResetupReport, RestartReport,
    RollbackReport, SetupReport,
};

use super::{resolve_env, run_on_hosts, CmdResult, GlobalArgs, StageOutput};

#[derive(Args)]
pub struct SetupArgs {
    /// Branch to check out (default: from config)
    #[arg(long)]
    pub branch: Option<String>,
}

#[derive(Args)]
pub struct ReleaseArgs {
    /// Branch to deploy (default: from config)
    #[arg(long)]
    pub branch: Option<String>,

    /// Update with `git fetch && git reset --hard` instead of `git pull`
    #[arg(long)]
    pub use_reset: bool,

    /// Stop, reread, and update supervisor instead of a plain restart
    #[arg(long)]
    pub refresh: bool,

    /// Ask before refreshing supervisor (implies --refresh)
    #[arg(long)]
    pub wait_before_refreshing: bool,

    /// Slack channel to announce the release in
    #[arg(long)]
    pub slack_channel: Option<String>,
}

#[derive(Args)]
pub struct RestartArgs {
    /// Stop, reread, and update supervisor instead of a plain restart
    #[arg(long)]
    pub refresh: bool,

    /// Ask before refreshing supervisor (implies --refresh)
    #[arg(long)]
    pub wait_before_refreshing: bool,
}

fn flag(value: bool) -> Option<bool> {
    value.then_some(true)
}

fn refresh_overrides(refresh: bool, wait_before_refreshing: bool) -> Overrides {
    Overrides {
        refresh_supervisor: flag(refresh || wait_before_refreshing),
        wait_before_refreshing: flag(wait_before_refreshing),
        ..Overrides::default()
    }
}

pub fn run_setup(args: SetupArgs, global: &GlobalArgs) -> CmdResult<StageOutput<SetupReport>> {
    let overrides = Overrides {
        branch: args.branch,
        ..Overrides::default()
    };
    let env = resolve_env(global, overrides)?;
    run_on_hosts("setup", &env, false, |deployer| deployer.setup())
}

pub fn run_release(args: ReleaseArgs, global: &GlobalArgs) -> CmdResult<StageOutput<ReleaseReport>> {
    let overrides = Overrides {
        branch: args.branch,
        use_reset: flag(args.use_reset),
        slack_channel: args.slack_channel,
        ..refresh_overrides(args.refresh, args.wait_before_refreshing)
    };
    let env = resolve_env(global, overrides)?;
    run_on_hosts("release", &env, false, |deployer| deployer.release())
}

pub fn run_rollback(global: &GlobalArgs) -> CmdResult<StageOutput<RollbackReport>> {
    let env = resolve_env(global, Overrides::default())?;
    run_on_hosts("rollback", &env, false, |deployer| deployer.rollback())
}

pub fn run_cleanup(global: &GlobalArgs) -> CmdResult<StageOutput<CleanupReport>> {
    let env = resolve_env(global, Overrides::default())?;
    run_on_hosts("cleanup", &env, false, |deployer| deployer.cleanup())
}

pub fn run_cleanup_failed(global: &GlobalArgs) -> CmdResult<StageOutput<CleanupFailedReport>> {
    let env = resolve_env(global, Overrides::default())?;
    run_on_hosts("cleanup-failed", &env, false, |deployer| deployer.cleanup_failed())
}

pub fn run_resetup(global: &GlobalArgs) -> CmdResult<StageOutput<ResetupReport>> {
    let env = resolve_env(global, Overrides::default())?;
    run_on_hosts("resetup", &env, false, |deployer| deployer.resetup())
}

pub fn run_restart(args: RestartArgs, global: &GlobalArgs) -> CmdResult<StageOutput<RestartReport>> {
    let env = resolve_env(global, refresh_overrides(args.refresh, args.wait_before_refreshing))?;
    run_on_hosts("restart", &env, false, |deployer| deployer.restart())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_flags_do_not_override_config() {
        let overrides = refresh_overrides(false, false);
        assert_eq!(overrides.refresh_supervisor, None);
        assert_eq!(overrides.wait_before_refreshing, None);
    }

    #[test]
    fn waiting_implies_refresh() {
        let overrides = refresh_overrides(false, true);
        assert_eq!(overrides.refresh_supervisor, Some(true));
        assert_eq!(overrides.wait_before_refreshing, Some(true));
    }
}
