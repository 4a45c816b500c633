use capstan::config::Overrides;
use capstan::releases::ReleaseSummary;

use super::{resolve_env, run_on_hosts, CmdResult, GlobalArgs, StageOutput};

/// Release set of every host: all releases, current, previous, and dirty ones.
pub fn run(global: &GlobalArgs) -> CmdResult<StageOutput<ReleaseSummary>> {
    let env = resolve_env(global, Overrides::default())?;
    run_on_hosts("releases", &env, false, |deployer| deployer.releases())
}
