use clap::Args;
use serde::Serialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::rc::Rc;

use capstan::config::{self, DeployEnv, Host, Overrides};
use capstan::executor::{Executor, SshExecutor};
use capstan::lifecycle::Deployer;
use capstan::plugins::{self, PluginContext};
use capstan::signals::SignalBus;

use crate::tty::TerminalConfirmation;

pub type CmdResult<T> = capstan::Result<(T, i32)>;

#[derive(Args, Debug, Clone, Default)]
pub(crate) struct GlobalArgs {
    /// Path to the project config (default: ./capstan.yml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Stage to operate on (optional when the config defines a single stage)
    #[arg(long, short = 's', global = true)]
    pub stage: Option<String>,

    /// Role within the stage (default: the stage's first role)
    #[arg(long, short = 'r', global = true)]
    pub role: Option<String>,

    /// Echo remote command output
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

/// One host's result within a stage run.
#[derive(Debug, Serialize)]
pub struct HostResult<T: Serialize> {
    pub host: String,
    pub result: T,
}

#[derive(Debug, Serialize)]
pub struct StageOutput<T: Serialize> {
    pub command: String,
    pub target: String,
    pub role: String,
    pub hosts: Vec<HostResult<T>>,
}

/// Load the config and resolve it for the selected stage and role.
pub(crate) fn resolve_env(global: &GlobalArgs, mut overrides: Overrides) -> capstan::Result<DeployEnv> {
    let project = config::load(global.config.as_deref())?;

    let stage = match global.stage {
        Some(ref stage) => stage.clone(),
        None => {
            let names = project.stage_names();
            match names.as_slice() {
                [only] => only.clone(),
                _ => {
                    return Err(capstan::Error::validation_invalid_argument(
                        "stage",
                        "Missing --stage",
                        None,
                        Some(names),
                    ))
                }
            }
        }
    };

    if global.verbose {
        overrides.show_output = Some(true);
    }

    project.resolve(&stage, global.role.as_deref(), &overrides)
}

/// Build the deployer for one host: executor, plugins, and confirmation gate.
fn deployer_for(env: &DeployEnv, host: &Host) -> capstan::Result<Deployer> {
    let local_dir = shellexpand::tilde(&env.repo_path).to_string();
    let exec: Rc<dyn Executor> =
        Rc::new(SshExecutor::new(host, env.show_output)?.with_local_dir(local_dir));
    let env = Rc::new(env.clone());

    let mut bus = SignalBus::new();
    plugins::init(&mut bus, &PluginContext::new(env.clone(), exec.clone()));

    Ok(Deployer::new(env, exec, bus).with_confirmation(TerminalConfirmation))
}

/// Run `op` against each host of the stage in order. The first failure stops
/// the run; the error names the failing host and the hosts already done.
pub(crate) fn run_on_hosts<T, F>(
    command: &str,
    env: &DeployEnv,
    once: bool,
    op: F,
) -> CmdResult<StageOutput<T>>
where
    T: Serialize,
    F: Fn(&Deployer) -> capstan::Result<T>,
{
    let hosts = if once { &env.hosts[..1] } else { &env.hosts[..] };
    let mut results = Vec::new();

    for host in hosts {
        crate::tty::status(&format!("[{}] {}", command, host.host));
        let outcome = deployer_for(env, host).and_then(|deployer| op(&deployer));
        match outcome {
            Ok(result) => results.push(HostResult {
                host: host.host.clone(),
                result,
            }),
            Err(err) => {
                let completed: Vec<String> = results.iter().map(|r| r.host.clone()).collect();
                return Err(annotate_host_failure(err, &host.host, completed));
            }
        }
    }

    Ok((
        StageOutput {
            command: command.to_string(),
            target: env.target(),
            role: env.role.clone(),
            hosts: results,
        },
        0,
    ))
}

fn annotate_host_failure(mut err: capstan::Error, host: &str, completed: Vec<String>) -> capstan::Error {
    if err.details.is_null() {
        err.details = json!({});
    }
    if let Value::Object(ref mut map) = err.details {
        map.insert("failedHost".to_string(), json!(host));
        map.insert("completedHosts".to_string(), json!(completed));
    }
    if completed.is_empty() {
        err
    } else {
        let done = completed.join(", ");
        err.with_hint(format!("Already completed on: {}", done))
    }
}

pub mod delta;
pub mod deploy;
pub mod releases;

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (capstan::Result<serde_json::Value>, i32) {
    use crate::output::map_cmd_result_to_json as to_json;

    crate::tty::status("capstan is working...");

    match command {
        crate::Commands::Setup(args) => to_json(deploy::run_setup(args, global)),
        crate::Commands::Release(args) => to_json(deploy::run_release(args, global)),
        crate::Commands::Rollback => to_json(deploy::run_rollback(global)),
        crate::Commands::Cleanup => to_json(deploy::run_cleanup(global)),
        crate::Commands::CleanupFailed => to_json(deploy::run_cleanup_failed(global)),
        crate::Commands::Resetup => to_json(deploy::run_resetup(global)),
        crate::Commands::Restart(args) => to_json(deploy::run_restart(args, global)),
        crate::Commands::Delta(args) => to_json(delta::run_delta(args, global)),
        crate::Commands::Head => to_json(delta::run_head(global)),
        crate::Commands::Releases => to_json(releases::run(global)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_failure_lists_completed_hosts() {
        let err = capstan::Error::release_no_current("/srv/shop/releases");
        let err = annotate_host_failure(err, "web2", vec!["web1".to_string()]);

        assert_eq!(err.details["failedHost"], "web2");
        assert_eq!(err.details["completedHosts"][0], "web1");
        assert!(err.hints.iter().any(|h| h.message.contains("web1")));
    }

    #[test]
    fn resolve_env_picks_the_only_stage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capstan.yml");
        std::fs::write(
            &path,
            "app_name: shop\npath: /srv/shop\nstages:\n  production:\n    hosts:\n      - host: web1\n",
        )
        .unwrap();
        let global = GlobalArgs {
            config: Some(path),
            verbose: true,
            ..GlobalArgs::default()
        };

        let env = resolve_env(&global, Overrides::default()).unwrap();

        assert_eq!(env.stage, "production");
        assert!(env.show_output);
    }
}
