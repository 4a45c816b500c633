//! Process restarts through supervisord.
//!
//! Plain restart: `supervisorctl restart <program>`. Refresh mode splits the
//! restart in two: `deploy.restarting` stops the program, and after the
//! lifecycle's optional confirmation `deploy.refreshing` rereads the program
//! config, applies it with `update`, and starts the program when `update` had
//! nothing to apply. Every path ends with a status check.

use crate::config::DeployEnv;
use crate::error::Result;
use crate::executor::Executor;
use crate::signals::{keys, names, SignalBus, SignalContext};
use crate::utils::shell;

use super::PluginContext;

pub const SUPERVISOR_CONF_DIR: &str = "/etc/supervisor/conf.d";

pub(super) fn register(bus: &mut SignalBus, ctx: &PluginContext) {
    let plugin = ctx.clone();
    bus.register(names::STARTED, move |_: &SignalBus, _: &SignalContext| {
        link_config(plugin.exec.as_ref(), &plugin.env)
    });

    let plugin = ctx.clone();
    bus.register(names::RESTARTING, move |_: &SignalBus, signal: &SignalContext| {
        restart(plugin.exec.as_ref(), &plugin.env, signal)
    });

    let plugin = ctx.clone();
    bus.register(names::REFRESHING, move |_: &SignalBus, _: &SignalContext| {
        refresh(plugin.exec.as_ref(), &plugin.env)
    });
}

fn link_config(exec: &dyn Executor, env: &DeployEnv) -> Result<()> {
    let link = format!("{}/{}.conf", SUPERVISOR_CONF_DIR, env.project_name);
    log_status!("supervisor", "Linking {} to {}", env.supervisor_conf, link);
    exec.run(&format!(
        "ln -nfs {} {}",
        shell::quote_path(&env.supervisor_conf),
        shell::quote_path(&link)
    ))?;
    exec.run("supervisorctl reread")?;
    Ok(())
}

fn restart(exec: &dyn Executor, env: &DeployEnv, signal: &SignalContext) -> Result<()> {
    let program = shell::quote_arg(&env.supervisor_program);

    if signal.flag(keys::FIRST_SETUP) {
        log_status!("supervisor", "Loading {} for the first time", env.supervisor_program);
        exec.run("supervisorctl update")?;
        return status(exec, env);
    }

    if signal.flag(keys::REFRESH) {
        log_status!("supervisor", "Stopping {} before refresh", env.supervisor_program);
        exec.run(&format!("supervisorctl stop {}", program))?;
        return Ok(());
    }

    log_status!("supervisor", "Restarting {}", env.supervisor_program);
    exec.run(&format!("supervisorctl restart {}", program))?;
    status(exec, env)
}

fn refresh(exec: &dyn Executor, env: &DeployEnv) -> Result<()> {
    log_status!("supervisor", "Refreshing {}", env.supervisor_program);
    exec.run("supervisorctl reread")?;

    // `update` prints nothing when the program config is unchanged, and then
    // does not start the stopped program either.
    if exec.run("supervisorctl update")?.is_empty() {
        exec.run(&format!(
            "supervisorctl start {}",
            shell::quote_arg(&env.supervisor_program)
        ))?;
    }

    status(exec, env)
}

// supervisorctl cannot filter status by group, so grep by project name.
fn status(exec: &dyn Executor, env: &DeployEnv) -> Result<()> {
    exec.run(&format!(
        "supervisorctl status | grep {}",
        shell::quote_arg(&env.project_name)
    ))?;
    Ok(())
}
