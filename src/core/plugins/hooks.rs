//! Operator-defined shell commands attached to signals (`hooks:` in the config).

use crate::signals::{keys, SignalBus, SignalContext};
use crate::utils::shell;

use super::PluginContext;

pub(super) fn register(bus: &mut SignalBus, ctx: &PluginContext) {
    for (signal_name, commands) in &ctx.env.hooks {
        let plugin = ctx.clone();
        let commands = commands.clone();
        let label = signal_name.clone();
        bus.register(signal_name, move |_: &SignalBus, signal: &SignalContext| {
            let dir = signal
                .get(keys::BUILD_PATH)
                .unwrap_or(plugin.env.layout.current_path.as_str());
            for command in &commands {
                log_status!("hook", "{}: {}", label, command);
                plugin
                    .exec
                    .run(&format!("cd {} && {}", shell::quote_path(dir), command))?;
            }
            Ok(())
        });
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::super::testing::{env, ScriptedExecutor};
    use super::*;
    use crate::error::ErrorCode;
    use crate::signals::names;

    #[test]
    fn hook_runs_in_build_path_when_given() {
        let exec = Rc::new(ScriptedExecutor::default());
        let ctx = PluginContext::new(Rc::new(env(&[])), exec.clone());
        let mut bus = SignalBus::new();
        register(&mut bus, &ctx);

        let signal = SignalContext::new().with(keys::BUILD_PATH, "/srv/shop/releases/_build");
        bus.emit(names::UPDATING, &signal).unwrap();

        assert_eq!(
            exec.commands(),
            vec!["cd '/srv/shop/releases/_build' && make deps"]
        );
    }

    #[test]
    fn failing_hook_fails_the_signal() {
        let exec = ScriptedExecutor::default().fail_on("cd '/srv/shop/current' && make deps");
        let ctx = PluginContext::new(Rc::new(env(&[])), Rc::new(exec));
        let mut bus = SignalBus::new();
        register(&mut bus, &ctx);

        let err = bus.emit(names::UPDATING, &SignalContext::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::SignalHandlerFailed);
        assert_eq!(err.details["signal"], "deploy.updating");
    }
}
