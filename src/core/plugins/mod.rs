//! Built-in plugins.
//!
//! A plugin is a set of handlers registered on the [`SignalBus`] at startup.
//! The lifecycle never calls a plugin directly; it only emits signals.
//! Plugins register in the order listed under `plugins:` in the config, then
//! the configured command hooks, so platform behavior runs before user
//! customization on the same signal.

mod git;
mod hooks;
mod slack;
mod supervisor;

use std::rc::Rc;

use crate::config::{DeployEnv, Plugin};
use crate::executor::Executor;
use crate::notify::{Notifier, WebhookNotifier};
use crate::signals::SignalBus;

pub use supervisor::SUPERVISOR_CONF_DIR;

/// Handles every plugin handler closes over.
#[derive(Clone)]
pub struct PluginContext {
    pub env: Rc<DeployEnv>,
    pub exec: Rc<dyn Executor>,
}

impl PluginContext {
    pub fn new(env: Rc<DeployEnv>, exec: Rc<dyn Executor>) -> Self {
        Self { env, exec }
    }
}

/// Register the enabled plugins. Slack posts to the configured webhook.
/// Returns the names of the plugins that were registered.
pub fn init(bus: &mut SignalBus, ctx: &PluginContext) -> Vec<String> {
    let notifier = ctx
        .env
        .slack_webhook
        .as_deref()
        .map(|webhook| Rc::new(WebhookNotifier::new(webhook)) as Rc<dyn Notifier>);
    init_with_notifier(bus, ctx, notifier)
}

/// Like [`init`], with an explicit notifier for the slack plugin.
pub fn init_with_notifier(
    bus: &mut SignalBus,
    ctx: &PluginContext,
    notifier: Option<Rc<dyn Notifier>>,
) -> Vec<String> {
    let mut registered = Vec::new();

    for plugin in &ctx.env.plugins {
        match plugin {
            Plugin::Git => git::register(bus, ctx),
            Plugin::Supervisor => supervisor::register(bus, ctx),
            Plugin::Slack => match notifier {
                Some(ref notifier) => slack::register(bus, ctx, notifier.clone()),
                None => {
                    log_status!("plugins", "slack is enabled but no webhook is configured; skipping");
                    continue;
                }
            },
        }
        registered.push(plugin.as_str().to_string());
    }

    if !ctx.env.hooks.is_empty() {
        hooks::register(bus, ctx);
        registered.push("hooks".to_string());
    }

    registered
}


#[cfg(test)]
mod tests {
    use super::testing::{env, RecordingNotifier, ScriptedExecutor};
    use super::*;
    use crate::signals::names;

    #[test]
    fn registers_enabled_plugins_in_order() {
        let mut bus = SignalBus::new();
        let ctx = PluginContext::new(
            Rc::new(env(&["supervisor", "git", "slack"])),
            Rc::new(ScriptedExecutor::default()),
        );
        let notifier: Rc<dyn Notifier> = Rc::new(RecordingNotifier::default());

        let registered = init_with_notifier(&mut bus, &ctx, Some(notifier));

        assert_eq!(registered, vec!["supervisor", "git", "slack", "hooks"]);
        // git handler then the configured hook
        assert_eq!(bus.handler_count(names::UPDATING), 2);
        assert_eq!(bus.handler_count(names::RESTARTING), 1);
    }

    #[test]
    fn slack_without_notifier_is_skipped() {
        let mut bus = SignalBus::new();
        let ctx = PluginContext::new(
            Rc::new(env(&["slack"])),
            Rc::new(ScriptedExecutor::default()),
        );

        let registered = init_with_notifier(&mut bus, &ctx, None);

        assert_eq!(registered, vec!["hooks"]);
        assert_eq!(bus.handler_count(names::PUBLISHED), 0);
    }
}
