use std::rc::Rc;

use crate::config::DeployEnv;
use crate::notify::{self, Notifier, Payload, Phase};
use crate::signals::{keys, names, SignalBus, SignalContext};

use super::PluginContext;

pub(super) fn register(bus: &mut SignalBus, ctx: &PluginContext, notifier: Rc<dyn Notifier>) {
    let env = ctx.env.clone();
    let sink = notifier.clone();
    bus.register(names::DELTA_PUBLISHING, move |_: &SignalBus, signal: &SignalContext| {
        if !signal.flag(keys::HAS_DELTA) {
            log_status!("slack", "No delta to announce");
            return Ok(());
        }
        send(sink.as_ref(), &env, delta_payload(&env, signal, Phase::Pending))
    });

    let env = ctx.env.clone();
    let sink = notifier.clone();
    bus.register(names::PUBLISHED, move |_: &SignalBus, signal: &SignalContext| {
        send(sink.as_ref(), &env, delta_payload(&env, signal, Phase::Published))
    });

    let env = ctx.env.clone();
    let sink = notifier.clone();
    bus.register(names::GIT_REVERTED, move |_: &SignalBus, signal: &SignalContext| {
        let head = signal.get(keys::HEAD).unwrap_or_default();
        let payload = notify::reverted_payload(&env.target(), head, &env.slack_icon_emoji);
        send(sink.as_ref(), &env, payload)
    });

    let env = ctx.env.clone();
    let sink = notifier;
    bus.register(names::GIT_HEAD_PUBLISHING, move |_: &SignalBus, signal: &SignalContext| {
        let head = signal.get(keys::HEAD).unwrap_or_default();
        let payload = notify::head_payload(&env.target(), head, &env.slack_icon_emoji);
        send(sink.as_ref(), &env, payload)
    });
}

fn delta_payload(env: &DeployEnv, signal: &SignalContext, phase: Phase) -> Payload {
    notify::delta_payload(
        signal.get(keys::DELTA_LOG).unwrap_or_default(),
        signal.get(keys::DELTA_RICH),
        &env.target(),
        phase,
        &env.slack_icon_emoji,
    )
}

fn send(notifier: &dyn Notifier, env: &DeployEnv, payload: Payload) -> crate::error::Result<()> {
    let payload = payload.with_channel(env.slack_channel.as_deref());
    let channel = env.slack_channel.as_deref().unwrap_or("webhook default channel");
    log_status!("slack", "Posting to {}", channel);
    notifier.send(&payload)
}
