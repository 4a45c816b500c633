use crate::delta;
use crate::signals::{keys, names, SignalBus, SignalContext};

use super::PluginContext;

/// Resolve the head of the tree a lifecycle signal refers to and re-emit it
/// as a `git.*` signal carrying `head`.
pub(super) fn register(bus: &mut SignalBus, ctx: &PluginContext) {
    let plugin = ctx.clone();
    bus.register(names::UPDATING, move |bus: &SignalBus, signal: &SignalContext| {
        let path = signal
            .get(keys::BUILD_PATH)
            .unwrap_or(plugin.env.layout.build_path.as_str());
        let head = delta::remote_head(plugin.exec.as_ref(), path)?;
        log_status!("git", "Release to {}", head);
        bus.emit(names::GIT_UPDATED, &signal.clone().with(keys::HEAD, head))?;
        Ok(())
    });

    let plugin = ctx.clone();
    bus.register(names::REVERTED, move |bus: &SignalBus, signal: &SignalContext| {
        let head = delta::remote_head(plugin.exec.as_ref(), &plugin.env.layout.current_path)?;
        log_status!("git", "Reverted to {}", head);
        bus.emit(names::GIT_REVERTED, &signal.clone().with(keys::HEAD, head))?;
        Ok(())
    });

    let plugin = ctx.clone();
    bus.register(names::HEAD_PUBLISHING, move |bus: &SignalBus, signal: &SignalContext| {
        let head = match signal.get(keys::HEAD) {
            Some(head) => head.to_string(),
            None => delta::remote_head(plugin.exec.as_ref(), &plugin.env.layout.current_path)?,
        };
        log_status!("git", "Get head: {}", head);
        bus.emit(names::GIT_HEAD_PUBLISHING, &signal.clone().with(keys::HEAD, head))?;
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::super::testing::{env, ScriptedExecutor};
    use super::*;
    use crate::error::ErrorCode;

    fn heads_seen(bus: &mut SignalBus, signal: &str) -> Rc<RefCell<Vec<String>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        bus.register(signal, move |_: &SignalBus, ctx: &SignalContext| {
            sink.borrow_mut()
                .push(ctx.get(keys::HEAD).unwrap_or_default().to_string());
            Ok(())
        });
        seen
    }

    #[test]
    fn updating_reports_staging_head() {
        let exec = ScriptedExecutor::default()
            .respond("cd '/srv/shop/releases/_build' && git rev-parse --short HEAD", "a1b2c3d\n");
        let exec = Rc::new(exec);
        let ctx = PluginContext::new(Rc::new(env(&["git"])), exec.clone());
        let mut bus = SignalBus::new();
        register(&mut bus, &ctx);
        let seen = heads_seen(&mut bus, names::GIT_UPDATED);

        bus.emit(names::UPDATING, &SignalContext::new()).unwrap();

        assert_eq!(*seen.borrow(), vec!["a1b2c3d"]);
    }

    #[test]
    fn reverted_reports_current_head() {
        let exec = ScriptedExecutor::default()
            .respond("cd '/srv/shop/current' && git rev-parse --short HEAD", "e4f5a6b");
        let ctx = PluginContext::new(Rc::new(env(&["git"])), Rc::new(exec));
        let mut bus = SignalBus::new();
        register(&mut bus, &ctx);
        let seen = heads_seen(&mut bus, names::GIT_REVERTED);

        bus.emit(names::REVERTED, &SignalContext::new()).unwrap();

        assert_eq!(*seen.borrow(), vec!["e4f5a6b"]);
    }

    #[test]
    fn head_publishing_reuses_known_head() {
        let exec = Rc::new(ScriptedExecutor::default());
        let ctx = PluginContext::new(Rc::new(env(&["git"])), exec.clone());
        let mut bus = SignalBus::new();
        register(&mut bus, &ctx);
        let seen = heads_seen(&mut bus, names::GIT_HEAD_PUBLISHING);

        let signal = SignalContext::new().with(keys::HEAD, "a1b2c3d");
        bus.emit(names::HEAD_PUBLISHING, &signal).unwrap();

        assert_eq!(*seen.borrow(), vec!["a1b2c3d"]);
        assert!(exec.commands().is_empty());
    }

    #[test]
    fn unreadable_head_fails_the_signal() {
        let exec = ScriptedExecutor::default()
            .fail_on("cd '/srv/shop/releases/_build' && git rev-parse --short HEAD");
        let ctx = PluginContext::new(Rc::new(env(&["git"])), Rc::new(exec));
        let mut bus = SignalBus::new();
        register(&mut bus, &ctx);

        let err = bus.emit(names::UPDATING, &SignalContext::new()).unwrap_err();
        assert_eq!(err.code, ErrorCode::SignalHandlerFailed);
    }
}
