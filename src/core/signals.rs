//! Named signal bus that lets plugins observe and extend lifecycle phases.
//!
//! Handlers are registered once at startup and dispatched synchronously in
//! registration order. The first failing handler stops the emission; its
//! error propagates to the phase that emitted the signal, so a plugin can
//! block a deployment it considers unsafe.
//!
//! Signal naming convention: `deploy.<phase>` for lifecycle signals,
//! `<plugin>.<event>` for signals plugins emit for each other.

use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, ErrorCode, Result};

/// A signal handler. Receives the bus (to emit follow-up signals) and the
/// emission context.
pub type Handler = Box<dyn Fn(&SignalBus, &SignalContext) -> Result<()>>;

/// Named values passed to every handler of one emission.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalContext {
    values: BTreeMap<String, String>,
}

impl SignalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn with_flag(self, key: &str, value: bool) -> Self {
        self.with(key, if value { "true" } else { "false" })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn flag(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true"))
    }
}

/// Result of one emission.
#[derive(Debug, Clone, Serialize)]
pub struct EmitResult {
    pub signal: String,
    pub handlers_run: usize,
}

#[derive(Default)]
pub struct SignalBus {
    handlers: HashMap<String, Vec<Handler>>,
    emitting: RefCell<Vec<String>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `signal`. The same handler may be registered
    /// twice and then runs twice.
    pub fn register<F>(&mut self, signal: &str, handler: F)
    where
        F: Fn(&SignalBus, &SignalContext) -> Result<()> + 'static,
    {
        self.handlers
            .entry(signal.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    pub fn handler_count(&self, signal: &str) -> usize {
        self.handlers.get(signal).map_or(0, Vec::len)
    }

    /// Invoke every handler for `signal` in registration order.
    ///
    /// Emitting a signal nobody listens to is a no-op. A signal cannot be
    /// re-emitted from one of its own handlers.
    pub fn emit(&self, signal: &str, context: &SignalContext) -> Result<EmitResult> {
        let Some(handlers) = self.handlers.get(signal) else {
            return Ok(EmitResult {
                signal: signal.to_string(),
                handlers_run: 0,
            });
        };

        if self.emitting.borrow().iter().any(|s| s == signal) {
            return Err(Error::signal_reentrant(signal));
        }

        self.emitting.borrow_mut().push(signal.to_string());
        let outcome = self.dispatch(signal, handlers, context);
        self.emitting.borrow_mut().retain(|s| s != signal);

        outcome
    }

    fn dispatch(
        &self,
        signal: &str,
        handlers: &[Handler],
        context: &SignalContext,
    ) -> Result<EmitResult> {
        for (index, handler) in handlers.iter().enumerate() {
            if let Err(err) = handler(self, context) {
                log_status!("signal", "{} handler #{} failed: {}", signal, index, err);
                return Err(wrap_failure(signal, index, err));
            }
        }

        Ok(EmitResult {
            signal: signal.to_string(),
            handlers_run: handlers.len(),
        })
    }
}

// Reentrancy errors are reported as-is so the offending signal stays visible.
fn wrap_failure(signal: &str, index: usize, err: Error) -> Error {
    if err.code == ErrorCode::SignalReentrant {
        return err;
    }
    Error::signal_handler_failed(signal, index, err)
}

/// Signal names.
pub mod names {
    /// Release is about to build; delta already computed.
    pub const STARTED: &str = "deploy.started";
    /// First-time provisioning of the build area.
    pub const SETUP: &str = "deploy.setup";
    /// Staging area updated to the target branch; run environment setup.
    pub const UPDATING: &str = "deploy.updating";
    /// Current pointer swapped; restart (or, in refresh mode, stop) the service.
    pub const RESTARTING: &str = "deploy.restarting";
    /// Refresh-mode continuation of a restart, after the optional confirmation.
    pub const REFRESHING: &str = "deploy.refreshing";
    /// Release finished; carries the rendered delta.
    pub const PUBLISHED: &str = "deploy.published";
    /// Rollback finished.
    pub const REVERTED: &str = "deploy.reverted";
    /// Pending delta is ready to announce.
    pub const DELTA_PUBLISHING: &str = "deploy.delta.publishing";
    /// Deployed head is ready to announce.
    pub const HEAD_PUBLISHING: &str = "deploy.head.publishing";

    pub const GIT_UPDATED: &str = "git.updated";
    pub const GIT_REVERTED: &str = "git.reverted";
    pub const GIT_HEAD_PUBLISHING: &str = "git.head.publishing";

    pub const ALL: [&str; 12] = [
        STARTED,
        SETUP,
        UPDATING,
        RESTARTING,
        REFRESHING,
        PUBLISHED,
        REVERTED,
        DELTA_PUBLISHING,
        HEAD_PUBLISHING,
        GIT_UPDATED,
        GIT_REVERTED,
        GIT_HEAD_PUBLISHING,
    ];
}

/// Context keys.
pub mod keys {
    pub const BRANCH: &str = "branch";
    pub const DELTA_LOG: &str = "delta_log";
    pub const DELTA_RICH: &str = "delta_rich";
    /// Set when the delta has at least one merge commit.
    pub const HAS_DELTA: &str = "has_delta";
    pub const HEAD: &str = "head";
    pub const USE_RESET: &str = "use_reset";
    pub const NEW_RELEASE: &str = "new_release";
    pub const BUILD_PATH: &str = "build_path";
    pub const REFRESH: &str = "refresh";
    pub const FIRST_SETUP: &str = "first_setup";
    pub const ROLLBACK_FROM: &str = "rollback_from";
    pub const ROLLBACK_TO: &str = "rollback_to";
    pub const TARGET: &str = "target";
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<String>>>, impl Fn(&str) -> Handler) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let make = {
            let calls = calls.clone();
            move |label: &str| -> Handler {
                let calls = calls.clone();
                let label = label.to_string();
                Box::new(move |_: &SignalBus, _: &SignalContext| {
                    calls.borrow_mut().push(label.clone());
                    Ok(())
                })
            }
        };
        (calls, make)
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let (calls, make) = recorder();
        let mut bus = SignalBus::new();
        bus.register(names::PUBLISHED, make("first"));
        bus.register(names::PUBLISHED, make("second"));

        let result = bus.emit(names::PUBLISHED, &SignalContext::new()).unwrap();

        assert_eq!(result.handlers_run, 2);
        assert_eq!(*calls.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn first_failure_stops_emission() {
        let (calls, make) = recorder();
        let mut bus = SignalBus::new();
        bus.register(names::PUBLISHED, |_: &SignalBus, _: &SignalContext| {
            Err(Error::internal_unexpected("unsafe to deploy"))
        });
        bus.register(names::PUBLISHED, make("second"));

        let err = bus
            .emit(names::PUBLISHED, &SignalContext::new())
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::SignalHandlerFailed);
        assert_eq!(err.details["handler"], 0);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn duplicate_registration_runs_twice() {
        let (calls, make) = recorder();
        let mut bus = SignalBus::new();
        bus.register(names::STARTED, make("dup"));
        bus.register(names::STARTED, make("dup"));

        bus.emit(names::STARTED, &SignalContext::new()).unwrap();
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn unknown_signal_is_a_no_op() {
        let bus = SignalBus::new();
        let result = bus.emit("deploy.nothing", &SignalContext::new()).unwrap();
        assert_eq!(result.handlers_run, 0);
    }

    #[test]
    fn handlers_see_context_values() {
        let seen = Rc::new(RefCell::new(None));
        let mut bus = SignalBus::new();
        let sink = seen.clone();
        bus.register(names::UPDATING, move |_: &SignalBus, ctx: &SignalContext| {
            let branch = ctx.get(keys::BRANCH).map(String::from);
            *sink.borrow_mut() = Some((branch, ctx.flag(keys::USE_RESET)));
            Ok(())
        });

        let ctx = SignalContext::new()
            .with(keys::BRANCH, "master")
            .with_flag(keys::USE_RESET, true);
        bus.emit(names::UPDATING, &ctx).unwrap();

        assert_eq!(*seen.borrow(), Some((Some("master".to_string()), true)));
    }

    #[test]
    fn handlers_can_emit_other_signals() {
        let (calls, make) = recorder();
        let mut bus = SignalBus::new();
        bus.register(names::REVERTED, |bus: &SignalBus, ctx: &SignalContext| {
            bus.emit(names::GIT_REVERTED, ctx).map(|_| ())
        });
        bus.register(names::GIT_REVERTED, make("git.reverted"));

        bus.emit(names::REVERTED, &SignalContext::new()).unwrap();
        assert_eq!(*calls.borrow(), vec!["git.reverted"]);
    }

    #[test]
    fn reemitting_same_signal_is_rejected() {
        let mut bus = SignalBus::new();
        bus.register(names::RESTARTING, |bus: &SignalBus, ctx: &SignalContext| {
            bus.emit(names::RESTARTING, ctx).map(|_| ())
        });

        let err = bus
            .emit(names::RESTARTING, &SignalContext::new())
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SignalReentrant);

        // The guard is released after a failed emission.
        assert!(bus.emitting.borrow().is_empty());
    }
}
