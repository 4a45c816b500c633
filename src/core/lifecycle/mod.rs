//! Release lifecycle.
//!
//! A [`Deployer`] drives one deploy root on one host: it sequences the
//! phases of an operation, mutates the release directories through the
//! [`Executor`], and emits signals for plugins at each step. The release set
//! is recomputed from disk by every operation.

mod operations;
mod phase;
mod release;

pub use operations::{
    CleanupFailedReport, CleanupReport, DeltaReport, HeadReport, ResetupReport, RestartReport,
    RollbackReport, SetupReport,
};
pub use phase::{Phase, PhaseTracker};
pub use release::ReleaseReport;

use std::rc::Rc;

use crate::config::DeployEnv;
use crate::delta::Delta;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::releases::{Clock, SystemClock};
use crate::signals::{keys, names, SignalBus, SignalContext};

/// Gate for the pause before a supervisor refresh.
pub trait Confirmation {
    /// Block until the operator answers. `Ok(false)` aborts the operation.
    fn confirm(&self, prompt: &str) -> Result<bool>;
}

/// Declines every confirmation. Used when nobody can answer.
pub struct NoOperator;

impl Confirmation for NoOperator {
    fn confirm(&self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

pub const REFRESH_PROMPT: &str = "Program stopped. Refresh supervisor now?";

pub struct Deployer {
    env: Rc<DeployEnv>,
    exec: Rc<dyn Executor>,
    bus: SignalBus,
    clock: Box<dyn Clock>,
    confirmation: Box<dyn Confirmation>,
}

impl Deployer {
    /// Deployer with the system clock that declines every confirmation.
    pub fn new(env: Rc<DeployEnv>, exec: Rc<dyn Executor>, bus: SignalBus) -> Self {
        Self {
            env,
            exec,
            bus,
            clock: Box::new(SystemClock),
            confirmation: Box::new(NoOperator),
        }
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_confirmation(mut self, confirmation: impl Confirmation + 'static) -> Self {
        self.confirmation = Box::new(confirmation);
        self
    }

    pub fn env(&self) -> &DeployEnv {
        &self.env
    }

    fn exec(&self) -> &dyn Executor {
        self.exec.as_ref()
    }

    fn emit(&self, signal: &str, context: &SignalContext) -> Result<()> {
        self.bus.emit(signal, context)?;
        Ok(())
    }

    /// Context every signal of this deployer starts from.
    fn base_context(&self) -> SignalContext {
        SignalContext::new()
            .with(keys::TARGET, self.env.target())
            .with(keys::BRANCH, self.env.branch.clone())
            .with_flag(keys::USE_RESET, self.env.use_reset)
    }

    fn delta_context(&self, context: SignalContext, delta: &Delta) -> SignalContext {
        let context = context
            .with(keys::DELTA_LOG, delta.render_plain())
            .with_flag(keys::HAS_DELTA, !delta.is_empty());
        match self.env.git_web.as_deref() {
            Some(git_web) => context.with(keys::DELTA_RICH, delta.render_rich(Some(git_web))),
            None => context,
        }
    }

    /// Emit `deploy.restarting`. In refresh mode the program is only stopped
    /// there; `deploy.refreshing` follows, after the operator confirms when
    /// `wait_before_refreshing` is set.
    fn restart_service(&self, first_setup: bool, phases: Option<&mut PhaseTracker>) -> Result<bool> {
        let refresh = self.env.refresh_supervisor && !first_setup;
        let context = self
            .base_context()
            .with_flag(keys::REFRESH, refresh)
            .with_flag(keys::FIRST_SETUP, first_setup);

        log_status!("restart", "Launching");
        self.emit(names::RESTARTING, &context)?;
        if !refresh {
            return Ok(false);
        }

        if self.env.wait_before_refreshing {
            if let Some(phases) = phases {
                phases.advance(Phase::AwaitingConfirmation)?;
            }
            if !self.confirmation.confirm(REFRESH_PROMPT)? {
                return Err(Error::deploy_aborted(
                    Phase::AwaitingConfirmation.as_str(),
                    "operator declined the supervisor refresh",
                )
                .with_hint("The program is stopped. Run `capstan restart` to bring it back"));
            }
        }

        self.emit(names::REFRESHING, &context)?;
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::NaiveDateTime;

    use crate::releases::Clock;

    /// Clock frozen at a given `YYMMDD-HHMMSS` instant.
    pub struct FixedClock(pub NaiveDateTime);

    impl FixedClock {
        pub fn at(id: &str) -> Self {
            Self(
                NaiveDateTime::parse_from_str(id, crate::releases::RELEASE_ID_FORMAT)
                    .expect("valid release id"),
            )
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }
}
