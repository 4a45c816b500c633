use serde::Serialize;

use crate::error::{Error, Result};

/// Phases of a release. Each is entered at most once, in this order;
/// `AwaitingConfirmation` only when a refresh waits for the operator, and
/// `Failed` only from the phases that touch the staging area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Started,
    DeltaComputed,
    ReleaseSetResolved,
    BuildCopied,
    RepoUpdated,
    RepoSetupHookRun,
    Symlinked,
    AwaitingConfirmation,
    Restarted,
    CleanedUp,
    Done,
    Failed,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Started => "started",
            Phase::DeltaComputed => "delta_computed",
            Phase::ReleaseSetResolved => "release_set_resolved",
            Phase::BuildCopied => "build_copied",
            Phase::RepoUpdated => "repo_updated",
            Phase::RepoSetupHookRun => "repo_setup_hook_run",
            Phase::Symlinked => "symlinked",
            Phase::AwaitingConfirmation => "awaiting_confirmation",
            Phase::Restarted => "restarted",
            Phase::CleanedUp => "cleaned_up",
            Phase::Done => "done",
            Phase::Failed => "failed",
        }
    }

    fn can_follow(previous: Option<Phase>, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (previous, next),
            (None, Started)
                | (Some(Started), DeltaComputed)
                | (Some(DeltaComputed), ReleaseSetResolved)
                | (Some(ReleaseSetResolved), BuildCopied)
                | (Some(BuildCopied), RepoUpdated)
                | (Some(RepoUpdated), RepoSetupHookRun)
                | (Some(RepoSetupHookRun), Symlinked)
                | (Some(Symlinked), AwaitingConfirmation)
                | (Some(Symlinked), Restarted)
                | (Some(AwaitingConfirmation), Restarted)
                | (Some(Restarted), CleanedUp)
                | (Some(CleanedUp), Done)
                | (Some(ReleaseSetResolved), Failed)
                | (Some(BuildCopied), Failed)
                | (Some(RepoUpdated), Failed)
        )
    }
}

/// Records the phases a release went through and rejects out-of-order moves.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    trace: Vec<Phase>,
}

impl PhaseTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Phase> {
        self.trace.last().copied()
    }

    pub fn advance(&mut self, next: Phase) -> Result<()> {
        let current = self.current();
        if !Phase::can_follow(current, next) {
            return Err(Error::internal_unexpected(format!(
                "Illegal release phase transition: {} -> {}",
                current.map_or("(none)", |p| p.as_str()),
                next.as_str()
            )));
        }
        log_status!("phase", "{}", next.as_str());
        self.trace.push(next);
        Ok(())
    }

    pub fn into_trace(self) -> Vec<Phase> {
        self.trace
    }
}
