use serde::Serialize;

use crate::delta::{self, Delta};
use crate::error::{Error, Result};
use crate::releases::{self, ReleaseId, ReleaseSet};
use crate::signals::{keys, names, SignalContext};
use crate::utils::shell;

use super::{Deployer, Phase, PhaseTracker};

#[derive(Debug, Serialize)]
pub struct ReleaseReport {
    pub new_release: ReleaseId,
    pub previous_release: ReleaseId,
    pub branch: String,
    pub delta: Delta,
    pub refreshed: bool,
    pub removed: Vec<ReleaseId>,
    pub phases: Vec<Phase>,
}

impl Deployer {
    /// Build a new release from the current one, point `current` at it,
    /// restart, and enforce retention.
    ///
    /// Until the symlink swap nothing outside the staging area changes; a
    /// failure while building removes the staging area and leaves the
    /// previous release current.
    pub fn release(&self) -> Result<ReleaseReport> {
        let env = self.env.clone();
        let layout = &env.layout;
        let mut phases = PhaseTracker::new();
        phases.advance(Phase::Started)?;

        log_status!("release", "Deploying new release on {} branch", env.branch);
        let delta = delta::extract(self.exec(), &layout.current_path, &env.upstream, &env.branch)?;
        phases.advance(Phase::DeltaComputed)?;

        let set = releases::compute_release_set(self.exec(), layout)?;
        let new_release = releases::mint_release_id(self.clock.as_ref());
        if set.contains(&new_release) {
            return Err(Error::release_id_collision(&layout.releases_path, new_release.as_str()));
        }
        phases.advance(Phase::ReleaseSetResolved)?;

        let context = self
            .delta_context(self.base_context(), &delta)
            .with(keys::NEW_RELEASE, new_release.as_str());
        self.emit(names::STARTED, &context)?;

        if let Err(err) = self.build(&set, &context, &mut phases) {
            log_status!("release", "New release failed to build: {}", err);
            phases.advance(Phase::Failed)?;
            self.cleanup_staging();
            return Err(err);
        }

        log_status!("release", "Symlinking to current");
        self.exec().run(&format!(
            "mv {} {}",
            shell::quote_path(&layout.build_path),
            shell::quote_path(&layout.release_path(&new_release))
        ))?;
        releases::swap_current(self.exec(), layout, &new_release)?;
        phases.advance(Phase::Symlinked)?;

        let refreshed = self.restart_service(false, Some(&mut phases))?;
        phases.advance(Phase::Restarted)?;
        log_status!("release", "Done. Deployed {} on {}", new_release, env.branch);

        log_status!("release", "Cleaning up old release(s)");
        let after = releases::compute_release_set(self.exec(), layout)?;
        let removed = releases::enforce_retention(self.exec(), layout, &after, env.keep_releases)?;
        phases.advance(Phase::CleanedUp)?;

        log_status!("release", "Release log:\n{}", delta.render_plain());
        self.emit(names::PUBLISHED, &context)?;
        phases.advance(Phase::Done)?;

        Ok(ReleaseReport {
            new_release,
            previous_release: set.current,
            branch: env.branch.clone(),
            delta,
            refreshed,
            removed,
            phases: phases.into_trace(),
        })
    }

    /// Copy, update, and set up the staging area.
    fn build(&self, set: &ReleaseSet, context: &SignalContext, phases: &mut PhaseTracker) -> Result<()> {
        let layout = &self.env.layout;
        let build = shell::quote_path(&layout.build_path);

        log_status!("release", "Creating the build path");
        self.exec().run(&format!(
            "rm -rf {} && cp -rp {} {}",
            build,
            shell::quote_path(&layout.release_path(&set.current)),
            build
        ))?;
        phases.advance(Phase::BuildCopied)?;

        log_status!("release", "Checking out latest code");
        let branch = shell::quote_arg(&self.env.branch);
        let update = if self.env.use_reset {
            format!("git fetch -q && git reset --hard origin/{}", branch)
        } else {
            format!("git pull -q && git checkout {}", branch)
        };
        self.exec().run(&format!("cd {} && {}", build, update))?;
        phases.advance(Phase::RepoUpdated)?;

        log_status!("release", "Setting up repo");
        let staged = context.clone().with(keys::BUILD_PATH, layout.build_path.clone());
        self.emit(names::UPDATING, &staged)?;
        phases.advance(Phase::RepoSetupHookRun)?;

        Ok(())
    }

    pub(super) fn cleanup_staging(&self) {
        log_status!("release", "Cleaning up failed build");
        if let Err(err) = releases::remove_build(self.exec(), &self.env.layout) {
            log_status!("release", "Could not remove the staging area: {}", err);
        }
    }
}
