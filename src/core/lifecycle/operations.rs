use serde::Serialize;

use crate::delta::{self, Delta};
use crate::error::{Error, Result};
use crate::releases::{self, ReleaseId, ReleaseSummary};
use crate::signals::{keys, names, SignalContext};
use crate::utils::shell;

use super::Deployer;

#[derive(Debug, Serialize)]
pub struct SetupReport {
    pub release: ReleaseId,
    pub branch: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct RollbackReport {
    pub rollback_from: ReleaseId,
    pub rollback_to: ReleaseId,
}

#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub removed: Vec<ReleaseId>,
    pub remaining: Vec<ReleaseId>,
}

#[derive(Debug, Serialize)]
pub struct CleanupFailedReport {
    pub removed_path: String,
}

#[derive(Debug, Serialize)]
pub struct ResetupReport {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct RestartReport {
    pub program: String,
    pub refreshed: bool,
}

#[derive(Debug, Serialize)]
pub struct DeltaReport {
    pub branch: String,
    pub delta: Delta,
    pub rendered: String,
}

#[derive(Debug, Serialize)]
pub struct HeadReport {
    pub head: String,
}

impl Deployer {
    /// Provision the deploy root, clone the repository into a first release,
    /// and start the program.
    pub fn setup(&self) -> Result<SetupReport> {
        let env = self.env.clone();
        let layout = &env.layout;
        let repo = env
            .repo
            .as_deref()
            .filter(|r| !r.is_empty())
            .ok_or_else(|| Error::config_missing_key("repo", None))?;

        log_status!("setup", "Creating project path");
        let path = shell::quote_path(&layout.path);
        let shared = shell::quote_path(&layout.shared_path);
        self.exec().run(&format!(
            "mkdir -p {} {}/log",
            shell::quote_path(&layout.releases_path),
            shared
        ))?;
        self.exec()
            .run(&format!("find {} -type d -exec chmod 755 {{}} \\;", path))?;
        self.exec()
            .run(&format!("find {} -type f -exec chmod 644 {{}} \\;", path))?;
        self.exec().run(&format!("chmod -R g+w {}", shared))?;

        let existing = releases::list_releases(self.exec(), layout)?;
        let release = releases::mint_release_id(self.clock.as_ref());
        if existing.contains(&release) {
            return Err(Error::release_id_collision(&layout.releases_path, release.as_str()));
        }

        let context = self
            .base_context()
            .with(keys::NEW_RELEASE, release.as_str())
            .with_flag(keys::FIRST_SETUP, true);

        if let Err(err) = self.clone_into_staging(repo, &context) {
            self.cleanup_staging();
            return Err(err);
        }

        let build = shell::quote_path(&layout.build_path);
        self.exec().run(&format!(
            "mv {} {}",
            build,
            shell::quote_path(&layout.release_path(&release))
        ))?;
        releases::swap_current(self.exec(), layout, &release)?;

        self.emit(names::STARTED, &context)?;
        self.restart_service(true, None)?;

        Ok(SetupReport {
            release,
            branch: env.branch.clone(),
            path: layout.path.clone(),
        })
    }

    fn clone_into_staging(&self, repo: &str, context: &SignalContext) -> Result<()> {
        let build = shell::quote_path(&self.env.layout.build_path);

        log_status!("setup", "Cloning the latest code");
        self.exec().run(&format!(
            "rm -rf {} && git clone -q --depth 1 --no-single-branch {} {}",
            build,
            shell::quote_arg(repo),
            build
        ))?;

        log_status!("setup", "Checking out {} branch", self.env.branch);
        self.exec().run(&format!(
            "cd {} && git checkout {}",
            build,
            shell::quote_arg(&self.env.branch)
        ))?;

        log_status!("setup", "Setting up repo");
        let staged = context
            .clone()
            .with(keys::BUILD_PATH, self.env.layout.build_path.clone());
        self.emit(names::SETUP, &staged)
    }

    /// Point `current` back at the previous release, restart, then delete the
    /// release that was current. One step only; retention is not enforced.
    pub fn rollback(&self) -> Result<RollbackReport> {
        let layout = &self.env.layout;
        log_status!("rollback", "Rolling back to last release");

        let set = releases::compute_release_set(self.exec(), layout)?;
        let rollback_to = set.previous().cloned().ok_or_else(|| {
            Error::release_no_rollback_target(&layout.releases_path, set.current.as_str())
        })?;
        let rollback_from = set.current.clone();

        releases::swap_current(self.exec(), layout, &rollback_to)?;
        self.restart_service(false, None)?;

        self.exec().run(&format!(
            "rm -rf {}",
            shell::quote_path(&layout.release_path(&rollback_from))
        ))?;
        log_status!("rollback", "Rolled back from {} to {}", rollback_from, rollback_to);

        let context = self
            .base_context()
            .with(keys::ROLLBACK_FROM, rollback_from.as_str())
            .with(keys::ROLLBACK_TO, rollback_to.as_str());
        self.emit(names::REVERTED, &context)?;

        Ok(RollbackReport {
            rollback_from,
            rollback_to,
        })
    }

    /// Enforce the retention policy.
    pub fn cleanup(&self) -> Result<CleanupReport> {
        log_status!("cleanup", "Cleaning up old release(s)");
        let layout = &self.env.layout;
        let set = releases::compute_release_set(self.exec(), layout)?;
        let removed = releases::enforce_retention(self.exec(), layout, &set, self.env.keep_releases)?;
        let remaining = set
            .releases
            .iter()
            .filter(|r| !removed.contains(r))
            .cloned()
            .collect();

        Ok(CleanupReport { removed, remaining })
    }

    /// Remove the staging area left by a failed build.
    pub fn cleanup_failed(&self) -> Result<CleanupFailedReport> {
        log_status!("cleanup", "Cleaning up failed build");
        releases::remove_build(self.exec(), &self.env.layout)?;
        Ok(CleanupFailedReport {
            removed_path: self.env.layout.build_path.clone(),
        })
    }

    /// Re-run the repo setup signal inside the current release.
    pub fn resetup(&self) -> Result<ResetupReport> {
        let layout = &self.env.layout;
        releases::resolve_current(self.exec(), layout)?;

        log_status!("resetup", "Setting up repo");
        let context = self
            .base_context()
            .with(keys::BUILD_PATH, layout.current_path.clone());
        self.emit(names::UPDATING, &context)?;

        Ok(ResetupReport {
            path: layout.current_path.clone(),
        })
    }

    pub fn restart(&self) -> Result<RestartReport> {
        let refreshed = self.restart_service(false, None)?;
        Ok(RestartReport {
            program: self.env.supervisor_program.clone(),
            refreshed,
        })
    }

    /// Compute the pending delta and announce it.
    pub fn delta(&self) -> Result<DeltaReport> {
        let env = &self.env;
        let delta = delta::extract(self.exec(), &env.layout.current_path, &env.upstream, &env.branch)?;
        let rendered = delta.render_plain();
        if delta.is_empty() {
            log_status!("delta", "No delta.");
        } else {
            log_status!("delta", "Get delta:\n{}", rendered);
        }

        let context = self.delta_context(self.base_context(), &delta);
        self.emit(names::DELTA_PUBLISHING, &context)?;

        Ok(DeltaReport {
            branch: env.branch.clone(),
            delta,
            rendered,
        })
    }

    /// Read the deployed head and announce it.
    pub fn head(&self) -> Result<HeadReport> {
        let head = delta::remote_head(self.exec(), &self.env.layout.current_path)?;
        log_status!("head", "Get head: {}", head);
        self.emit(
            names::HEAD_PUBLISHING,
            &self.base_context().with(keys::HEAD, head.clone()),
        )?;
        Ok(HeadReport { head })
    }

    pub fn releases(&self) -> Result<ReleaseSummary> {
        let set = releases::compute_release_set(self.exec(), &self.env.layout)?;
        Ok(ReleaseSummary::from(&set))
    }
}
