//! Release directory bookkeeping on the target host.
//!
//! Layout under the deploy root:
//!
//! ```text
//! <path>/releases/<YYMMDD-HHMMSS>/   one directory per release
//! <path>/releases/_build/            staging area while a release is built
//! <path>/current -> releases/<id>    the served release
//! <path>/shared/log/                 survives across releases
//! ```
//!
//! The directory listing is the source of truth: every operation recomputes
//! the release set instead of caching it.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;
use std::fmt;

use crate::error::{Error, ErrorCode, Result};
use crate::executor::Executor;
use crate::utils::shell;

/// chrono format of release identifiers. Fixed width, so lexicographic order
/// is chronological order.
pub const RELEASE_ID_FORMAT: &str = "%y%m%d-%H%M%S";

/// Name of the staging directory inside the releases root.
pub const BUILD_DIR: &str = "_build";

#[derive(Debug, Clone, Serialize)]
pub struct ReleaseLayout {
    pub path: String,
    pub releases_path: String,
    pub current_path: String,
    pub shared_path: String,
    pub build_path: String,
}

impl ReleaseLayout {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into().trim_end_matches('/').to_string();
        let releases_path = format!("{}/releases", path);
        Self {
            current_path: format!("{}/current", path),
            shared_path: format!("{}/shared", path),
            build_path: format!("{}/{}", releases_path, BUILD_DIR),
            releases_path,
            path,
        }
    }

    pub fn release_path(&self, release: &ReleaseId) -> String {
        format!("{}/{}", self.releases_path, release)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct ReleaseId(String);

impl ReleaseId {
    /// Parse a directory name; anything not in `YYMMDD-HHMMSS` form is not a release.
    pub fn parse(name: &str) -> Option<Self> {
        NaiveDateTime::parse_from_str(name, RELEASE_ID_FORMAT).ok()?;
        // chrono accepts unpadded fields; identifiers must stay fixed width.
        if name.len() != 13 {
            return None;
        }
        Some(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReleaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of the timestamp new releases are named after.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Format a timestamp as a release identifier. Two calls within the same
/// second yield the same identifier; callers check for collisions.
pub fn mint_release_id(clock: &dyn Clock) -> ReleaseId {
    ReleaseId(clock.now().format(RELEASE_ID_FORMAT).to_string())
}

/// Releases on disk, sorted ascending, plus the one `current` points to.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseSet {
    pub releases: Vec<ReleaseId>,
    pub current: ReleaseId,
}

impl ReleaseSet {
    pub fn new(mut releases: Vec<ReleaseId>, current: ReleaseId) -> Self {
        releases.sort();
        releases.dedup();
        Self { releases, current }
    }

    pub fn previous(&self) -> Option<&ReleaseId> {
        previous_of(&self.releases, &self.current)
    }

    pub fn dirty(&self) -> &[ReleaseId] {
        dirty_after(&self.releases, &self.current)
    }

    pub fn contains(&self, release: &ReleaseId) -> bool {
        self.releases.binary_search(release).is_ok()
    }
}

/// Summary shown to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseSummary {
    pub releases: Vec<ReleaseId>,
    pub current: ReleaseId,
    pub previous: Option<ReleaseId>,
    pub dirty: Vec<ReleaseId>,
}

impl From<&ReleaseSet> for ReleaseSummary {
    fn from(set: &ReleaseSet) -> Self {
        Self {
            releases: set.releases.clone(),
            current: set.current.clone(),
            previous: set.previous().cloned(),
            dirty: set.dirty().to_vec(),
        }
    }
}

/// The release immediately before `current`, if any.
pub fn previous_of<'a>(releases: &'a [ReleaseId], current: &ReleaseId) -> Option<&'a ReleaseId> {
    let index = releases.iter().position(|r| r == current)?;
    index.checked_sub(1).map(|i| &releases[i])
}

/// Releases strictly newer than `current`.
pub fn dirty_after<'a>(releases: &'a [ReleaseId], current: &ReleaseId) -> &'a [ReleaseId] {
    match releases.iter().position(|r| r == current) {
        Some(index) => &releases[index + 1..],
        None => &[],
    }
}

/// List release directories, sorted ascending. Entries that are not release
/// identifiers (the staging area, stray files) are ignored.
pub fn list_releases(exec: &dyn Executor, layout: &ReleaseLayout) -> Result<Vec<ReleaseId>> {
    let command = format!("ls -1 {}", shell::quote_path(&layout.releases_path));
    let stdout = exec
        .run_quiet(&command)
        .map_err(|e| Error::release_directory_unavailable(&layout.releases_path, &e))?;

    let mut releases: Vec<ReleaseId> = stdout
        .lines()
        .filter_map(|line| ReleaseId::parse(line.trim()))
        .collect();
    releases.sort();
    Ok(releases)
}

/// Read the current pointer. Fails with `release.no_current` when the symlink
/// is missing or does not name a release directory.
pub fn resolve_current(exec: &dyn Executor, layout: &ReleaseLayout) -> Result<ReleaseId> {
    let command = format!("readlink {}", shell::quote_path(&layout.current_path));
    let target = match exec.run_quiet(&command) {
        Ok(target) => target,
        Err(e) if e.code == ErrorCode::RemoteCommandFailed => {
            return Err(Error::release_no_current(&layout.releases_path));
        }
        Err(e) => return Err(e),
    };

    let name = target.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    ReleaseId::parse(name).ok_or_else(|| Error::release_no_current(&layout.releases_path))
}

/// Compute the release set and check that `current` resolves into it.
pub fn compute_release_set(exec: &dyn Executor, layout: &ReleaseLayout) -> Result<ReleaseSet> {
    let releases = list_releases(exec, layout)?;
    let current = resolve_current(exec, layout)?;

    if !releases.contains(&current) {
        // Dangling pointer
        return Err(Error::release_no_current(&layout.releases_path));
    }

    Ok(ReleaseSet::new(releases, current))
}

/// Releases to delete so that at most `keep_releases` remain, oldest first,
/// never including `current`.
pub fn retention_candidates(
    releases: &[ReleaseId],
    current: &ReleaseId,
    keep_releases: usize,
) -> Vec<ReleaseId> {
    let keep = keep_releases.max(1);
    if releases.len() <= keep {
        return Vec::new();
    }

    let excess = releases.len() - keep;
    releases
        .iter()
        .filter(|r| *r != current)
        .take(excess)
        .cloned()
        .collect()
}

/// Delete the releases selected by [`retention_candidates`]. Returns the
/// deleted identifiers.
pub fn enforce_retention(
    exec: &dyn Executor,
    layout: &ReleaseLayout,
    set: &ReleaseSet,
    keep_releases: usize,
) -> Result<Vec<ReleaseId>> {
    let doomed = retention_candidates(&set.releases, &set.current, keep_releases);
    if doomed.is_empty() {
        return Ok(doomed);
    }

    let paths: Vec<String> = doomed
        .iter()
        .map(|r| shell::quote_path(&layout.release_path(r)))
        .collect();
    exec.run(&format!("rm -rf {}", paths.join(" ")))?;

    Ok(doomed)
}

/// Point `current` at `release` without a window where the link is missing:
/// a fresh link is created next to it and renamed over the old one.
pub fn swap_current(exec: &dyn Executor, layout: &ReleaseLayout, release: &ReleaseId) -> Result<()> {
    let staged_link = format!("{}.next", layout.current_path);
    exec.run(&format!(
        "ln -sfn {} {} && mv -Tf {} {}",
        shell::quote_path(&layout.release_path(release)),
        shell::quote_path(&staged_link),
        shell::quote_path(&staged_link),
        shell::quote_path(&layout.current_path),
    ))?;
    Ok(())
}

/// Remove the staging area.
pub fn remove_build(exec: &dyn Executor, layout: &ReleaseLayout) -> Result<()> {
    exec.run(&format!("rm -rf {}", shell::quote_path(&layout.build_path)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Host;
    use crate::executor::SshExecutor;
    use chrono::NaiveDate;
    use std::fs;
    use std::path::Path;

    struct FixedClock(NaiveDateTime);

    impl Clock for FixedClock {
        fn now(&self) -> NaiveDateTime {
            self.0
        }
    }

    fn id(s: &str) -> ReleaseId {
        ReleaseId::parse(s).unwrap()
    }

    fn ids(list: &[&str]) -> Vec<ReleaseId> {
        list.iter().map(|s| id(s)).collect()
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, s)
            .unwrap()
    }

    fn local_exec() -> SshExecutor {
        let host = Host {
            host: "localhost".to_string(),
            user: "deploy".to_string(),
            port: 22,
            identity_file: None,
        };
        SshExecutor::new(&host, false).unwrap()
    }

    fn deploy_root(releases: &[&str], current: Option<&str>) -> (tempfile::TempDir, ReleaseLayout) {
        let dir = tempfile::tempdir().unwrap();
        let layout = ReleaseLayout::new(dir.path().to_string_lossy().to_string());
        fs::create_dir_all(&layout.releases_path).unwrap();
        for r in releases {
            fs::create_dir_all(Path::new(&layout.releases_path).join(r)).unwrap();
        }
        if let Some(c) = current {
            std::os::unix::fs::symlink(
                Path::new(&layout.releases_path).join(c),
                &layout.current_path,
            )
            .unwrap();
        }
        (dir, layout)
    }

    #[test]
    fn mint_formats_fixed_width_id() {
        let clock = FixedClock(at(2024, 3, 7, 9, 5, 2));
        assert_eq!(mint_release_id(&clock).as_str(), "240307-090502");
    }

    #[test]
    fn earlier_release_sorts_first() {
        let earlier = mint_release_id(&FixedClock(at(2024, 12, 31, 23, 59, 59)));
        let later = mint_release_id(&FixedClock(at(2025, 1, 1, 0, 0, 0)));
        assert!(earlier < later);
        assert!(earlier.as_str() < later.as_str());
    }

    #[test]
    fn same_second_ids_collide() {
        let clock = FixedClock(at(2024, 3, 7, 9, 5, 2));
        assert_eq!(mint_release_id(&clock), mint_release_id(&clock));
    }

    #[test]
    fn parse_rejects_non_release_names() {
        assert!(ReleaseId::parse("_build").is_none());
        assert!(ReleaseId::parse("240307-0905").is_none());
        assert!(ReleaseId::parse("241307-090502").is_none());
        assert!(ReleaseId::parse("240307-090502").is_some());
    }

    #[test]
    fn previous_and_dirty_around_current() {
        let set = ids(&["240101-000000", "240102-000000", "240103-000000", "240104-000000"]);
        let current = id("240102-000000");

        assert_eq!(previous_of(&set, &current), Some(&set[0]));
        assert_eq!(dirty_after(&set, &current), &set[2..]);
        assert_eq!(previous_of(&set, &set[0]), None);
        assert!(dirty_after(&set, &set[3]).is_empty());
    }

    #[test]
    fn retention_deletes_oldest() {
        let set = ids(&["240101-000000", "240102-000000", "240103-000000", "240104-000000"]);
        let doomed = retention_candidates(&set, &set[3], 2);
        assert_eq!(doomed, set[..2].to_vec());
    }

    #[test]
    fn retention_never_deletes_current() {
        let set = ids(&["240101-000000", "240102-000000", "240103-000000", "240104-000000"]);
        let doomed = retention_candidates(&set, &set[0], 2);
        assert_eq!(doomed, set[1..3].to_vec());
        assert!(!doomed.contains(&set[0]));
        assert_eq!(set.len() - doomed.len(), 2);
    }

    #[test]
    fn retention_is_noop_within_limit() {
        let set = ids(&["240101-000000", "240102-000000"]);
        assert!(retention_candidates(&set, &set[1], 2).is_empty());
        assert!(retention_candidates(&set, &set[1], 5).is_empty());
    }

    #[test]
    fn compute_release_set_reads_disk() {
        let (_dir, layout) = deploy_root(
            &["240103-000000", "240101-000000", "240102-000000"],
            Some("240102-000000"),
        );
        fs::create_dir_all(&layout.build_path).unwrap();

        let set = compute_release_set(&local_exec(), &layout).unwrap();

        assert_eq!(
            set.releases,
            ids(&["240101-000000", "240102-000000", "240103-000000"])
        );
        assert_eq!(set.current, id("240102-000000"));
        assert_eq!(set.previous(), Some(&id("240101-000000")));
        assert_eq!(set.dirty(), &ids(&["240103-000000"])[..]);
    }

    #[test]
    fn missing_current_is_reported() {
        let (_dir, layout) = deploy_root(&["240101-000000"], None);
        let err = compute_release_set(&local_exec(), &layout).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReleaseNoCurrent);
    }

    #[test]
    fn dangling_current_is_reported() {
        let (_dir, layout) = deploy_root(&["240101-000000"], Some("240102-000000"));
        let err = compute_release_set(&local_exec(), &layout).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReleaseNoCurrent);
    }

    #[test]
    fn missing_releases_root_is_unavailable() {
        let layout = ReleaseLayout::new("/nonexistent/capstan-test-root");
        let err = compute_release_set(&local_exec(), &layout).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReleaseDirectoryUnavailable);
    }

    #[test]
    fn enforce_retention_removes_directories() {
        let (_dir, layout) = deploy_root(
            &["240101-000000", "240102-000000", "240103-000000"],
            Some("240103-000000"),
        );
        let exec = local_exec();
        let set = compute_release_set(&exec, &layout).unwrap();

        let removed = enforce_retention(&exec, &layout, &set, 1).unwrap();

        assert_eq!(removed, ids(&["240101-000000", "240102-000000"]));
        let remaining = list_releases(&exec, &layout).unwrap();
        assert_eq!(remaining, ids(&["240103-000000"]));
    }

    #[test]
    fn swap_current_replaces_link() {
        let (_dir, layout) = deploy_root(
            &["240101-000000", "240102-000000"],
            Some("240101-000000"),
        );
        let exec = local_exec();

        swap_current(&exec, &layout, &id("240102-000000")).unwrap();

        assert_eq!(resolve_current(&exec, &layout).unwrap(), id("240102-000000"));
        assert!(!Path::new(&format!("{}.next", layout.current_path)).exists());
    }
}
