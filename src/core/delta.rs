//! Merge-commit delta between the deployed revision and the upstream branch.
//!
//! The deployed head is read on the target host; the history walk runs in the
//! operator's checkout after fetching the upstream remote.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::error::Result;
use crate::executor::Executor;
use crate::utils::shell;

/// Rendered in place of an empty delta so notifications always have a body.
pub const NO_COMMIT: &str = "No commit.";

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';

static PULL_REQUEST_SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Merge pull request #([0-9]+) from ([^/\s]+)/\S+")
        .expect("pull request pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeltaEntry {
    pub hash: String,
    pub subject: String,
    pub body: String,
}

impl DeltaEntry {
    /// Subject with `Merge pull request #N from owner/branch` shortened to `#N/owner`.
    pub fn short_subject(&self) -> String {
        rewrite_subject(&self.subject)
    }

    fn render(&self) -> String {
        format!("{} {}: {}", self.hash, self.short_subject(), self.body)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delta {
    pub entries: Vec<DeltaEntry>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One `<short-hash> <subject>: <body>` line per merge commit.
    pub fn render_plain(&self) -> String {
        if self.entries.is_empty() {
            return NO_COMMIT.to_string();
        }
        self.entries
            .iter()
            .map(DeltaEntry::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Plain form with each commit hash linked as `<{git_web}{hash}|{hash}>`.
    /// Without a web base the plain form is returned.
    pub fn render_rich(&self, git_web: Option<&str>) -> String {
        let Some(git_web) = git_web.filter(|w| !w.is_empty()) else {
            return self.render_plain();
        };
        if self.entries.is_empty() {
            return NO_COMMIT.to_string();
        }
        self.entries
            .iter()
            .map(|e| {
                format!(
                    "<{}{}|{}> {}: {}",
                    git_web,
                    e.hash,
                    e.hash,
                    e.short_subject(),
                    e.body
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub fn rewrite_subject(subject: &str) -> String {
    PULL_REQUEST_SUBJECT
        .replace(subject, "#${1}/${2}")
        .into_owned()
}

/// `git log` arguments producing records [`parse_log`] understands.
pub fn log_command(since: &str, upstream: &str, branch: &str) -> String {
    format!(
        "git log --reverse --merges --pretty=format:'%h%x1f%s%x1f%b%x1e' {}..{}",
        shell::quote_arg(since),
        shell::quote_arg(&format!("{}/{}", upstream, branch)),
    )
}

/// Parse records of `hash<US>subject<US>body<RS>`. Multi-line bodies are
/// joined with spaces.
pub fn parse_log(output: &str) -> Vec<DeltaEntry> {
    output
        .split(RECORD_SEP)
        .filter_map(|record| {
            let record = record.trim_matches(|c: char| c == '\n' || c == '\r');
            if record.trim().is_empty() {
                return None;
            }
            let mut fields = record.splitn(3, FIELD_SEP);
            let hash = fields.next()?.trim().to_string();
            let subject = fields.next().unwrap_or("").trim().to_string();
            let body = fields
                .next()
                .unwrap_or("")
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect::<Vec<_>>()
                .join(" ");
            if hash.is_empty() {
                return None;
            }
            Some(DeltaEntry {
                hash,
                subject,
                body,
            })
        })
        .collect()
}

/// Short hash of the revision checked out at `path` on the target host.
pub fn remote_head(exec: &dyn Executor, path: &str) -> Result<String> {
    exec.run_quiet(&format!(
        "cd {} && git rev-parse --short HEAD",
        shell::quote_path(path)
    ))
}

/// Merge commits on `<upstream>/<branch>` not yet in the revision deployed at
/// `current_path`, oldest first.
pub fn extract(
    exec: &dyn Executor,
    current_path: &str,
    upstream: &str,
    branch: &str,
) -> Result<Delta> {
    let head = remote_head(exec, current_path)?;
    log_status!("delta", "Current version: {}", head);

    exec.local(&format!("git fetch -q {}", shell::quote_arg(upstream)))?;
    let output = exec.local(&log_command(&head, upstream, branch))?;

    Ok(Delta {
        entries: parse_log(&output),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hash: &str, subject: &str, body: &str) -> DeltaEntry {
        DeltaEntry {
            hash: hash.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        }
    }

    #[test]
    fn empty_delta_renders_marker() {
        let delta = Delta::default();
        assert_eq!(delta.render_plain(), "No commit.");
        assert_eq!(delta.render_rich(None), "No commit.");
        assert_eq!(
            delta.render_rich(Some("https://github.com/acme/shop/commit/")),
            "No commit."
        );
    }

    #[test]
    fn pull_request_subject_is_shortened() {
        assert_eq!(
            rewrite_subject("Merge pull request #42 from alice/feature/login"),
            "#42/alice"
        );
        assert_eq!(
            rewrite_subject("Merge branch 'hotfix' into master"),
            "Merge branch 'hotfix' into master"
        );
    }

    #[test]
    fn plain_rendering_is_one_line_per_entry() {
        let delta = Delta {
            entries: vec![
                entry("a1b2c3d", "Merge pull request #7 from bob/fix-cart", "Fix cart totals"),
                entry("e4f5a6b", "Merge branch 'release'", ""),
            ],
        };
        assert_eq!(
            delta.render_plain(),
            "a1b2c3d #7/bob: Fix cart totals\ne4f5a6b Merge branch 'release': "
        );
    }

    #[test]
    fn rich_rendering_links_commits() {
        let delta = Delta {
            entries: vec![entry(
                "a1b2c3d",
                "Merge pull request #7 from bob/fix-cart",
                "Fix cart totals",
            )],
        };
        assert_eq!(
            delta.render_rich(Some("https://github.com/acme/shop/commit/")),
            "<https://github.com/acme/shop/commit/a1b2c3d|a1b2c3d> #7/bob: Fix cart totals"
        );
        assert_eq!(delta.render_rich(Some("")), delta.render_plain());
    }

    #[test]
    fn parse_log_reads_records() {
        let output = "a1b2c3d\u{1f}Merge pull request #7 from bob/fix-cart\u{1f}Fix cart\ntotals\n\u{1e}\n\
                      e4f5a6b\u{1f}Merge branch 'release'\u{1f}\u{1e}";
        let entries = parse_log(output);
        assert_eq!(
            entries,
            vec![
                entry("a1b2c3d", "Merge pull request #7 from bob/fix-cart", "Fix cart totals"),
                entry("e4f5a6b", "Merge branch 'release'", ""),
            ]
        );
    }

    #[test]
    fn parse_log_of_nothing_is_empty() {
        assert!(parse_log("").is_empty());
        assert!(parse_log("\n").is_empty());
    }

    #[test]
    fn log_command_compares_against_upstream_branch() {
        let cmd = log_command("a1b2c3d", "upstream", "master");
        assert!(cmd.contains("--merges"));
        assert!(cmd.ends_with("a1b2c3d..upstream/master"));
    }
}
