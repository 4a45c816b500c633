//! Project configuration (`capstan.yml`).
//!
//! The file is parsed once into a typed [`ProjectConfig`], validated, and then
//! resolved for one stage/role into a [`DeployEnv`]: the explicit context every
//! operation and plugin receives.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::releases::ReleaseLayout;
use crate::signals::names;
use crate::utils::template;

pub const DEFAULT_CONFIG_FILE: &str = "capstan.yml";

/// Default location of the supervisor program config inside a release.
pub const DEFAULT_SUPERVISOR_CONF: &str =
    "{{current_path}}/configs/supervisor_{{env}}_{{role}}.conf";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub host: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub identity_file: Option<String>,
}

fn default_user() -> String {
    "deploy".to_string()
}

fn default_port() -> u16 {
    22
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Program or group passed to supervisorctl. Defaults to `project_name`.
    #[serde(default)]
    pub program: Option<String>,
    /// Program config linked into /etc/supervisor/conf.d.
    #[serde(default)]
    pub conf: Option<String>,
    #[serde(default)]
    pub refresh: bool,
    #[serde(default)]
    pub wait_before_refreshing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default = "default_icon_emoji")]
    pub icon_emoji: String,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            webhook: None,
            channel: None,
            icon_emoji: default_icon_emoji(),
        }
    }
}

fn default_icon_emoji() -> String {
    ":rocket:".to_string()
}

/// Per-stage hosts and overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageConfig {
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub keep_releases: Option<usize>,
    #[serde(default)]
    pub use_reset: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub app_name: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub path: String,
    #[serde(default)]
    pub repo: Option<String>,
    #[serde(default = "default_branch")]
    pub branch: String,
    #[serde(default = "default_upstream")]
    pub upstream: String,
    #[serde(default = "default_repo_path")]
    pub repo_path: String,
    #[serde(default = "default_keep_releases")]
    pub keep_releases: usize,
    #[serde(default)]
    pub use_reset: bool,
    #[serde(default)]
    pub show_output: bool,
    #[serde(default)]
    pub git_web: Option<String>,
    #[serde(default = "default_plugins")]
    pub plugins: Vec<Plugin>,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub slack: SlackConfig,
    /// Shell commands run on the target host when a signal is emitted, keyed
    /// by signal name. They run inside the staging area for `deploy.updating`
    /// and `deploy.setup`, inside `current` otherwise.
    #[serde(default)]
    pub hooks: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub stages: HashMap<String, StageConfig>,
}

fn default_branch() -> String {
    "master".to_string()
}

fn default_upstream() -> String {
    "upstream".to_string()
}

fn default_repo_path() -> String {
    ".".to_string()
}

fn default_keep_releases() -> usize {
    5
}

fn default_plugins() -> Vec<Plugin> {
    vec![Plugin::Git, Plugin::Supervisor]
}

/// Built-in plugins that can be listed under `plugins:`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plugin {
    Git,
    Supervisor,
    Slack,
}

impl Plugin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Plugin::Git => "git",
            Plugin::Supervisor => "supervisor",
            Plugin::Slack => "slack",
        }
    }
}

/// Resolved, per-operation deployment context.
#[derive(Debug, Clone, Serialize)]
pub struct DeployEnv {
    pub app_name: String,
    pub project_name: String,
    pub stage: String,
    pub role: String,
    pub layout: ReleaseLayout,
    pub repo: Option<String>,
    pub branch: String,
    pub upstream: String,
    pub repo_path: String,
    pub keep_releases: usize,
    pub use_reset: bool,
    pub show_output: bool,
    pub git_web: Option<String>,
    pub plugins: Vec<Plugin>,
    pub supervisor_program: String,
    pub supervisor_conf: String,
    pub refresh_supervisor: bool,
    pub wait_before_refreshing: bool,
    pub slack_webhook: Option<String>,
    pub slack_channel: Option<String>,
    pub slack_icon_emoji: String,
    pub hooks: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    pub hosts: Vec<Host>,
}

impl DeployEnv {
    /// `<app_name>-<stage>`, the name notifications refer to.
    pub fn target(&self) -> String {
        format!("{}-{}", self.app_name, self.stage)
    }
}

/// Operator overrides applied on top of the resolved config.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub branch: Option<String>,
    pub use_reset: Option<bool>,
    pub refresh_supervisor: Option<bool>,
    pub wait_before_refreshing: Option<bool>,
    pub slack_channel: Option<String>,
    pub show_output: Option<bool>,
}

/// Load `capstan.yml` from an explicit path or the working directory.
pub fn load(path: Option<&Path>) -> Result<ProjectConfig> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(DEFAULT_CONFIG_FILE),
    };

    let content = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::config_missing_key("config", Some(path.display().to_string()))
                .with_hint(format!("Create {} in the project root", DEFAULT_CONFIG_FILE))
        } else {
            Error::internal_io(e.to_string(), Some(format!("read {}", path.display())))
        }
    })?;

    let config = parse(&content, &path.display().to_string())?;
    config.validate()?;
    Ok(config)
}

pub fn parse(content: &str, origin: &str) -> Result<ProjectConfig> {
    serde_yml::from_str(content).map_err(|e| Error::config_invalid_yaml(origin, e))
}

impl ProjectConfig {
    pub fn validate(&self) -> Result<()> {
        if self.app_name.trim().is_empty() {
            return Err(Error::config_missing_key("app_name", None));
        }

        validate_path("path", &self.path)?;
        validate_keep_releases("keep_releases", self.keep_releases)?;

        for event in self.hooks.keys() {
            if !names::ALL.contains(&event.as_str()) {
                return Err(Error::config_invalid_value(
                    "hooks",
                    Some(event.clone()),
                    format!("unknown signal, expected one of {}", names::ALL.join(", ")),
                ));
            }
        }

        if self.slack.channel.is_some() && self.slack.webhook.is_none() {
            return Err(Error::config_missing_key("slack.webhook", None)
                .with_hint("A slack channel is configured but no webhook to post to"));
        }

        for (name, stage) in &self.stages {
            if let Some(ref path) = stage.path {
                validate_path(&format!("stages.{}.path", name), path)?;
            }
            if let Some(keep) = stage.keep_releases {
                validate_keep_releases(&format!("stages.{}.keep_releases", name), keep)?;
            }
            for host in &stage.hosts {
                if host.host.trim().is_empty() {
                    return Err(Error::config_invalid_value(
                        format!("stages.{}.hosts", name),
                        None,
                        "host must not be empty",
                    ));
                }
            }
        }

        Ok(())
    }

    pub fn stage_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stages.keys().cloned().collect();
        names.sort();
        names
    }

    /// Resolve the config for one stage and role into a [`DeployEnv`].
    pub fn resolve(&self, stage: &str, role: Option<&str>, overrides: &Overrides) -> Result<DeployEnv> {
        let stage_config = self.stages.get(stage).ok_or_else(|| {
            Error::validation_invalid_argument(
                "stage",
                format!("Unknown stage '{}'", stage),
                Some(stage.to_string()),
                Some(self.stage_names()),
            )
        })?;

        if stage_config.hosts.is_empty() {
            return Err(Error::config_missing_key(format!("stages.{}.hosts", stage), None));
        }

        let role = match role {
            Some(r) => {
                if !stage_config.roles.is_empty() && !stage_config.roles.iter().any(|x| x == r) {
                    return Err(Error::validation_invalid_argument(
                        "role",
                        format!("Stage '{}' has no role '{}'", stage, r),
                        Some(r.to_string()),
                        Some(stage_config.roles.clone()),
                    ));
                }
                r.to_string()
            }
            None => stage_config
                .roles
                .first()
                .cloned()
                .unwrap_or_else(|| "app".to_string()),
        };

        let path = stage_config.path.clone().unwrap_or_else(|| self.path.clone());
        let layout = ReleaseLayout::new(shellexpand::tilde(&path).to_string());

        let project_name = self
            .project_name
            .clone()
            .unwrap_or_else(|| self.app_name.clone());

        let conf_template = self
            .supervisor
            .conf
            .clone()
            .unwrap_or_else(|| DEFAULT_SUPERVISOR_CONF.to_string());
        let supervisor_conf = template::render(
            &conf_template,
            &[
                ("current_path", layout.current_path.as_str()),
                ("env", stage),
                ("role", role.as_str()),
                ("project_name", project_name.as_str()),
            ],
        );
        if let Some(name) = template::unresolved(&supervisor_conf).into_iter().next() {
            return Err(Error::config_invalid_value(
                "supervisor.conf",
                Some(conf_template),
                format!("unknown placeholder {{{{{}}}}}", name),
            )
            .with_hint("Available: {{current_path}}, {{env}}, {{role}}, {{project_name}}"));
        }

        Ok(DeployEnv {
            app_name: self.app_name.clone(),
            supervisor_program: self
                .supervisor
                .program
                .clone()
                .unwrap_or_else(|| project_name.clone()),
            project_name,
            stage: stage.to_string(),
            role,
            layout,
            repo: self.repo.clone(),
            branch: overrides
                .branch
                .clone()
                .or_else(|| stage_config.branch.clone())
                .unwrap_or_else(|| self.branch.clone()),
            upstream: self.upstream.clone(),
            repo_path: self.repo_path.clone(),
            keep_releases: stage_config.keep_releases.unwrap_or(self.keep_releases),
            use_reset: overrides
                .use_reset
                .or(stage_config.use_reset)
                .unwrap_or(self.use_reset),
            show_output: overrides.show_output.unwrap_or(self.show_output),
            git_web: self.git_web.clone().filter(|w| !w.is_empty()),
            plugins: self.plugins.clone(),
            supervisor_conf,
            refresh_supervisor: overrides
                .refresh_supervisor
                .unwrap_or(self.supervisor.refresh),
            wait_before_refreshing: overrides
                .wait_before_refreshing
                .unwrap_or(self.supervisor.wait_before_refreshing),
            slack_webhook: self.slack.webhook.clone(),
            slack_channel: overrides
                .slack_channel
                .clone()
                .or_else(|| self.slack.channel.clone()),
            slack_icon_emoji: self.slack.icon_emoji.clone(),
            hooks: self.hooks.clone(),
            hosts: stage_config.hosts.clone(),
        })
    }
}

fn validate_path(key: &str, path: &str) -> Result<()> {
    let expanded = shellexpand::tilde(path);
    if !expanded.starts_with('/') {
        return Err(Error::config_invalid_value(
            key,
            Some(path.to_string()),
            "deploy path must be absolute",
        ));
    }
    if expanded.trim_end_matches('/').is_empty() {
        return Err(Error::config_invalid_value(
            key,
            Some(path.to_string()),
            "deploy path must not be the filesystem root",
        ));
    }
    Ok(())
}

fn validate_keep_releases(key: &str, keep: usize) -> Result<()> {
    if keep == 0 {
        return Err(Error::config_invalid_value(
            key,
            Some("0".to_string()),
            "must keep at least one release",
        ));
    }
    Ok(())
}
