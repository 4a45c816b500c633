use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigMissingKey,
    ConfigInvalidYaml,
    ConfigInvalidValue,

    ValidationInvalidArgument,

    SshIdentityFileNotFound,
    SshConnectFailed,

    RemoteCommandFailed,

    ReleaseNoCurrent,
    ReleaseNoRollbackTarget,
    ReleaseDirectoryUnavailable,
    ReleaseIdCollision,

    SignalHandlerFailed,
    SignalReentrant,

    DeployAborted,

    NotifyFailed,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigMissingKey => "config.missing_key",
            ErrorCode::ConfigInvalidYaml => "config.invalid_yaml",
            ErrorCode::ConfigInvalidValue => "config.invalid_value",

            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::SshIdentityFileNotFound => "ssh.identity_file_not_found",
            ErrorCode::SshConnectFailed => "ssh.connect_failed",

            ErrorCode::RemoteCommandFailed => "remote.command_failed",

            ErrorCode::ReleaseNoCurrent => "release.no_current",
            ErrorCode::ReleaseNoRollbackTarget => "release.no_rollback_target",
            ErrorCode::ReleaseDirectoryUnavailable => "release.directory_unavailable",
            ErrorCode::ReleaseIdCollision => "release.id_collision",

            ErrorCode::SignalHandlerFailed => "signal.handler_failed",
            ErrorCode::SignalReentrant => "signal.reentrant",

            ErrorCode::DeployAborted => "deploy.aborted",

            ErrorCode::NotifyFailed => "notify.failed",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMissingKeyDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidYamlDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SshIdentityFileNotFoundDetails {
    pub host: String,
    pub identity_file: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommandFailedDetails {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub target: TargetDetails,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    pub local: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseDetails {
    pub releases_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalHandlerFailedDetails {
    pub signal: String,
    pub handler: usize,
    pub cause_code: String,
    pub cause_message: String,
    pub cause_details: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
        }
    }

    pub fn config_missing_key(key: impl Into<String>, path: Option<String>) -> Self {
        let key = key.into();
        Self::new(
            ErrorCode::ConfigMissingKey,
            format!("Missing required configuration key '{}'", key),
            to_details(ConfigMissingKeyDetails { key, path }),
        )
    }

    pub fn config_invalid_yaml(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorCode::ConfigInvalidYaml,
            "Invalid YAML in configuration",
            to_details(ConfigInvalidYamlDetails {
                path: path.into(),
                error: err.to_string(),
            }),
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value for '{}': {}", key, problem),
            to_details(ConfigInvalidValueDetails {
                key,
                value,
                problem,
            }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let problem = problem.into();
        Self::new(
            ErrorCode::ValidationInvalidArgument,
            problem.clone(),
            to_details(InvalidArgumentDetails {
                field: field.into(),
                problem,
                id,
                tried,
            }),
        )
    }

    pub fn ssh_identity_file_not_found(
        host: impl Into<String>,
        identity_file: impl Into<String>,
    ) -> Self {
        Self::new(
            ErrorCode::SshIdentityFileNotFound,
            "SSH identity file not found",
            to_details(SshIdentityFileNotFoundDetails {
                host: host.into(),
                identity_file: identity_file.into(),
            }),
        )
    }

    pub fn ssh_connect_failed(host: impl Into<String>, stderr: impl Into<String>) -> Self {
        let host = host.into();
        let mut err = Self::new(
            ErrorCode::SshConnectFailed,
            format!("Could not connect to {}", host),
            serde_json::json!({ "host": host, "stderr": stderr.into() }),
        );
        err.retryable = Some(true);
        err
    }

    /// TransportFailure: a command ran and exited non-zero, or could not be spawned.
    pub fn remote_command_failed(details: RemoteCommandFailedDetails) -> Self {
        let message = if details.target.local {
            format!("Local command failed (exit {})", details.exit_code)
        } else {
            format!("Remote command failed (exit {})", details.exit_code)
        };
        Self::new(ErrorCode::RemoteCommandFailed, message, to_details(details))
    }

    pub fn release_no_current(releases_path: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ReleaseNoCurrent,
            "No current release",
            to_details(ReleaseDetails {
                releases_path: releases_path.into(),
                release: None,
                releases: Vec::new(),
            }),
        )
        .with_hint("Run 'capstan setup' to provision the first release")
    }

    pub fn release_no_rollback_target(releases_path: impl Into<String>, current: &str) -> Self {
        Self::new(
            ErrorCode::ReleaseNoRollbackTarget,
            "No release to rollback",
            to_details(ReleaseDetails {
                releases_path: releases_path.into(),
                release: Some(current.to_string()),
                releases: Vec::new(),
            }),
        )
    }

    pub fn release_directory_unavailable(
        releases_path: impl Into<String>,
        cause: &Error,
    ) -> Self {
        Self::new(
            ErrorCode::ReleaseDirectoryUnavailable,
            format!("Could not list releases: {}", cause.message),
            serde_json::json!({
                "releasesPath": releases_path.into(),
                "causeCode": cause.code.as_str(),
                "cause": cause.details.clone(),
            }),
        )
    }

    pub fn release_id_collision(releases_path: impl Into<String>, release: &str) -> Self {
        Self::new(
            ErrorCode::ReleaseIdCollision,
            format!("Release {} already exists", release),
            to_details(ReleaseDetails {
                releases_path: releases_path.into(),
                release: Some(release.to_string()),
                releases: Vec::new(),
            }),
        )
        .with_hint("Another release was minted within the same second; retry the release")
    }

    /// HandlerFailure: wraps the error a signal handler returned.
    pub fn signal_handler_failed(signal: &str, handler: usize, cause: Error) -> Self {
        Self::new(
            ErrorCode::SignalHandlerFailed,
            format!("Handler #{} for '{}' failed: {}", handler, signal, cause.message),
            to_details(SignalHandlerFailedDetails {
                signal: signal.to_string(),
                handler,
                cause_code: cause.code.as_str().to_string(),
                cause_message: cause.message,
                cause_details: cause.details,
            }),
        )
    }

    pub fn signal_reentrant(signal: &str) -> Self {
        Self::new(
            ErrorCode::SignalReentrant,
            format!("Signal '{}' emitted from one of its own handlers", signal),
            serde_json::json!({ "signal": signal }),
        )
    }

    pub fn deploy_aborted(phase: &str, reason: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::DeployAborted,
            reason,
            serde_json::json!({ "phase": phase }),
        )
    }

    pub fn notify_failed(service: &str, error: impl Into<String>) -> Self {
        let mut err = Self::new(
            ErrorCode::NotifyFailed,
            format!("Failed to notify {}", service),
            serde_json::json!({ "service": service, "error": error.into() }),
        );
        err.retryable = Some(true);
        err
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalIoError,
            "IO error",
            to_details(InternalIoErrorDetails {
                error: error.into(),
                context,
            }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        Self::new(
            ErrorCode::InternalJsonError,
            "JSON error",
            serde_json::json!({ "error": error.into(), "context": context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }
}
