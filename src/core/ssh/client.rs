use crate::config::Host;
use crate::error::{Error, RemoteCommandFailedDetails, Result, TargetDetails};
use std::process::Command;

pub struct SshClient {
    pub host: String,
    pub user: String,
    pub port: u16,
    pub identity_file: Option<String>,
    /// When true, all commands run locally instead of over SSH.
    /// Set automatically when the host is localhost/127.0.0.1/::1.
    pub is_local: bool,
}

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn into_result(self, command: &str, target: TargetDetails) -> Result<Self> {
        if self.success {
            return Ok(self);
        }

        // ssh reserves 255 for its own failures
        if !target.local && self.exit_code == 255 {
            return Err(Error::ssh_connect_failed(
                target.host.unwrap_or_default(),
                self.stderr,
            ));
        }

        Err(Error::remote_command_failed(RemoteCommandFailedDetails {
            command: command.to_string(),
            exit_code: self.exit_code,
            stdout: self.stdout,
            stderr: self.stderr,
            target,
        }))
    }

    fn spawn_failed(message: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: message,
            success: false,
            exit_code: -1,
        }
    }
}

impl SshClient {
    pub fn from_host(host: &Host) -> Result<Self> {
        let identity_file = match &host.identity_file {
            Some(path) if !path.is_empty() => {
                let expanded = shellexpand::tilde(path).to_string();
                if !std::path::Path::new(&expanded).exists() {
                    return Err(Error::ssh_identity_file_not_found(
                        host.host.clone(),
                        expanded,
                    ));
                }
                Some(expanded)
            }
            _ => None,
        };

        let is_local = is_local_host(&host.host);
        if is_local {
            log_status!("ssh", "Host '{}' is localhost, using local execution", host.host);
        }

        Ok(Self {
            host: host.host.clone(),
            user: host.user.clone(),
            port: host.port,
            identity_file,
            is_local,
        })
    }

    pub fn target(&self) -> TargetDetails {
        TargetDetails {
            host: Some(format!("{}@{}", self.user, self.host)),
            local: self.is_local,
        }
    }

    fn build_ssh_args(&self, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        // Never block on prompts or stalled connections.
        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(format!("{}@{}", self.user, self.host));
        args.push(command.to_string());

        args
    }

    pub fn execute(&self, command: &str) -> CommandOutput {
        self.execute_with_retry(command, 3)
    }

    fn execute_with_retry(&self, command: &str, max_attempts: u32) -> CommandOutput {
        let backoff_secs = [0, 2, 5];

        let mut attempt = 0;
        loop {
            let result = self.execute_once(command);

            // A command that ran is never re-run, whatever it printed.
            if result.success || attempt + 1 >= max_attempts || !self.is_connection_failure(&result) {
                return result;
            }

            let delay = backoff_secs
                .get(attempt as usize + 1)
                .copied()
                .unwrap_or(5);
            log_status!(
                "ssh",
                "Connection to {} failed (attempt {}/{}), retrying in {}s...",
                self.host,
                attempt + 1,
                max_attempts,
                delay
            );
            std::thread::sleep(std::time::Duration::from_secs(delay));
            attempt += 1;
        }
    }

    /// ssh itself exits 255 when it cannot reach the host. Local commands
    /// have no transport to fail.
    fn is_connection_failure(&self, output: &CommandOutput) -> bool {
        !self.is_local && output.exit_code == 255
    }

    fn execute_once(&self, command: &str) -> CommandOutput {
        if self.is_local {
            return execute_local_command(command);
        }

        let args = self.build_ssh_args(command);

        match Command::new("ssh").args(&args).output() {
            Ok(out) => CommandOutput {
                stdout: String::from_utf8_lossy(&out.stdout).to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).to_string(),
                success: out.status.success(),
                exit_code: out.status.code().unwrap_or(-1),
            },
            Err(e) => CommandOutput::spawn_failed(format!("SSH error: {}", e)),
        }
    }
}

pub fn execute_local_command(command: &str) -> CommandOutput {
    execute_local_command_in_dir(command, None)
}

pub fn execute_local_command_in_dir(command: &str, current_dir: Option<&str>) -> CommandOutput {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command]);

    if let Some(dir) = current_dir {
        cmd.current_dir(dir);
    }

    match cmd.output() {
        Ok(out) => CommandOutput {
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
            success: out.status.success(),
            exit_code: out.status.code().unwrap_or(-1),
        },
        Err(e) => CommandOutput::spawn_failed(format!("Command error: {}", e)),
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(host: &str) -> bool {
    matches!(host, "localhost" | "127.0.0.1" | "::1")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(host: &str, port: u16) -> SshClient {
        SshClient {
            host: host.to_string(),
            user: "deploy".to_string(),
            port,
            identity_file: None,
            is_local: is_local_host(host),
        }
    }

    #[test]
    fn local_hosts_are_detected() {
        assert!(is_local_host("localhost"));
        assert!(is_local_host("127.0.0.1"));
        assert!(!is_local_host("web1.example.com"));
    }

    #[test]
    fn ssh_args_include_port_and_batch_mode() {
        let args = client("web1.example.com", 2222).build_ssh_args("uptime");
        assert!(args.windows(2).any(|w| w[0] == "-p" && w[1] == "2222"));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args[args.len() - 2], "deploy@web1.example.com");
        assert_eq!(args.last().map(String::as_str), Some("uptime"));
    }

    #[test]
    fn localhost_executes_through_shell() {
        let output = client("localhost", 22).execute("echo hello");
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[test]
    fn failed_command_becomes_transport_failure() {
        let c = client("localhost", 22);
        let err = c.execute("exit 3").into_result("exit 3", c.target()).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::RemoteCommandFailed);
        assert_eq!(err.details["exitCode"], 3);
    }

    #[test]
    fn remote_exit_255_is_a_connection_failure() {
        let output =
            CommandOutput::spawn_failed("ssh: connect to host web1 port 22: refused".to_string());
        let output = CommandOutput { exit_code: 255, ..output };
        let target = client("web1.example.com", 22).target();
        let err = output.into_result("uptime", target).unwrap_err();
        assert_eq!(err.code, crate::ErrorCode::SshConnectFailed);
    }

    fn failed(exit_code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            success: false,
            exit_code,
        }
    }

    #[test]
    fn only_ssh_exit_255_counts_as_connection_failure() {
        let remote = client("web1.example.com", 22);
        assert!(remote.is_connection_failure(&failed(255, "")));
        assert!(!remote.is_connection_failure(&failed(128, "fatal: Connection refused")));
        assert!(!client("localhost", 22).is_connection_failure(&failed(255, "")));
    }
}
