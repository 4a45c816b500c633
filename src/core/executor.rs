//! Command execution against the target host or the operator's machine.
//!
//! The lifecycle only ever sees the [`Executor`] trait. `run` executes on the
//! target host, `local` on the machine running capstan. Both block until the
//! command returns; a non-zero exit becomes a `remote.command_failed` error
//! unless the caller uses the tolerant variant.

use crate::config::Host;
use crate::error::{Result, TargetDetails};
use crate::ssh::{execute_local_command_in_dir, CommandOutput, SshClient};

pub trait Executor {
    /// Run a command on the target host and return its raw output.
    fn execute(&self, command: &str, quiet: bool) -> CommandOutput;

    /// Run a command on the operator's machine and return its raw output.
    fn execute_local(&self, command: &str) -> CommandOutput;

    fn target(&self) -> TargetDetails;

    /// Run on the target host; non-zero exit is a transport failure.
    /// Returns trimmed stdout.
    fn run(&self, command: &str) -> Result<String> {
        self.run_with(command, false)
    }

    /// Like [`Executor::run`], never echoing output.
    fn run_quiet(&self, command: &str) -> Result<String> {
        self.run_with(command, true)
    }

    fn run_with(&self, command: &str, quiet: bool) -> Result<String> {
        let output = self
            .execute(command, quiet)
            .into_result(command, self.target())?;
        Ok(output.stdout.trim().to_string())
    }

    /// Run on the target host, tolerating a non-zero exit.
    fn run_tolerant(&self, command: &str) -> CommandOutput {
        self.execute(command, false)
    }

    /// Run on the operator's machine; non-zero exit is a transport failure.
    fn local(&self, command: &str) -> Result<String> {
        let output = self.execute_local(command).into_result(
            command,
            TargetDetails {
                host: None,
                local: true,
            },
        )?;
        Ok(output.stdout.trim().to_string())
    }
}

/// Executor bound to a single host over SSH (or the local shell for localhost).
pub struct SshExecutor {
    client: SshClient,
    local_dir: Option<String>,
    show_output: bool,
}

impl SshExecutor {
    pub fn new(host: &Host, show_output: bool) -> Result<Self> {
        Ok(Self {
            client: SshClient::from_host(host)?,
            local_dir: None,
            show_output,
        })
    }

    /// Directory local commands run in (the operator's checkout).
    pub fn with_local_dir(mut self, dir: impl Into<String>) -> Self {
        self.local_dir = Some(dir.into());
        self
    }
}

impl Executor for SshExecutor {
    fn execute(&self, command: &str, quiet: bool) -> CommandOutput {
        let output = self.client.execute(command);
        if self.show_output && !quiet {
            echo_output(&self.client.host, &output);
        }
        output
    }

    fn execute_local(&self, command: &str) -> CommandOutput {
        let output = execute_local_command_in_dir(command, self.local_dir.as_deref());
        if self.show_output {
            echo_output("local", &output);
        }
        output
    }

    fn target(&self) -> TargetDetails {
        self.client.target()
    }
}

fn echo_output(origin: &str, output: &CommandOutput) {
    for line in output.stdout.lines() {
        log_status!("out", "{}: {}", origin, line);
    }
    if !output.success {
        for line in output.stderr.lines() {
            log_status!("err", "{}: {}", origin, line);
        }
    }
}
