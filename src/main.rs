use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{delta, deploy};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "capstan")]
#[command(version = VERSION)]
#[command(about = "Atomic, symlink-based releases on remote hosts")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the deploy root and the first release
    Setup(deploy::SetupArgs),
    /// Build a new release from the current one and switch to it
    Release(deploy::ReleaseArgs),
    /// Switch back to the previous release and delete the current one
    Rollback,
    /// Delete releases beyond keep_releases
    Cleanup,
    /// Remove the staging area left by a failed release
    CleanupFailed,
    /// Re-run the repo setup hooks inside the current release
    Resetup,
    /// Restart the program through supervisor
    Restart(deploy::RestartArgs),
    /// Show and announce merge commits not yet deployed
    Delta(delta::DeltaArgs),
    /// Announce the deployed revision
    Head,
    /// Show releases, current, previous, and dirty releases
    Releases,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let (json_result, exit_code) = commands::run_json(cli.command, &cli.global);

    if output::print_json_result(json_result).is_err() {
        return std::process::ExitCode::from(1);
    }

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
