//! CLI module for the pocketbank binary.
//!
//! - Argument parsing
//! - Session status, logout and device id
//! - Realtime watch
//!
//! # Usage
//!
//! ```ignore
//! use pocketbank::cli::{parse_args, run_cli_command};
//!
//! let command = parse_args(std::env::args());
//! run_cli_command(command, &client).await?;
//! ```

pub mod args;
pub mod status;
pub mod version;
pub mod watch;

pub use args::{parse_args, CliCommand, USAGE};
pub use status::{handle_device_id_command, handle_logout_command, handle_status_command};
pub use version::{handle_version_command, VERSION};
pub use watch::handle_watch_command;

use color_eyre::eyre::eyre;
use color_eyre::Result;

use crate::client::BankClient;

/// Whether `command` needs a [`BankClient`] to run.
pub fn needs_client(command: &CliCommand) -> bool {
    matches!(
        command,
        CliCommand::Status | CliCommand::Watch | CliCommand::Logout | CliCommand::DeviceId
    )
}

/// Commands answered without touching storage or the network.
///
/// Returns `None` when the command needs a client.
pub fn run_local_command(command: &CliCommand) -> Option<Result<()>> {
    match command {
        CliCommand::Version => {
            handle_version_command();
            Some(Ok(()))
        }
        CliCommand::Help => {
            println!("{}", USAGE);
            Some(Ok(()))
        }
        CliCommand::Unknown(arg) => Some(Err(eyre!("unknown argument '{}'\n\n{}", arg, USAGE))),
        _ => None,
    }
}

/// Run a command that needs the client.
pub async fn run_cli_command(command: CliCommand, client: &BankClient) -> Result<()> {
    match command {
        CliCommand::Status => handle_status_command(client).await,
        CliCommand::Watch => handle_watch_command(client).await,
        CliCommand::Logout => handle_logout_command(client).await,
        CliCommand::DeviceId => handle_device_id_command(client).await,
        other => run_local_command(&other).unwrap_or(Ok(())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_commands() {
        assert!(!needs_client(&CliCommand::Version));
        assert!(matches!(run_local_command(&CliCommand::Help), Some(Ok(()))));
        assert!(matches!(
            run_local_command(&CliCommand::Unknown("x".to_string())),
            Some(Err(_))
        ));
        assert!(run_local_command(&CliCommand::Status).is_none());
    }

    #[test]
    fn test_client_commands() {
        assert!(needs_client(&CliCommand::Status));
        assert!(needs_client(&CliCommand::Watch));
        assert!(needs_client(&CliCommand::Logout));
        assert!(needs_client(&CliCommand::DeviceId));
    }
}
