//! Command-line argument parsing for the pocketbank binary.

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Print session and configuration status (default)
    Status,
    /// Follow the realtime channel and print what it delivers
    Watch,
    /// Sign out and clear stored credentials
    Logout,
    /// Print the persistent device identifier
    DeviceId,
    /// Print usage
    Help,
    /// Unrecognised argument
    Unknown(String),
}

pub const USAGE: &str = "\
usage: pocketbank [command]

commands:
  status      show session state (default)
  watch       follow realtime events until interrupted
  logout      sign out and clear stored credentials
  device-id   print the device identifier

options:
  -V, --version   print version
  -h, --help      print this help";

/// Parse command-line arguments and return the command to run.
///
/// # Examples
///
/// ```
/// use pocketbank::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["pocketbank".to_string(), "watch".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Watch);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    // Skip the program name
    match args.skip(1).next() {
        None => CliCommand::Status,
        Some(arg) => match arg.as_str() {
            "--version" | "-V" => CliCommand::Version,
            "--help" | "-h" | "help" => CliCommand::Help,
            "status" => CliCommand::Status,
            "watch" => CliCommand::Watch,
            "logout" => CliCommand::Logout,
            "device-id" => CliCommand::DeviceId,
            _ => CliCommand::Unknown(arg),
        },
    }
}
