use pocketbank::cli::{needs_client, parse_args, run_cli_command, run_local_command};
use pocketbank::config::ClientConfig;
use pocketbank::logging::init_tracing;
use pocketbank::BankClient;

use color_eyre::Result;

fn main() -> Result<()> {
    let command = parse_args(std::env::args());

    // Version and help never touch storage
    if let Some(result) = run_local_command(&command) {
        return result;
    }

    color_eyre::install()?;
    init_tracing();

    if !needs_client(&command) {
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let client = BankClient::with_defaults(ClientConfig::from_env())?;
        let result = run_cli_command(command, &client).await;
        client.shutdown();
        result
    })
}
