//! `azure-wakeup-db`: ensure a connection with an Azure SQL database that may
//! be auto-paused, retrying while it resumes.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

mod args;
mod logging;

use args::Cli;

/// Exit code for a missing or unusable connection target.
const EXIT_CONFIGURATION: u8 = 2;

/// Exit code for every other failure.
const EXIT_FAILURE: u8 = 1;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;

    let params = cli.connection_parameters();
    let policy = cli.retry_policy();

    if cli.verbose {
        let conn = wakeup_core::dsn::build(&params, policy.overall_deadline);
        println!("Connecting with: {conn}");
    }

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, giving up");
            on_interrupt.cancel();
        }
    });

    match wakeup_core::wake(&params, &policy, &cancel).await {
        Ok(handle) => {
            handle.close();
            println!("Connection successful: database is awake.");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {e}");
            let code = if e.is_configuration() {
                EXIT_CONFIGURATION
            } else {
                EXIT_FAILURE
            };
            Ok(ExitCode::from(code))
        }
    }
}
