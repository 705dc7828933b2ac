//! scholarsnap CLI: scheduled citation profile snapshots.
//!
//! Fetches a citation profile, merges it with the previously published
//! snapshot, and writes versioned JSON. The exit status tells the scheduler
//! whether a new snapshot was persisted and, if not, why.

mod commands;

use std::process::ExitCode;

use clap::Parser;

use commands::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
        return ExitCode::FAILURE;
    }
    let cli = Cli::parse();
    commands::init_tracing(&cli);

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            let code = commands::exit_code(&report);
            eprintln!("Error: {report:?}");
            ExitCode::from(code)
        }
    }
}
