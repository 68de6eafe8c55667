mod cli;
mod commands;
mod error;
mod logging;

use clap::Parser;
use std::process::ExitCode;

use crate::cli::Cli;
use crate::error::CliError;

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    logging::init();

    match run().await {
        Ok(code) => code,
        Err(error) => {
            tracing::error!(code = error.exit_code(), "{error}");
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}

async fn run() -> Result<ExitCode, CliError> {
    let cli = Cli::parse();

    let result = commands::run(&cli).await?;
    let rendered = if cli.pretty {
        serde_json::to_string_pretty(&result.data)?
    } else {
        serde_json::to_string(&result.data)?
    };
    println!("{rendered}");

    if result.has_failures() {
        return Ok(ExitCode::from(3));
    }
    Ok(ExitCode::SUCCESS)
}
