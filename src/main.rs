use anyhow::Context;
use clap::Parser;
use colored::*;
use std::process;
use taxodb::cli::Cli;
use taxodb::TaxoError;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);

        // Use appropriate exit codes based on error type
        let exit_code = match e.downcast_ref::<TaxoError>() {
            Some(TaxoError::Configuration(_)) => 2,
            Some(TaxoError::Io(_)) => 3,
            Some(TaxoError::Protocol(_)) | Some(TaxoError::Serialization(_)) => 4,
            Some(TaxoError::Forbidden) => 5,
            _ => 1,
        };
        process::exit(exit_code);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    runtime.block_on(taxodb::cli::run(cli))
}
