use clap::Parser;
use gridexp_cli::cli::{Cli, Commands};
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::FmtSubscriber;

mod commands;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // stdout carries command output; logs go to stderr
    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to install log subscriber: {err}");
    }

    let (name, result) = match &cli.command {
        Commands::Solve(args) => ("solve", commands::solve::handle(args)),
        Commands::Engines => ("engines", commands::engines::handle()),
        Commands::Inspect { network } => ("inspect", commands::inspect::handle(network)),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{name} failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
