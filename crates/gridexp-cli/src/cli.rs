use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum, ValueHint};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Iterative transmission capacity expansion", long_about = None)]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the expansion loop on a network and write the solved network
    Solve(SolveArgs),
    /// List LP engines compiled into this binary
    Engines,
    /// Print component counts of a network file
    Inspect {
        /// Network JSON file
        #[arg(value_hint = ValueHint::FilePath)]
        network: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SolveArgs {
    /// Network JSON file
    #[arg(value_hint = ValueHint::FilePath)]
    pub network: PathBuf,

    /// TOML run configuration; defaults apply when omitted
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Where to write the solved network. Checkpoint and backup files are
    /// written next to it with `_checkpoint` and `_suboptimal` suffixes.
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Override the configured LP engine
    #[arg(long)]
    pub solver: Option<String>,

    /// Override the configured formulation (angles, kirchhoff)
    #[arg(long)]
    pub formulation: Option<String>,

    /// Keep one model alive and update it between rounds
    #[arg(long)]
    pub persistent: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Plain)]
    pub format: OutputFormat,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Plain,
    Json,
}

pub fn build_cli_command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        build_cli_command().debug_assert();
    }

    #[test]
    fn test_parse_solve_overrides() {
        let cli = Cli::try_parse_from([
            "gridexp",
            "--log-level",
            "debug",
            "solve",
            "elec.json",
            "-o",
            "elec_solved.json",
            "--formulation",
            "angles",
            "--persistent",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.log_level, tracing::Level::DEBUG);
        match cli.command {
            Commands::Solve(args) => {
                assert_eq!(args.network, PathBuf::from("elec.json"));
                assert_eq!(args.formulation.as_deref(), Some("angles"));
                assert!(args.persistent);
                assert!(args.config.is_none());
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_solve_requires_output() {
        assert!(Cli::try_parse_from(["gridexp", "solve", "elec.json"]).is_err());
    }
}
