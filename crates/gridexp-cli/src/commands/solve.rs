use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use gridexp_cli::cli::{OutputFormat, SolveArgs};
use gridexp_core::Network;
use gridexp_lopf::{
    prepare_network, solve_network, ArtifactPaths, EngineRegistry, ExpansionReport, LopfConfig,
};
use serde::Serialize;
use tabwriter::TabWriter;
use tracing::info;

/// JSON output for `solve --format json`
#[derive(Debug, Serialize)]
struct SolveOutput<'a> {
    network: String,
    formulation: &'a str,
    solver: &'a str,
    persistent: bool,
    solve_time_ms: f64,
    #[serde(flatten)]
    report: &'a ExpansionReport,
}

pub fn handle(args: &SolveArgs) -> Result<()> {
    let config = load_config(args)?;

    let mut network = Network::from_json_file(&args.network)
        .with_context(|| format!("reading network {}", args.network.display()))?;
    network
        .validate_references()
        .with_context(|| format!("validating network {}", args.network.display()))?;
    prepare_network(&mut network, &config.prepare).context("preparing network")?;

    let registry = Arc::new(EngineRegistry::with_defaults());
    let paths = ArtifactPaths::for_result(args.output.clone());
    let start = Instant::now();
    let report = solve_network(&mut network, &config, registry, paths)
        .with_context(|| format!("expanding {}", args.network.display()))?;
    let elapsed = start.elapsed();
    info!(
        iterations = report.iterations,
        converged = report.converged,
        elapsed_ms = elapsed.as_secs_f64() * 1000.0,
        "expansion finished"
    );

    match args.format {
        OutputFormat::Plain => print_summary(&report, elapsed),
        OutputFormat::Json => {
            let output = SolveOutput {
                network: network.name.clone(),
                formulation: &config.formulation,
                solver: &config.solver.name,
                persistent: config.session.persistent,
                solve_time_ms: elapsed.as_secs_f64() * 1000.0,
                report: &report,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

/// Config file (or defaults) with command line overrides applied.
fn load_config(args: &SolveArgs) -> Result<LopfConfig> {
    let mut config = match &args.config {
        Some(path) => LopfConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => LopfConfig::default(),
    };
    if let Some(solver) = &args.solver {
        config.solver.name = solver.clone();
    }
    if let Some(formulation) = &args.formulation {
        config.formulation = formulation.clone();
    }
    if args.persistent {
        config.session.persistent = true;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn print_summary(report: &ExpansionReport, elapsed: Duration) -> Result<()> {
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "Iterations\t{}", report.iterations)?;
    writeln!(writer, "Converged\t{}", if report.converged { "yes" } else { "no" })?;
    if let Some(last) = report.deviations.last() {
        writeln!(writer, "Last deviation\t{last:.6}")?;
    }
    writeln!(writer, "Status\t{} ({})", report.status, report.termination)?;
    match report.objective {
        Some(objective) => writeln!(writer, "Objective\t{objective:.4}")?,
        None => writeln!(writer, "Objective\t-")?,
    }
    writeln!(writer, "Removed lines\t{}", report.removed_lines.len())?;
    writeln!(writer, "Removed links\t{}", report.removed_links.len())?;
    writeln!(writer, "Result\t{}", report.result_path.display())?;
    writeln!(writer, "Elapsed\t{:.2}s", elapsed.as_secs_f64())?;
    writer.flush()?;
    Ok(())
}
