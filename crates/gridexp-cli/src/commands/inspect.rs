use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use gridexp_core::Network;
use tabwriter::TabWriter;

pub fn handle(path: &Path) -> Result<()> {
    let network = Network::from_json_file(path)
        .with_context(|| format!("reading network {}", path.display()))?;
    let stats = network.stats();

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "Network\t{}", network.name)?;
    writeln!(writer, "Buses\t{}", stats.num_buses)?;
    writeln!(
        writer,
        "Lines\t{} ({} extendable)",
        stats.num_lines, stats.num_extendable_lines
    )?;
    writeln!(
        writer,
        "Links\t{} ({} extendable)",
        stats.num_links, stats.num_extendable_links
    )?;
    writeln!(writer, "Generators\t{}", stats.num_generators)?;
    writeln!(writer, "Storage units\t{}", stats.num_storage_units)?;
    writeln!(writer, "Snapshots\t{}", stats.num_snapshots)?;
    writeln!(writer, "Energy demand\t{:.1} MWh", stats.total_energy_demand)?;
    writer.flush()?;

    if let Err(err) = network.validate_references() {
        writeln!(io::stdout(), "Validation\t{err}")?;
    }
    Ok(())
}
