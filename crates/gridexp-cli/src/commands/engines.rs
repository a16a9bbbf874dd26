use std::io::{self, Write};

use anyhow::Result;
use gridexp_lopf::EngineRegistry;
use tabwriter::TabWriter;

pub fn handle() -> Result<()> {
    let registry = EngineRegistry::with_defaults();
    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "ENGINE\tAVAILABLE")?;
    for id in registry.list() {
        let available = registry.get(id).is_some_and(|e| e.is_available());
        writeln!(writer, "{}\t{}", id, if available { "yes" } else { "no" })?;
    }
    writer.flush()?;
    Ok(())
}
