//! `ssp-bridge plugins`: list registered sources in probe order.

use anyhow::Result;
use serde::Serialize;
use ssp_telemetry_adapters::{PluginEntry, registered_plugins};

#[derive(Debug, Serialize)]
struct PluginRow {
    id: &'static str,
    name: &'static str,
}

impl From<&PluginEntry> for PluginRow {
    fn from(entry: &PluginEntry) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
        }
    }
}

pub fn execute(json: bool) -> Result<()> {
    print!("{}", render(registered_plugins(), json)?);
    Ok(())
}

fn render(entries: &[PluginEntry], json: bool) -> Result<String> {
    let rows: Vec<PluginRow> = entries.iter().map(PluginRow::from).collect();
    if json {
        let mut text = serde_json::to_string_pretty(&rows)?;
        text.push('\n');
        return Ok(text);
    }

    let width = rows.iter().map(|row| row.id.len()).max().unwrap_or(0);
    Ok(rows
        .iter()
        .map(|row| format!("{:<width$}  {}\n", row.id, row.name))
        .collect())
}
