//! Config command implementation

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeMap;
use tabled::Tabled;
use terrama2_core::config::LayeredConfig;

use crate::output::OutputWriter;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    value: String,
    source: String,
}

pub fn execute(config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let entries: BTreeMap<String, ConfigEntry> = config
        .to_inspection_map()
        .into_iter()
        .map(|(key, (value, source))| {
            (
                key,
                ConfigEntry {
                    value,
                    source: format!("{:?}", source),
                },
            )
        })
        .collect();

    if output.is_json() {
        return output.result(entries);
    }

    output.section("Configuration Values");

    #[derive(Tabled)]
    struct ConfigRow {
        #[tabled(rename = "Key")]
        key: String,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows = entries
        .into_iter()
        .map(|(key, entry)| ConfigRow {
            key,
            value: entry.value,
            source: entry.source,
        })
        .collect();
    output.table::<ConfigRow>(rows);
    Ok(())
}
