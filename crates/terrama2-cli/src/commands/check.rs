//! Check command implementation

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tabled::Tabled;
use terrama2_collector::{Factory, Mask, TimerMode};
use terrama2_core::config::LayeredConfig;
use terrama2_core::models::{DataProvider, DataSet};
use terrama2_core::ports::DataManager;
use terrama2_store::{Catalog, MemoryDataManager};

use crate::cli::CatalogArgs;
use crate::output::OutputWriter;

#[derive(Debug, Serialize)]
struct DatasetCheck {
    id: u64,
    name: String,
    provider: String,
    kind: String,
    schedule: Option<String>,
    items: usize,
    state: CheckState,
    issues: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum CheckState {
    Ok,
    Inactive,
    Invalid,
}

#[derive(Debug, Serialize)]
struct CheckOutput {
    providers: usize,
    datasets: usize,
    invalid: usize,
    checks: Vec<DatasetCheck>,
}

pub fn execute(args: CatalogArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog.display()))?;

    let manager = MemoryDataManager::new();
    let summary = catalog.register(&manager).context("Failed to register catalog")?;
    let factory = Factory::new(&config.download_dir.value);

    let checks: Vec<DatasetCheck> = manager
        .providers()
        .iter()
        .flat_map(|provider| {
            provider
                .datasets
                .iter()
                .map(|dataset| check_dataset(&factory, provider, dataset))
                .collect::<Vec<_>>()
        })
        .collect();
    let invalid = checks.iter().filter(|c| c.state == CheckState::Invalid).count();

    if output.is_json() {
        output.result(CheckOutput {
            providers: summary.providers,
            datasets: summary.datasets,
            invalid,
            checks,
        })?;
    } else {
        output.section("Datasets");

        #[derive(Tabled)]
        struct DatasetRow {
            #[tabled(rename = "ID")]
            id: u64,
            #[tabled(rename = "Dataset")]
            name: String,
            #[tabled(rename = "Provider")]
            provider: String,
            #[tabled(rename = "Kind")]
            kind: String,
            #[tabled(rename = "Schedule")]
            schedule: String,
            #[tabled(rename = "Items")]
            items: usize,
            #[tabled(rename = "State")]
            state: String,
        }

        for check in &checks {
            for issue in &check.issues {
                output.warning(format!("{}: {}", check.name, issue));
            }
        }

        let rows = checks
            .into_iter()
            .map(|c| DatasetRow {
                id: c.id,
                name: c.name,
                provider: c.provider,
                kind: c.kind,
                schedule: c.schedule.unwrap_or_else(|| "-".to_string()),
                items: c.items,
                state: format!("{:?}", c.state).to_lowercase(),
            })
            .collect();
        output.table::<DatasetRow>(rows);

        output.kv("Providers", summary.providers);
        output.kv("Datasets", summary.datasets);
    }

    if invalid > 0 {
        bail!("{} of {} datasets cannot be scheduled", invalid, summary.datasets);
    }
    if !output.is_json() {
        output.success("Catalog is valid");
    }
    Ok(())
}

fn check_dataset(factory: &Factory, provider: &DataProvider, dataset: &DataSet) -> DatasetCheck {
    let mut issues = Vec::new();

    let schedule = match TimerMode::from_dataset(dataset) {
        Ok(mode) => Some(mode.to_string()),
        Err(e) => {
            issues.push(e.to_string());
            None
        }
    };
    if !factory.supports(provider.kind) {
        issues.push(format!("no retriever for {} providers", provider.kind));
    }
    for item in &dataset.items {
        if let Err(e) = Mask::parse(&item.mask) {
            issues.push(format!("item {}: {}", item.id, e));
        }
    }

    let state = if !provider.is_active() || !dataset.is_active() {
        CheckState::Inactive
    } else if issues.is_empty() {
        CheckState::Ok
    } else {
        CheckState::Invalid
    };

    DatasetCheck {
        id: dataset.id().0,
        name: dataset.name.clone(),
        provider: provider.name.clone(),
        kind: provider.kind.to_string(),
        schedule,
        items: dataset.items.len(),
        state,
        issues,
    }
}
