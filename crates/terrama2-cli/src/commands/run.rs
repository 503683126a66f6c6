//! Run command implementation

use anyhow::{Context, Result};
use std::sync::Arc;
use terrama2_collector::{CollectorService, Factory, ServiceConfig};
use terrama2_core::config::LayeredConfig;
use terrama2_store::{Catalog, MemoryDataManager};

use crate::cli::CatalogArgs;
use crate::output::OutputWriter;

pub async fn execute(args: CatalogArgs, config: &LayeredConfig, output: &OutputWriter) -> Result<()> {
    let catalog = Catalog::load(&args.catalog)
        .with_context(|| format!("Failed to load catalog {}", args.catalog.display()))?;

    let service_config = ServiceConfig::from(config);
    tracing::info!(
        catalog = %args.catalog.display(),
        download_dir = %service_config.download_dir.display(),
        "Starting collector service"
    );
    let manager = MemoryDataManager::new();
    let factory = Arc::new(Factory::new(&service_config.download_dir));
    let service = CollectorService::new(Arc::new(manager.clone()), factory, service_config);

    // registered after the service subscribed, so it learns about them through events
    let summary = catalog.register(&manager).context("Failed to register catalog")?;
    output.success(format!(
        "Loaded {} providers and {} datasets ({} scheduled)",
        summary.providers,
        summary.datasets,
        service.timer_count()
    ));

    service.start()?;
    output.info("Collector service running, press Ctrl-C to stop");

    let signal = tokio::signal::ctrl_c().await;
    output.info("Shutting down");
    service.stop().await;
    signal.context("Failed to listen for the shutdown signal")?;

    output.success("Collector service stopped");
    Ok(())
}
