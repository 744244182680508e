use anyhow::Context;

use labstock_service::{LabInventory, LabStockConfig, seed};

fn main() -> anyhow::Result<()> {
    let config = LabStockConfig::load().context("loading configuration")?;
    labstock_observability::init_with(&config.log);

    let lab = LabInventory::from_config(&config);

    if config.seed.sample_catalog {
        seed::seed_sample_catalog(lab.store()).context("seeding sample catalog")?;
    }

    let summary = lab.summary();
    tracing::info!(
        total_count = summary.total_count,
        low_stock_count = summary.low_stock_count,
        total_value = summary.total_value,
        "inventory ready"
    );

    for component in lab.store().low_stock_components() {
        tracing::warn!(
            part_number = component.part_number(),
            available = component.available(),
            threshold = component.low_stock_threshold(),
            location = component.location().unwrap_or("-"),
            "low stock"
        );
    }

    let discrepancies = lab.reconcile();
    anyhow::ensure!(
        discrepancies.is_empty(),
        "{} components have reservations that do not match their loans",
        discrepancies.len()
    );

    let health = lab.health();
    tracing::info!(status = health.status, service = health.service, "health check");
    Ok(())
}
