//! Bundled sample catalog for demo and first-run setups.

use labstock_core::{DomainError, DomainResult};
use labstock_inventory::{InventoryStore, NewComponent};

const SAMPLE_CATALOG: &str = include_str!("../data/sample_components.json");

pub fn sample_catalog() -> DomainResult<Vec<NewComponent>> {
    serde_json::from_str(SAMPLE_CATALOG)
        .map_err(|e| DomainError::validation(format!("bundled sample catalog is malformed: {e}")))
}

/// Register the sample catalog if the store is empty.
///
/// Returns the number of components registered; `0` when the store already
/// held data.
pub fn seed_sample_catalog(store: &InventoryStore) -> DomainResult<usize> {
    if !store.is_empty() {
        tracing::debug!(components = store.len(), "store already populated; skipping sample catalog");
        return Ok(0);
    }

    let catalog = sample_catalog()?;
    let count = catalog.len();
    for fields in catalog {
        store.create_component(fields)?;
    }

    tracing::info!(count, "sample catalog loaded");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_catalog_loads_once() {
        let store = InventoryStore::new();
        assert_eq!(seed_sample_catalog(&store).unwrap(), 3);
        assert_eq!(seed_sample_catalog(&store).unwrap(), 0);
        assert_eq!(store.len(), 3);

        let arduino = store.find_by_part_number("ARD-UNO-R3").unwrap();
        assert_eq!(arduino.quantity_on_hand(), 15);
        assert_eq!(arduino.unit_price(), Some(2599));
        assert_eq!(arduino.location(), Some("Shelf A1"));

        let low: Vec<String> = store
            .low_stock_components()
            .iter()
            .map(|c| c.part_number().to_string())
            .collect();
        assert_eq!(low, vec!["LED-RED-5MM".to_string()]);
    }
}
