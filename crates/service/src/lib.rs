//! `labstock-service`: wiring for the electronics lab inventory.
//!
//! Composes the inventory store, the checkout ledger and authorization into
//! [`LabInventory`], and provides configuration loading and sample data.

pub mod config;
pub mod lab;
pub mod seed;

pub use config::{ConfigError, LabStockConfig};
pub use lab::{Health, InventorySummary, LabInventory, SERVICE_NAME};
