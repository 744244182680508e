//! Inventory domain module: components and their stock quantities.
//!
//! `component` holds the business rules as deterministic domain logic (no IO);
//! `store` serializes access per component and keeps the movement history.

pub mod component;
pub mod query;
pub mod store;

pub use component::{
    AdjustStock, CatalogUpdate, Component, ComponentCommand, ComponentEvent, NewComponent,
    RegisterComponent, ReleaseStock, ReserveStock, SetActive, StockAdjusted, StockAudit,
    StockWrittenOff, UpdateCatalog, WriteOffStock,
};
pub use query::{ComponentQuery, Page, PageLimits};
pub use store::{ComponentTx, InventoryStore};
