//! `LabInventory`: the application-facing facade.
//!
//! Owns the inventory store and the checkout ledger, and enforces catalog
//! permissions before delegating. Lending operations carry their own checks
//! inside the ledger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use labstock_auth::{Actor, authorize, permissions};
use labstock_core::{ActorId, ComponentId, DomainResult, ExpectedVersion, LoanId};
use labstock_events::EventEnvelope;
use labstock_inventory::{
    CatalogUpdate, Component, ComponentEvent, ComponentQuery, InventoryStore, NewComponent, Page,
    PageLimits, StockAudit,
};
use labstock_lending::{CheckOut, Checkout, CheckoutLedger, Discrepancy, LendingPolicy, Loan};

use crate::config::LabStockConfig;

pub const SERVICE_NAME: &str = "Electronics Lab Inventory LIMS";

/// Catalog-wide figures for dashboards and the listing header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub total_count: usize,
    pub active_count: usize,
    pub low_stock_count: usize,
    pub total_on_hand: i64,
    pub total_reserved: i64,
    /// Sum of priced stock, in cents.
    pub total_value: u64,
    pub open_loans: usize,
    pub overdue_loans: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub service: &'static str,
}

#[derive(Debug)]
pub struct LabInventory {
    store: Arc<InventoryStore>,
    ledger: CheckoutLedger,
}

impl Default for LabInventory {
    fn default() -> Self {
        Self::new(LendingPolicy::default(), PageLimits::default())
    }
}

impl LabInventory {
    pub fn new(policy: LendingPolicy, limits: PageLimits) -> Self {
        let store = Arc::new(InventoryStore::with_page_limits(limits));
        let ledger = CheckoutLedger::with_policy(store.clone(), policy);
        Self { store, ledger }
    }

    pub fn from_config(config: &LabStockConfig) -> Self {
        Self::new(config.lending.policy(), config.pagination)
    }

    pub fn store(&self) -> &InventoryStore {
        &self.store
    }

    pub fn ledger(&self) -> &CheckoutLedger {
        &self.ledger
    }

    // Catalog administration.

    pub fn create_component(&self, actor: &Actor, fields: NewComponent) -> DomainResult<Component> {
        authorize(actor, &permissions::CATALOG_WRITE)?;
        self.store.create_component(fields)
    }

    pub fn update_component(
        &self,
        actor: &Actor,
        id: ComponentId,
        update: CatalogUpdate,
        expected: ExpectedVersion,
    ) -> DomainResult<Component> {
        authorize(actor, &permissions::CATALOG_WRITE)?;
        self.store.update_catalog(id, update, expected)
    }

    /// Receive stock (positive delta) or correct a count (negative delta).
    pub fn adjust_stock(
        &self,
        actor: &Actor,
        id: ComponentId,
        delta: i64,
        reason: Option<&str>,
    ) -> DomainResult<Component> {
        authorize(actor, &permissions::CATALOG_WRITE)?;
        let audit = StockAudit {
            actor_id: Some(actor.id),
            reason: reason.map(str::to_string),
        };
        self.store.adjust_stock(id, delta, audit)
    }

    pub fn deactivate_component(&self, actor: &Actor, id: ComponentId) -> DomainResult<Component> {
        authorize(actor, &permissions::CATALOG_WRITE)?;
        self.store.deactivate(id)
    }

    pub fn reactivate_component(&self, actor: &Actor, id: ComponentId) -> DomainResult<Component> {
        authorize(actor, &permissions::CATALOG_WRITE)?;
        self.store.reactivate(id)
    }

    // Catalog reads.

    pub fn component(&self, actor: &Actor, id: ComponentId) -> DomainResult<Component> {
        authorize(actor, &permissions::CATALOG_READ)?;
        self.store.get(id)
    }

    pub fn list_components(&self, actor: &Actor, query: &ComponentQuery) -> DomainResult<Page<Component>> {
        authorize(actor, &permissions::CATALOG_READ)?;
        Ok(self.store.list(query))
    }

    pub fn low_stock(&self, actor: &Actor) -> DomainResult<Vec<Component>> {
        authorize(actor, &permissions::CATALOG_READ)?;
        Ok(self.store.low_stock_components())
    }

    pub fn component_history(
        &self,
        actor: &Actor,
        id: ComponentId,
    ) -> DomainResult<Vec<EventEnvelope<ComponentEvent>>> {
        authorize(actor, &permissions::CATALOG_READ)?;
        self.store.history(id)
    }

    // Lending.

    pub fn check_out(&self, actor: &Actor, request: CheckOut) -> DomainResult<Checkout> {
        self.ledger.check_out(actor, request)
    }

    pub fn check_in(&self, actor: &Actor, loan_id: LoanId, quantity: i64) -> DomainResult<Loan> {
        self.ledger.check_in(actor, loan_id, quantity)
    }

    pub fn mark_lost(&self, actor: &Actor, loan_id: LoanId) -> DomainResult<Loan> {
        self.ledger.mark_lost(actor, loan_id)
    }

    pub fn write_off(&self, actor: &Actor, id: ComponentId, quantity: i64) -> DomainResult<Component> {
        self.ledger.write_off(actor, id, quantity)
    }

    /// A borrower's loans. Students only see their own.
    pub fn loans_for(&self, actor: &Actor, borrower_id: ActorId) -> DomainResult<Vec<Loan>> {
        if !actor.is(borrower_id) {
            authorize(actor, &permissions::CHECKOUT_ANY)?;
        }
        Ok(self.ledger.loans_for_borrower(borrower_id))
    }

    pub fn overdue_loans(&self, actor: &Actor, now: DateTime<Utc>) -> DomainResult<Vec<Loan>> {
        authorize(actor, &permissions::CHECKOUT_ANY)?;
        Ok(self.ledger.overdue_loans(now))
    }

    pub fn reconcile(&self) -> Vec<Discrepancy> {
        self.ledger.reconcile()
    }

    pub fn summary(&self) -> InventorySummary {
        let components = self.store.all();
        let now = Utc::now();

        InventorySummary {
            total_count: components.len(),
            active_count: components.iter().filter(|c| c.is_active()).count(),
            low_stock_count: components
                .iter()
                .filter(|c| c.is_active() && c.is_low_stock())
                .count(),
            total_on_hand: components
                .iter()
                .map(Component::quantity_on_hand)
                .fold(0i64, i64::saturating_add),
            total_reserved: components
                .iter()
                .map(Component::quantity_reserved)
                .fold(0i64, i64::saturating_add),
            total_value: components
                .iter()
                .filter_map(Component::total_value)
                .fold(0u64, u64::saturating_add),
            open_loans: self.ledger.open_loans().len(),
            overdue_loans: self.ledger.overdue_loans(now).len(),
        }
    }

    pub fn health(&self) -> Health {
        Health {
            status: "healthy",
            timestamp: Utc::now(),
            service: SERVICE_NAME,
        }
    }
}
