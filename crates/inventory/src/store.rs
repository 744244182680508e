//! Inventory Store: authoritative quantities and catalog metadata.
//!
//! Every component lives behind its own mutex. All mutations of one component
//! are serialized through [`InventoryStore::transact`], which works on a staged
//! copy and only publishes it (and its journal entries) when the whole
//! transaction succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};

use labstock_core::{Aggregate, AggregateRoot, ComponentId, DomainError, DomainResult, ExpectedVersion};
use labstock_events::{EventEnvelope, Journal};

use crate::component::{
    AdjustStock, CatalogUpdate, Component, ComponentCommand, ComponentEvent, NewComponent,
    RegisterComponent, ReleaseStock, ReserveStock, SetActive, StockAudit, UpdateCatalog,
    WriteOffStock,
};
use crate::query::{ComponentQuery, Page, PageLimits};

pub const AGGREGATE_TYPE: &str = "inventory.component";

type ComponentCell = Arc<Mutex<Component>>;

/// Staged view of one component inside a [`InventoryStore::transact`] call.
///
/// Operations apply to the staged copy immediately, so later steps in the same
/// transaction observe earlier ones. Nothing is visible outside until commit.
#[derive(Debug)]
pub struct ComponentTx {
    staged: Component,
    pending: Vec<ComponentEvent>,
}

impl ComponentTx {
    pub fn component(&self) -> &Component {
        &self.staged
    }

    pub fn execute(&mut self, command: ComponentCommand) -> DomainResult<()> {
        let events = self.staged.execute(&command)?;
        self.pending.extend(events);
        Ok(())
    }

    pub fn reserve(&mut self, quantity: i64) -> DomainResult<()> {
        let component_id = self.staged.id_typed();
        self.execute(ComponentCommand::Reserve(ReserveStock {
            component_id,
            quantity,
            occurred_at: Utc::now(),
        }))
    }

    pub fn release(&mut self, quantity: i64) -> DomainResult<()> {
        let component_id = self.staged.id_typed();
        self.execute(ComponentCommand::Release(ReleaseStock {
            component_id,
            quantity,
            occurred_at: Utc::now(),
        }))
    }

    pub fn adjust_stock(&mut self, delta: i64, audit: StockAudit) -> DomainResult<()> {
        let component_id = self.staged.id_typed();
        self.execute(ComponentCommand::AdjustStock(AdjustStock {
            component_id,
            delta,
            audit,
            occurred_at: Utc::now(),
        }))
    }

    pub fn write_off(&mut self, quantity: i64, audit: StockAudit) -> DomainResult<()> {
        let component_id = self.staged.id_typed();
        self.execute(ComponentCommand::WriteOff(WriteOffStock {
            component_id,
            quantity,
            audit,
            occurred_at: Utc::now(),
        }))
    }
}

/// In-memory inventory store.
#[derive(Debug)]
pub struct InventoryStore {
    components: RwLock<HashMap<ComponentId, ComponentCell>>,
    /// part_number -> id. Locked after a component's own mutex, never before.
    part_numbers: Mutex<HashMap<String, ComponentId>>,
    journal: Journal<ComponentEvent>,
    limits: PageLimits,
}

impl Default for InventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryStore {
    pub fn new() -> Self {
        Self::with_page_limits(PageLimits::default())
    }

    pub fn with_page_limits(limits: PageLimits) -> Self {
        Self {
            components: RwLock::new(HashMap::new()),
            part_numbers: Mutex::new(HashMap::new()),
            journal: Journal::new(AGGREGATE_TYPE),
            limits,
        }
    }

    pub fn page_limits(&self) -> PageLimits {
        self.limits
    }

    fn cell(&self, id: ComponentId) -> DomainResult<ComponentCell> {
        self.components
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("component {id}")))
    }

    fn cells(&self) -> Vec<ComponentCell> {
        self.components.read().values().cloned().collect()
    }

    /// Run a serialized transaction against one component.
    ///
    /// `stage` mutates a staged copy; if it fails nothing changes. On success
    /// the staged events are journaled, the copy replaces the live record and
    /// `finish` runs with the committed state while the component is still
    /// locked, so callers can record dependent state atomically.
    pub fn transact<R, T>(
        &self,
        id: ComponentId,
        stage: impl FnOnce(&mut ComponentTx) -> DomainResult<R>,
        finish: impl FnOnce(R, &Component) -> T,
    ) -> DomainResult<T> {
        let cell = self.cell(id)?;
        let mut live = cell.lock();

        let mut tx = ComponentTx {
            staged: live.clone(),
            pending: Vec::new(),
        };
        let staged = stage(&mut tx)?;

        if !tx.pending.is_empty() {
            self.journal.append(
                *id.as_uuid(),
                tx.pending,
                ExpectedVersion::Exact(live.version()),
            )?;
            *live = tx.staged;
        }

        Ok(finish(staged, &live))
    }

    fn mutate(
        &self,
        id: ComponentId,
        stage: impl FnOnce(&mut ComponentTx) -> DomainResult<()>,
    ) -> DomainResult<Component> {
        self.transact(id, stage, |_, committed| committed.clone())
    }

    /// Register a new component with `quantity_reserved = 0`.
    pub fn create_component(&self, fields: NewComponent) -> DomainResult<Component> {
        self.register(ComponentId::new(), fields)
    }

    /// Register a component under a caller-chosen id.
    pub fn register(&self, id: ComponentId, fields: NewComponent) -> DomainResult<Component> {
        let mut index = self.part_numbers.lock();

        let part_number = fields.part_number.trim();
        if let Some(existing) = index.get(part_number) {
            return Err(DomainError::validation(format!(
                "part number '{part_number}' is already registered to component {existing}"
            )));
        }
        if self.components.read().contains_key(&id) {
            return Err(DomainError::conflict(format!("component {id} already exists")));
        }

        let mut component = Component::empty(id);
        let events = component.execute(&ComponentCommand::Register(RegisterComponent {
            component_id: id,
            fields,
            occurred_at: Utc::now(),
        }))?;
        self.journal
            .append(*id.as_uuid(), events, ExpectedVersion::Exact(0))?;

        self.components
            .write()
            .insert(id, Arc::new(Mutex::new(component.clone())));
        index.insert(component.part_number().to_string(), id);

        tracing::info!(
            component_id = %id,
            part_number = component.part_number(),
            quantity_on_hand = component.quantity_on_hand(),
            "component registered"
        );
        Ok(component)
    }

    /// Apply `delta` to quantity_on_hand, recording who did it.
    pub fn adjust_stock(
        &self,
        id: ComponentId,
        delta: i64,
        audit: StockAudit,
    ) -> DomainResult<Component> {
        let actor_id = audit.actor_id;
        let component = self.mutate(id, |tx| tx.adjust_stock(delta, audit))?;
        tracing::info!(
            component_id = %id,
            actor_id = ?actor_id,
            delta,
            quantity_on_hand = component.quantity_on_hand(),
            "stock adjusted"
        );
        Ok(component)
    }

    /// Increase quantity_reserved; fails fast when not enough is available.
    pub fn reserve(&self, id: ComponentId, quantity: i64) -> DomainResult<Component> {
        let component = self.mutate(id, |tx| tx.reserve(quantity))?;
        tracing::debug!(component_id = %id, quantity, available = component.available(), "stock reserved");
        Ok(component)
    }

    /// Decrease quantity_reserved.
    pub fn release(&self, id: ComponentId, quantity: i64) -> DomainResult<Component> {
        let component = self.mutate(id, |tx| tx.release(quantity))?;
        tracing::debug!(component_id = %id, quantity, available = component.available(), "stock released");
        Ok(component)
    }

    /// Remove reserved units from both on-hand and reserved counts.
    pub fn write_off(
        &self,
        id: ComponentId,
        quantity: i64,
        audit: StockAudit,
    ) -> DomainResult<Component> {
        let actor_id = audit.actor_id;
        let component = self.mutate(id, |tx| tx.write_off(quantity, audit))?;
        tracing::info!(
            component_id = %id,
            actor_id = ?actor_id,
            quantity,
            quantity_on_hand = component.quantity_on_hand(),
            "stock written off"
        );
        Ok(component)
    }

    /// Edit catalog metadata. A part number change keeps the index unique.
    pub fn update_catalog(
        &self,
        id: ComponentId,
        update: CatalogUpdate,
        expected: ExpectedVersion,
    ) -> DomainResult<Component> {
        self.transact(
            id,
            |tx| {
                expected.check(tx.component().version())?;
                let old_part_number = tx.component().part_number().to_string();

                tx.execute(ComponentCommand::UpdateCatalog(UpdateCatalog {
                    component_id: id,
                    update,
                    occurred_at: Utc::now(),
                }))?;

                let new_part_number = tx.component().part_number().to_string();
                if new_part_number == old_part_number {
                    return Ok(None);
                }

                // Held until `finish` so no registration can take the number in between.
                let index = self.part_numbers.lock();
                if let Some(existing) = index.get(&new_part_number) {
                    return Err(DomainError::validation(format!(
                        "part number '{new_part_number}' is already registered to component {existing}"
                    )));
                }
                Ok(Some((index, old_part_number)))
            },
            |renamed, committed| {
                if let Some((mut index, old_part_number)) = renamed {
                    index.remove(&old_part_number);
                    index.insert(committed.part_number().to_string(), id);
                }
                tracing::info!(component_id = %id, version = committed.version(), "catalog updated");
                committed.clone()
            },
        )
    }

    /// Soft-deactivate: the component stays referenced by its loans but takes
    /// no new reservations.
    pub fn deactivate(&self, id: ComponentId) -> DomainResult<Component> {
        self.set_active(id, false)
    }

    pub fn reactivate(&self, id: ComponentId) -> DomainResult<Component> {
        self.set_active(id, true)
    }

    fn set_active(&self, id: ComponentId, active: bool) -> DomainResult<Component> {
        let component = self.mutate(id, |tx| {
            tx.execute(ComponentCommand::SetActive(SetActive {
                component_id: id,
                active,
                occurred_at: Utc::now(),
            }))
        })?;
        tracing::info!(component_id = %id, active, "component activity changed");
        Ok(component)
    }

    pub fn get(&self, id: ComponentId) -> DomainResult<Component> {
        let cell = self.cell(id)?;
        let component = cell.lock().clone();
        Ok(component)
    }

    pub fn find_by_part_number(&self, part_number: &str) -> Option<Component> {
        let id = *self.part_numbers.lock().get(part_number.trim())?;
        self.get(id).ok()
    }

    /// Snapshot of every component, ordered by part number.
    pub fn all(&self) -> Vec<Component> {
        let mut all: Vec<Component> = self.cells().iter().map(|c| c.lock().clone()).collect();
        all.sort_by(|a, b| a.part_number().cmp(b.part_number()));
        all
    }

    /// Filtered, paginated listing ordered by part number.
    pub fn list(&self, query: &ComponentQuery) -> Page<Component> {
        let matching: Vec<Component> = self.all().into_iter().filter(|c| query.matches(c)).collect();
        Page::paginate(matching, query, self.limits)
    }

    /// Active components whose available quantity is at or below their threshold.
    pub fn low_stock_components(&self) -> Vec<Component> {
        self.all()
            .into_iter()
            .filter(|c| c.is_active() && c.is_low_stock())
            .collect()
    }

    /// Append-only movement history of one component, oldest first.
    pub fn history(&self, id: ComponentId) -> DomainResult<Vec<EventEnvelope<ComponentEvent>>> {
        self.cell(id)?;
        Ok(self.journal.load_stream(*id.as_uuid())?)
    }

    pub fn len(&self) -> usize {
        self.components.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::thread;

    use labstock_core::ActorId;

    use super::*;

    fn arduino(on_hand: i64) -> NewComponent {
        NewComponent::new("Arduino Uno R3", "ARD-UNO-R3", "Microcontrollers")
            .with_quantity(on_hand)
            .with_low_stock_threshold(5)
            .with_location("Shelf A1")
    }

    #[test]
    fn create_component_rejects_duplicate_part_number() {
        let store = InventoryStore::new();
        store.create_component(arduino(15)).unwrap();

        let dup = NewComponent::new("Other board", " ARD-UNO-R3 ", "Microcontrollers");
        let err = store.create_component(dup).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn create_component_rejects_negative_on_hand() {
        let store = InventoryStore::new();
        let err = store.create_component(arduino(-1)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(store.is_empty());
        assert!(store.find_by_part_number("ARD-UNO-R3").is_none());
    }

    #[test]
    fn unknown_component_is_not_found() {
        let store = InventoryStore::new();
        let id = ComponentId::new();
        assert!(matches!(
            store.adjust_stock(id, 1, StockAudit::default()),
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(store.reserve(id, 1), Err(DomainError::NotFound(_))));
        assert!(matches!(store.history(id), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn mutations_bump_updated_at_and_history() {
        let store = InventoryStore::new();
        let created = store.create_component(arduino(10)).unwrap();
        let id = created.id_typed();

        store.reserve(id, 4).unwrap();
        store.release(id, 1).unwrap();
        let after = store.adjust_stock(id, 5, StockAudit::default()).unwrap();

        assert!(after.updated_at() >= created.updated_at());
        assert_eq!(after.quantity_on_hand(), 15);
        assert_eq!(after.quantity_reserved(), 3);

        let history = store.history(id).unwrap();
        let types: Vec<&str> = history.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "inventory.component.registered",
                "inventory.component.stock_reserved",
                "inventory.component.stock_released",
                "inventory.component.stock_adjusted",
            ]
        );
        assert_eq!(history.last().unwrap().sequence_number(), after.version());
    }

    #[test]
    fn stock_history_records_actor_and_reason() {
        let store = InventoryStore::new();
        let id = store.create_component(arduino(10)).unwrap().id_typed();
        let admin = ActorId::new();

        store
            .adjust_stock(id, 6, StockAudit::by(admin).with_reason("recount after audit"))
            .unwrap();
        store.reserve(id, 2).unwrap();
        store
            .write_off(id, 2, StockAudit::by(admin).with_reason("burnt out on bench"))
            .unwrap();

        let history = store.history(id).unwrap();
        let adjusted = history
            .iter()
            .find_map(|e| match e.payload() {
                ComponentEvent::StockAdjusted(adjusted) => Some(adjusted),
                _ => None,
            })
            .unwrap();
        assert_eq!(adjusted.delta, 6);
        assert_eq!(adjusted.audit.actor_id, Some(admin));
        assert_eq!(adjusted.audit.reason.as_deref(), Some("recount after audit"));

        let written_off = history
            .iter()
            .find_map(|e| match e.payload() {
                ComponentEvent::StockWrittenOff(written_off) => Some(written_off),
                _ => None,
            })
            .unwrap();
        assert_eq!(written_off.quantity, 2);
        assert_eq!(written_off.on_hand_after, 14);
        assert_eq!(written_off.audit.actor_id, Some(admin));
        assert_eq!(written_off.audit.reason.as_deref(), Some("burnt out on bench"));
    }

    #[test]
    fn failed_transaction_leaves_component_untouched() {
        let store = InventoryStore::new();
        let id = store.create_component(arduino(10)).unwrap().id_typed();
        let before = store.get(id).unwrap();

        // The reserve succeeds on the staged copy, the release fails: nothing commits.
        let result = store.transact(
            id,
            |tx| {
                tx.reserve(3)?;
                tx.release(5)
            },
            |_, _| (),
        );
        assert!(matches!(result, Err(DomainError::InvalidState(_))));
        assert_eq!(store.get(id).unwrap(), before);
        assert_eq!(store.history(id).unwrap().len(), 1);
    }

    #[test]
    fn low_stock_components_use_available_quantity() {
        let store = InventoryStore::new();
        let board = store.create_component(arduino(8)).unwrap().id_typed();
        let led = store
            .create_component(
                NewComponent::new("LED Red 5mm", "LED-RED-5MM", "LEDs")
                    .with_quantity(3)
                    .with_low_stock_threshold(10),
            )
            .unwrap()
            .id_typed();

        let low: Vec<ComponentId> = store.low_stock_components().iter().map(|c| c.id_typed()).collect();
        assert_eq!(low, vec![led]);

        store.reserve(board, 3).unwrap();
        let low: Vec<ComponentId> = store.low_stock_components().iter().map(|c| c.id_typed()).collect();
        assert_eq!(low, vec![board, led]);

        store.deactivate(led).unwrap();
        let low: Vec<ComponentId> = store.low_stock_components().iter().map(|c| c.id_typed()).collect();
        assert_eq!(low, vec![board]);
    }

    #[test]
    fn update_catalog_checks_version_and_part_number_uniqueness() {
        let store = InventoryStore::new();
        let board = store.create_component(arduino(8)).unwrap();
        store
            .create_component(NewComponent::new("LED Red 5mm", "LED-RED-5MM", "LEDs"))
            .unwrap();

        let stale = store.update_catalog(
            board.id_typed(),
            CatalogUpdate {
                name: Some("Arduino Uno".to_string()),
                ..CatalogUpdate::default()
            },
            ExpectedVersion::Exact(board.version() + 1),
        );
        assert!(matches!(stale, Err(DomainError::Conflict(_))));

        let taken = store.update_catalog(
            board.id_typed(),
            CatalogUpdate {
                part_number: Some("LED-RED-5MM".to_string()),
                ..CatalogUpdate::default()
            },
            ExpectedVersion::Any,
        );
        assert!(matches!(taken, Err(DomainError::Validation(_))));
        assert_eq!(store.get(board.id_typed()).unwrap().part_number(), "ARD-UNO-R3");

        let renamed = store
            .update_catalog(
                board.id_typed(),
                CatalogUpdate {
                    part_number: Some("ARD-UNO-R4".to_string()),
                    ..CatalogUpdate::default()
                },
                ExpectedVersion::Exact(board.version()),
            )
            .unwrap();
        assert_eq!(renamed.part_number(), "ARD-UNO-R4");
        assert!(store.find_by_part_number("ARD-UNO-R3").is_none());
        assert_eq!(
            store.find_by_part_number("ARD-UNO-R4").unwrap().id_typed(),
            board.id_typed()
        );

        // The freed number can be registered again.
        store.create_component(arduino(1)).unwrap();
    }

    #[test]
    fn list_filters_and_orders_by_part_number() {
        let store = InventoryStore::new();
        store.create_component(arduino(15)).unwrap();
        store
            .create_component(
                NewComponent::new("Resistor 220 Ohm", "RES-220-1/4W", "Passive Components")
                    .with_quantity(100)
                    .with_low_stock_threshold(20),
            )
            .unwrap();
        store
            .create_component(
                NewComponent::new("LED Red 5mm", "LED-RED-5MM", "LEDs")
                    .with_quantity(3)
                    .with_low_stock_threshold(10),
            )
            .unwrap();

        let all = store.list(&ComponentQuery::default());
        let parts: Vec<&str> = all.items.iter().map(|c| c.part_number()).collect();
        assert_eq!(parts, vec!["ARD-UNO-R3", "LED-RED-5MM", "RES-220-1/4W"]);

        let leds = store.list(&ComponentQuery::in_category("leds"));
        assert_eq!(leds.total, 1);

        let search = store.list(&ComponentQuery {
            search: Some("resistor".to_string()),
            ..ComponentQuery::default()
        });
        assert_eq!(search.items[0].part_number(), "RES-220-1/4W");

        let low = store.list(&ComponentQuery::low_stock());
        assert_eq!(low.total, 1);
        assert_eq!(low.items[0].part_number(), "LED-RED-5MM");
    }

    #[test]
    fn concurrent_reservations_never_overallocate() {
        let store = Arc::new(InventoryStore::new());
        let id = store.create_component(arduino(10)).unwrap().id_typed();

        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let store = store.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    store.reserve(id, 1).is_ok()
                })
            })
            .collect();

        let granted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(granted, 10);
        let component = store.get(id).unwrap();
        assert_eq!(component.quantity_reserved(), 10);
        assert_eq!(component.available(), 0);
    }
}
