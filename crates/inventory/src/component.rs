use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labstock_core::{ActorId, Aggregate, AggregateRoot, ComponentId, DomainError};
use labstock_events::Event;

/// Catalog fields supplied when registering a component.
///
/// `unit_price` is in the smallest currency unit (cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComponent {
    pub name: String,
    pub part_number: String,
    pub category: String,
    #[serde(default)]
    pub quantity_on_hand: i64,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub unit_price: Option<u64>,
    #[serde(default)]
    pub low_stock_threshold: i64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub datasheet_url: Option<String>,
}

impl NewComponent {
    pub fn new(
        name: impl Into<String>,
        part_number: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            part_number: part_number.into(),
            category: category.into(),
            quantity_on_hand: 0,
            location: None,
            unit_price: None,
            low_stock_threshold: 0,
            description: None,
            manufacturer: None,
            datasheet_url: None,
        }
    }

    pub fn with_quantity(mut self, quantity_on_hand: i64) -> Self {
        self.quantity_on_hand = quantity_on_hand;
        self
    }

    pub fn with_low_stock_threshold(mut self, threshold: i64) -> Self {
        self.low_stock_threshold = threshold;
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_unit_price(mut self, cents: u64) -> Self {
        self.unit_price = Some(cents);
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    /// Validate and trim. Blank optional strings become `None`.
    fn normalized(&self) -> Result<Self, DomainError> {
        let name = required("name", &self.name)?;
        let part_number = required("part_number", &self.part_number)?;
        let category = required("category", &self.category)?;

        if self.quantity_on_hand < 0 {
            return Err(DomainError::validation("quantity_on_hand cannot be negative"));
        }
        if self.low_stock_threshold < 0 {
            return Err(DomainError::validation("low_stock_threshold cannot be negative"));
        }

        Ok(Self {
            name,
            part_number,
            category,
            quantity_on_hand: self.quantity_on_hand,
            location: optional(&self.location),
            unit_price: self.unit_price,
            low_stock_threshold: self.low_stock_threshold,
            description: optional(&self.description),
            manufacturer: optional(&self.manufacturer),
            datasheet_url: optional(&self.datasheet_url),
        })
    }
}

/// Partial catalog edit. `None` leaves a field untouched; for optional fields
/// `Some(None)` clears the value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub part_number: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub location: Option<Option<String>>,
    #[serde(default)]
    pub unit_price: Option<Option<u64>>,
    #[serde(default)]
    pub low_stock_threshold: Option<i64>,
    #[serde(default)]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub manufacturer: Option<Option<String>>,
    #[serde(default)]
    pub datasheet_url: Option<Option<String>>,
}

impl CatalogUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    fn normalized(&self) -> Result<Self, DomainError> {
        if self.is_empty() {
            return Err(DomainError::validation("catalog update contains no changes"));
        }
        if let Some(threshold) = self.low_stock_threshold {
            if threshold < 0 {
                return Err(DomainError::validation("low_stock_threshold cannot be negative"));
            }
        }

        Ok(Self {
            name: self.name.as_deref().map(|v| required("name", v)).transpose()?,
            part_number: self
                .part_number
                .as_deref()
                .map(|v| required("part_number", v))
                .transpose()?,
            category: self
                .category
                .as_deref()
                .map(|v| required("category", v))
                .transpose()?,
            location: self.location.as_ref().map(optional),
            unit_price: self.unit_price,
            low_stock_threshold: self.low_stock_threshold,
            description: self.description.as_ref().map(optional),
            manufacturer: self.manufacturer.as_ref().map(optional),
            datasheet_url: self.datasheet_url.as_ref().map(optional),
        })
    }
}

fn required(field: &str, value: &str) -> Result<String, DomainError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation(format!("{field} cannot be empty")));
    }
    Ok(trimmed.to_string())
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Who moved stock outside the lending flow, and why.
///
/// Carried on adjustments and write-offs so the movement history answers
/// "who changed this count" the way a stock transaction log does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAudit {
    #[serde(default)]
    pub actor_id: Option<ActorId>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl StockAudit {
    pub fn by(actor_id: ActorId) -> Self {
        Self {
            actor_id: Some(actor_id),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    fn normalized(&self) -> Self {
        Self {
            actor_id: self.actor_id,
            reason: optional(&self.reason),
        }
    }
}

/// Aggregate root: Component.
///
/// Invariant: `0 <= quantity_reserved <= quantity_on_hand`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    id: ComponentId,
    name: String,
    part_number: String,
    category: String,
    quantity_on_hand: i64,
    quantity_reserved: i64,
    location: Option<String>,
    unit_price: Option<u64>,
    low_stock_threshold: i64,
    description: Option<String>,
    manufacturer: Option<String>,
    datasheet_url: Option<String>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Component {
    /// Create an empty, not-yet-created aggregate instance.
    pub fn empty(id: ComponentId) -> Self {
        Self {
            id,
            name: String::new(),
            part_number: String::new(),
            category: String::new(),
            quantity_on_hand: 0,
            quantity_reserved: 0,
            location: None,
            unit_price: None,
            low_stock_threshold: 0,
            description: None,
            manufacturer: None,
            datasheet_url: None,
            active: false,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn part_number(&self) -> &str {
        &self.part_number
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn quantity_on_hand(&self) -> i64 {
        self.quantity_on_hand
    }

    pub fn quantity_reserved(&self) -> i64 {
        self.quantity_reserved
    }

    /// Units a new checkout can draw from.
    pub fn available(&self) -> i64 {
        self.quantity_on_hand - self.quantity_reserved
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn unit_price(&self) -> Option<u64> {
        self.unit_price
    }

    pub fn low_stock_threshold(&self) -> i64 {
        self.low_stock_threshold
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn manufacturer(&self) -> Option<&str> {
        self.manufacturer.as_deref()
    }

    pub fn datasheet_url(&self) -> Option<&str> {
        self.datasheet_url.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_low_stock(&self) -> bool {
        self.available() <= self.low_stock_threshold
    }

    /// Value of the stock on hand, in cents. `None` when unpriced.
    pub fn total_value(&self) -> Option<u64> {
        let on_hand = u64::try_from(self.quantity_on_hand).ok()?;
        self.unit_price.map(|price| price.saturating_mul(on_hand))
    }
}

impl AggregateRoot for Component {
    type Id = ComponentId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RegisterComponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterComponent {
    pub component_id: ComponentId,
    pub fields: NewComponent,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateCatalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCatalog {
    pub component_id: ComponentId,
    pub update: CatalogUpdate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdjustStock (receipts, counts, disposals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustStock {
    pub component_id: ComponentId,
    pub delta: i64,
    #[serde(default)]
    pub audit: StockAudit,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub component_id: ComponentId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub component_id: ComponentId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: WriteOffStock (removes reserved units from the shelf count).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOffStock {
    pub component_id: ComponentId,
    pub quantity: i64,
    #[serde(default)]
    pub audit: StockAudit,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetActive (soft deactivation / reactivation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetActive {
    pub component_id: ComponentId,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentCommand {
    Register(RegisterComponent),
    UpdateCatalog(UpdateCatalog),
    AdjustStock(AdjustStock),
    Reserve(ReserveStock),
    Release(ReleaseStock),
    WriteOff(WriteOffStock),
    SetActive(SetActive),
}

/// Event: ComponentRegistered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRegistered {
    pub component_id: ComponentId,
    pub fields: NewComponent,
    pub occurred_at: DateTime<Utc>,
}

/// Event: CatalogUpdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogUpdated {
    pub component_id: ComponentId,
    pub update: CatalogUpdate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockAdjusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjusted {
    pub component_id: ComponentId,
    pub delta: i64,
    pub on_hand_before: i64,
    pub on_hand_after: i64,
    #[serde(default)]
    pub audit: StockAudit,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub component_id: ComponentId,
    pub quantity: i64,
    pub reserved_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub component_id: ComponentId,
    pub quantity: i64,
    pub reserved_after: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockWrittenOff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockWrittenOff {
    pub component_id: ComponentId,
    pub quantity: i64,
    pub on_hand_after: i64,
    pub reserved_after: i64,
    #[serde(default)]
    pub audit: StockAudit,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ActivityChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityChanged {
    pub component_id: ComponentId,
    pub active: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentEvent {
    Registered(ComponentRegistered),
    CatalogUpdated(CatalogUpdated),
    StockAdjusted(StockAdjusted),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
    StockWrittenOff(StockWrittenOff),
    ActivityChanged(ActivityChanged),
}

impl Event for ComponentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ComponentEvent::Registered(_) => "inventory.component.registered",
            ComponentEvent::CatalogUpdated(_) => "inventory.component.catalog_updated",
            ComponentEvent::StockAdjusted(_) => "inventory.component.stock_adjusted",
            ComponentEvent::StockReserved(_) => "inventory.component.stock_reserved",
            ComponentEvent::StockReleased(_) => "inventory.component.stock_released",
            ComponentEvent::StockWrittenOff(_) => "inventory.component.stock_written_off",
            ComponentEvent::ActivityChanged(e) if e.active => "inventory.component.reactivated",
            ComponentEvent::ActivityChanged(_) => "inventory.component.deactivated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ComponentEvent::Registered(e) => e.occurred_at,
            ComponentEvent::CatalogUpdated(e) => e.occurred_at,
            ComponentEvent::StockAdjusted(e) => e.occurred_at,
            ComponentEvent::StockReserved(e) => e.occurred_at,
            ComponentEvent::StockReleased(e) => e.occurred_at,
            ComponentEvent::StockWrittenOff(e) => e.occurred_at,
            ComponentEvent::ActivityChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Component {
    type Command = ComponentCommand;
    type Event = ComponentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ComponentEvent::Registered(e) => {
                let f = &e.fields;
                self.id = e.component_id;
                self.name = f.name.clone();
                self.part_number = f.part_number.clone();
                self.category = f.category.clone();
                self.quantity_on_hand = f.quantity_on_hand;
                self.quantity_reserved = 0;
                self.location = f.location.clone();
                self.unit_price = f.unit_price;
                self.low_stock_threshold = f.low_stock_threshold;
                self.description = f.description.clone();
                self.manufacturer = f.manufacturer.clone();
                self.datasheet_url = f.datasheet_url.clone();
                self.active = true;
                self.created_at = e.occurred_at;
                self.created = true;
            }
            ComponentEvent::CatalogUpdated(e) => {
                let u = &e.update;
                if let Some(v) = &u.name {
                    self.name = v.clone();
                }
                if let Some(v) = &u.part_number {
                    self.part_number = v.clone();
                }
                if let Some(v) = &u.category {
                    self.category = v.clone();
                }
                if let Some(v) = &u.location {
                    self.location = v.clone();
                }
                if let Some(v) = u.unit_price {
                    self.unit_price = v;
                }
                if let Some(v) = u.low_stock_threshold {
                    self.low_stock_threshold = v;
                }
                if let Some(v) = &u.description {
                    self.description = v.clone();
                }
                if let Some(v) = &u.manufacturer {
                    self.manufacturer = v.clone();
                }
                if let Some(v) = &u.datasheet_url {
                    self.datasheet_url = v.clone();
                }
            }
            ComponentEvent::StockAdjusted(e) => {
                self.quantity_on_hand += e.delta;
            }
            ComponentEvent::StockReserved(e) => {
                self.quantity_reserved += e.quantity;
            }
            ComponentEvent::StockReleased(e) => {
                self.quantity_reserved -= e.quantity;
            }
            ComponentEvent::StockWrittenOff(e) => {
                self.quantity_on_hand -= e.quantity;
                self.quantity_reserved -= e.quantity;
            }
            ComponentEvent::ActivityChanged(e) => {
                self.active = e.active;
            }
        }

        self.updated_at = event.occurred_at();
        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ComponentCommand::Register(cmd) => self.handle_register(cmd),
            ComponentCommand::UpdateCatalog(cmd) => self.handle_update(cmd),
            ComponentCommand::AdjustStock(cmd) => self.handle_adjust(cmd),
            ComponentCommand::Reserve(cmd) => self.handle_reserve(cmd),
            ComponentCommand::Release(cmd) => self.handle_release(cmd),
            ComponentCommand::WriteOff(cmd) => self.handle_write_off(cmd),
            ComponentCommand::SetActive(cmd) => self.handle_set_active(cmd),
        }
    }
}

impl Component {
    fn ensure_exists(&self, component_id: ComponentId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("component {component_id}")));
        }
        if self.id != component_id {
            return Err(DomainError::invalid_state("component_id mismatch"));
        }
        Ok(())
    }

    fn ensure_positive(what: &str, quantity: i64) -> Result<(), DomainError> {
        if quantity <= 0 {
            return Err(DomainError::validation(format!(
                "{what} quantity must be positive (got {quantity})"
            )));
        }
        Ok(())
    }

    fn handle_register(&self, cmd: &RegisterComponent) -> Result<Vec<ComponentEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("component already exists"));
        }
        let fields = cmd.fields.normalized()?;
        Ok(vec![ComponentEvent::Registered(ComponentRegistered {
            component_id: cmd.component_id,
            fields,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateCatalog) -> Result<Vec<ComponentEvent>, DomainError> {
        self.ensure_exists(cmd.component_id)?;
        let update = cmd.update.normalized()?;
        Ok(vec![ComponentEvent::CatalogUpdated(CatalogUpdated {
            component_id: cmd.component_id,
            update,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_adjust(&self, cmd: &AdjustStock) -> Result<Vec<ComponentEvent>, DomainError> {
        self.ensure_exists(cmd.component_id)?;

        if cmd.delta == 0 {
            return Err(DomainError::validation("delta cannot be zero"));
        }

        let new_on_hand = self
            .quantity_on_hand
            .checked_add(cmd.delta)
            .ok_or_else(|| DomainError::validation("delta overflows quantity_on_hand"))?;
        if new_on_hand < self.quantity_reserved {
            return Err(DomainError::invalid_state(format!(
                "adjusting by {} would leave {} on hand below {} reserved",
                cmd.delta, new_on_hand, self.quantity_reserved
            )));
        }

        Ok(vec![ComponentEvent::StockAdjusted(StockAdjusted {
            component_id: cmd.component_id,
            delta: cmd.delta,
            on_hand_before: self.quantity_on_hand,
            on_hand_after: new_on_hand,
            audit: cmd.audit.normalized(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<ComponentEvent>, DomainError> {
        self.ensure_exists(cmd.component_id)?;
        Self::ensure_positive("reserve", cmd.quantity)?;

        if !self.active {
            return Err(DomainError::validation(format!(
                "component {} is deactivated",
                self.part_number
            )));
        }
        if self.available() < cmd.quantity {
            return Err(DomainError::insufficient_stock(cmd.quantity, self.available()));
        }

        Ok(vec![ComponentEvent::StockReserved(StockReserved {
            component_id: cmd.component_id,
            quantity: cmd.quantity,
            reserved_after: self.quantity_reserved + cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<ComponentEvent>, DomainError> {
        self.ensure_exists(cmd.component_id)?;
        Self::ensure_positive("release", cmd.quantity)?;

        if cmd.quantity > self.quantity_reserved {
            return Err(DomainError::invalid_state(format!(
                "cannot release {}: only {} reserved",
                cmd.quantity, self.quantity_reserved
            )));
        }

        Ok(vec![ComponentEvent::StockReleased(StockReleased {
            component_id: cmd.component_id,
            quantity: cmd.quantity,
            reserved_after: self.quantity_reserved - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_write_off(&self, cmd: &WriteOffStock) -> Result<Vec<ComponentEvent>, DomainError> {
        self.ensure_exists(cmd.component_id)?;
        Self::ensure_positive("write-off", cmd.quantity)?;

        if cmd.quantity > self.quantity_reserved {
            return Err(DomainError::invalid_state(format!(
                "cannot write off {}: only {} reserved",
                cmd.quantity, self.quantity_reserved
            )));
        }

        Ok(vec![ComponentEvent::StockWrittenOff(StockWrittenOff {
            component_id: cmd.component_id,
            quantity: cmd.quantity,
            on_hand_after: self.quantity_on_hand - cmd.quantity,
            reserved_after: self.quantity_reserved - cmd.quantity,
            audit: cmd.audit.normalized(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_active(&self, cmd: &SetActive) -> Result<Vec<ComponentEvent>, DomainError> {
        self.ensure_exists(cmd.component_id)?;

        if self.active == cmd.active {
            let state = if cmd.active { "active" } else { "deactivated" };
            return Err(DomainError::invalid_state(format!(
                "component {} is already {state}",
                self.part_number
            )));
        }

        Ok(vec![ComponentEvent::ActivityChanged(ActivityChanged {
            component_id: cmd.component_id,
            active: cmd.active,
            occurred_at: cmd.occurred_at,
        })])
    }
}
