//! Checkout Ledger: loan records and the reserve/release protocol.
//!
//! Every loan mutation runs inside [`InventoryStore::transact`] for the loan's
//! component, so the stock movement and the loan record commit together and
//! operations on one component are totally ordered.
//!
//! Invariant maintained per component:
//! `quantity_reserved == sum(open loan quantities) + lost units awaiting write-off`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use labstock_auth::{Actor, CommandAuthorization, Permission, authorize, authorize_all, permissions};
use labstock_core::{
    ActorId, Aggregate, AggregateRoot, ComponentId, DomainError, DomainResult, ExpectedVersion, LoanId,
};
use labstock_events::{EventEnvelope, Journal};
use labstock_inventory::{Component, InventoryStore, StockAudit};

use crate::loan::{Loan, LoanCommand, LoanEvent, MarkLost, OpenLoan, ReturnItems};

pub const AGGREGATE_TYPE: &str = "lending.loan";

/// Lending rules applied on checkout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LendingPolicy {
    /// Upper bound on units per loan; `None` means unbounded.
    pub max_quantity_per_loan: Option<i64>,
    /// Due date applied when a checkout gives none.
    pub default_loan_period: Option<Duration>,
}

/// Request: check out `quantity` units of a component to a borrower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOut {
    pub component_id: ComponentId,
    pub borrower_id: ActorId,
    pub quantity: i64,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
}

impl CheckOut {
    pub fn new(component_id: ComponentId, borrower_id: ActorId, quantity: i64) -> Self {
        Self {
            component_id,
            borrower_id,
            quantity,
            due_at: None,
        }
    }

    pub fn due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }
}

impl CommandAuthorization for CheckOut {
    fn required_permissions(&self, actor: &Actor) -> Vec<Permission> {
        if actor.is(self.borrower_id) {
            vec![permissions::CHECKOUT_SELF]
        } else {
            vec![permissions::CHECKOUT_ANY]
        }
    }
}

struct ReturnOf<'a>(&'a Loan);

impl CommandAuthorization for ReturnOf<'_> {
    fn required_permissions(&self, actor: &Actor) -> Vec<Permission> {
        if actor.is(self.0.borrower_id()) {
            vec![permissions::RETURN_SELF]
        } else {
            vec![permissions::RETURN_ANY]
        }
    }
}

/// A component whose reservation count disagrees with its loans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Discrepancy {
    pub component_id: ComponentId,
    pub part_number: String,
    pub quantity_reserved: i64,
    pub open_loan_quantity: i64,
    pub lost_awaiting_write_off: i64,
}

/// Outcome of a checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Checkout {
    pub loan: Loan,
    pub available_after: i64,
}

#[derive(Debug)]
pub struct CheckoutLedger {
    store: Arc<InventoryStore>,
    /// Written only while the loan's component is locked.
    loans: RwLock<HashMap<LoanId, Loan>>,
    /// Lost units per component not yet written off. Same locking rule as `loans`.
    lost_pending: Mutex<HashMap<ComponentId, i64>>,
    journal: Journal<LoanEvent>,
    policy: LendingPolicy,
}

impl CheckoutLedger {
    pub fn new(store: Arc<InventoryStore>) -> Self {
        Self::with_policy(store, LendingPolicy::default())
    }

    pub fn with_policy(store: Arc<InventoryStore>, policy: LendingPolicy) -> Self {
        Self {
            store,
            loans: RwLock::new(HashMap::new()),
            lost_pending: Mutex::new(HashMap::new()),
            journal: Journal::new(AGGREGATE_TYPE),
            policy,
        }
    }

    pub fn store(&self) -> &Arc<InventoryStore> {
        &self.store
    }

    pub fn policy(&self) -> LendingPolicy {
        self.policy
    }

    /// Reserve stock and open a loan in one step.
    ///
    /// Either both happen or neither does: a failed reservation leaves no loan
    /// behind and a rejected loan leaves no reservation.
    pub fn check_out(&self, actor: &Actor, request: CheckOut) -> DomainResult<Checkout> {
        let result = self.try_check_out(actor, &request);
        match &result {
            Ok(checkout) => tracing::info!(
                loan_id = %checkout.loan.id_typed(),
                component_id = %request.component_id,
                borrower_id = %request.borrower_id,
                actor_id = %actor.id,
                quantity = request.quantity,
                available = checkout.available_after,
                "component checked out"
            ),
            Err(err) => log_rejection("check_out", err),
        }
        result
    }

    fn try_check_out(&self, actor: &Actor, request: &CheckOut) -> DomainResult<Checkout> {
        authorize_all(actor, request)?;

        if request.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "checkout quantity must be positive (got {})",
                request.quantity
            )));
        }
        if let Some(max) = self.policy.max_quantity_per_loan {
            if request.quantity > max {
                return Err(DomainError::validation(format!(
                    "checkout quantity {} exceeds the per-loan limit of {max}",
                    request.quantity
                )));
            }
        }

        let now = Utc::now();
        let due_at = match (request.due_at, self.policy.default_loan_period) {
            (Some(due_at), _) => Some(due_at),
            (None, Some(period)) => Some(now.checked_add_signed(period).ok_or_else(|| {
                DomainError::validation("default loan period is out of range for a due date")
            })?),
            (None, None) => None,
        };
        let loan_id = LoanId::new();

        self.store.transact(
            request.component_id,
            |tx| {
                let mut loan = Loan::empty(loan_id);
                let events = loan.execute(&LoanCommand::Open(OpenLoan {
                    loan_id,
                    component_id: request.component_id,
                    borrower_id: request.borrower_id,
                    checked_out_by: actor.id,
                    quantity: request.quantity,
                    due_at,
                    occurred_at: now,
                }))?;
                tx.reserve(request.quantity)?;
                Ok((loan, events))
            },
            |(loan, events), component| {
                self.commit(&loan, events);
                Checkout {
                    loan,
                    available_after: component.available(),
                }
            },
        )
    }

    /// Return all or part of a loan. The loan closes when nothing remains out.
    pub fn check_in(&self, actor: &Actor, loan_id: LoanId, quantity: i64) -> DomainResult<Loan> {
        let result = self.try_check_in(actor, loan_id, quantity);
        match &result {
            Ok(loan) => tracing::info!(
                loan_id = %loan_id,
                component_id = %loan.component_id(),
                actor_id = %actor.id,
                quantity,
                remaining = loan.quantity(),
                status = ?loan.status(),
                "component checked in"
            ),
            Err(err) => log_rejection("check_in", err),
        }
        result
    }

    fn try_check_in(&self, actor: &Actor, loan_id: LoanId, quantity: i64) -> DomainResult<Loan> {
        let snapshot = self.loan(loan_id)?;
        authorize_all(actor, &ReturnOf(&snapshot))?;

        self.store.transact(
            snapshot.component_id(),
            |tx| {
                // Re-read under the component lock; the snapshot may be stale.
                let mut loan = self.loan(loan_id)?;
                let events = loan.execute(&LoanCommand::Return(ReturnItems {
                    loan_id,
                    quantity,
                    occurred_at: Utc::now(),
                }))?;
                tx.release(quantity)?;
                Ok((loan, events))
            },
            |(loan, events), _| {
                self.commit(&loan, events);
                loan
            },
        )
    }

    /// Close an open loan as lost. Its units stay reserved until written off.
    pub fn mark_lost(&self, actor: &Actor, loan_id: LoanId) -> DomainResult<Loan> {
        let result = self.try_mark_lost(actor, loan_id);
        match &result {
            Ok(loan) => tracing::warn!(
                loan_id = %loan_id,
                component_id = %loan.component_id(),
                borrower_id = %loan.borrower_id(),
                actor_id = %actor.id,
                quantity = loan.quantity(),
                "loan marked lost"
            ),
            Err(err) => log_rejection("mark_lost", err),
        }
        result
    }

    fn try_mark_lost(&self, actor: &Actor, loan_id: LoanId) -> DomainResult<Loan> {
        authorize(actor, &permissions::MARK_LOST)?;
        let snapshot = self.loan(loan_id)?;

        self.store.transact(
            snapshot.component_id(),
            |_| {
                let mut loan = self.loan(loan_id)?;
                let events = loan.execute(&LoanCommand::MarkLost(MarkLost {
                    loan_id,
                    occurred_at: Utc::now(),
                }))?;
                Ok((loan, events))
            },
            |(loan, events), _| {
                *self
                    .lost_pending
                    .lock()
                    .entry(loan.component_id())
                    .or_insert(0) += loan.quantity();
                self.commit(&loan, events);
                loan
            },
        )
    }

    /// Remove lost units from both on-hand and reserved counts.
    ///
    /// Limited to units from lost loans that have not been written off yet, so
    /// stock held by open loans can never be written away.
    pub fn write_off(&self, actor: &Actor, component_id: ComponentId, quantity: i64) -> DomainResult<Component> {
        let result = self.try_write_off(actor, component_id, quantity);
        match &result {
            Ok(component) => tracing::info!(
                component_id = %component_id,
                actor_id = %actor.id,
                quantity,
                quantity_on_hand = component.quantity_on_hand(),
                "lost stock written off"
            ),
            Err(err) => log_rejection("write_off", err),
        }
        result
    }

    fn try_write_off(&self, actor: &Actor, component_id: ComponentId, quantity: i64) -> DomainResult<Component> {
        authorize(actor, &permissions::WRITE_OFF)?;

        self.store.transact(
            component_id,
            |tx| {
                let pending = self.lost_awaiting_write_off(component_id);
                if quantity > pending {
                    return Err(DomainError::validation(format!(
                        "cannot write off {quantity} units: {pending} lost units await write-off"
                    )));
                }
                tx.write_off(quantity, StockAudit::by(actor.id).with_reason("lost on loan"))
            },
            |(), component| {
                let mut lost = self.lost_pending.lock();
                if let Some(pending) = lost.get_mut(&component_id) {
                    *pending -= quantity;
                    if *pending == 0 {
                        lost.remove(&component_id);
                    }
                }
                component.clone()
            },
        )
    }

    fn commit(&self, loan: &Loan, events: Vec<LoanEvent>) {
        let expected = ExpectedVersion::Exact(loan.version() - events.len() as u64);
        self.loans.write().insert(loan.id_typed(), loan.clone());

        if let Err(err) = self.journal.append(*loan.id_typed().as_uuid(), events, expected) {
            tracing::error!(loan_id = %loan.id_typed(), error = %err, "failed to journal loan events");
        }
    }

    pub fn loan(&self, loan_id: LoanId) -> DomainResult<Loan> {
        self.loans
            .read()
            .get(&loan_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("loan {loan_id}")))
    }

    /// All loans of a borrower, oldest first.
    pub fn loans_for_borrower(&self, borrower_id: ActorId) -> Vec<Loan> {
        self.collect(|loan| loan.borrower_id() == borrower_id)
    }

    pub fn open_loans(&self) -> Vec<Loan> {
        self.collect(Loan::is_open)
    }

    pub fn open_loans_for_component(&self, component_id: ComponentId) -> Vec<Loan> {
        self.collect(|loan| loan.is_open() && loan.component_id() == component_id)
    }

    /// Open loans past their due date at `now`.
    pub fn overdue_loans(&self, now: DateTime<Utc>) -> Vec<Loan> {
        self.collect(|loan| loan.is_overdue(now))
    }

    pub fn lost_awaiting_write_off(&self, component_id: ComponentId) -> i64 {
        self.lost_pending.lock().get(&component_id).copied().unwrap_or(0)
    }

    pub fn history(&self, loan_id: LoanId) -> DomainResult<Vec<EventEnvelope<LoanEvent>>> {
        self.loan(loan_id)?;
        Ok(self.journal.load_stream(*loan_id.as_uuid())?)
    }

    fn collect(&self, keep: impl Fn(&Loan) -> bool) -> Vec<Loan> {
        let mut loans: Vec<Loan> = self.loans.read().values().filter(|l| keep(l)).cloned().collect();
        loans.sort_by_key(|l| (l.checked_out_at(), l.id_typed()));
        loans
    }

    /// Compare every component's reservation count against its loans.
    ///
    /// Each component is checked under its own lock, so the result is exact per
    /// component even while checkouts continue elsewhere. An empty result means
    /// the books balance.
    pub fn reconcile(&self) -> Vec<Discrepancy> {
        let discrepancies: Vec<Discrepancy> = self
            .store
            .all()
            .into_iter()
            .filter_map(|snapshot| {
                let component_id = snapshot.id_typed();
                self.store
                    .transact(
                        component_id,
                        |tx| Ok(tx.component().clone()),
                        |component, _| {
                            let open_loan_quantity: i64 = self
                                .open_loans_for_component(component_id)
                                .iter()
                                .map(Loan::quantity)
                                .sum();
                            let lost_awaiting_write_off = self.lost_awaiting_write_off(component_id);

                            (component.quantity_reserved() != open_loan_quantity + lost_awaiting_write_off)
                                .then(|| Discrepancy {
                                    component_id,
                                    part_number: component.part_number().to_string(),
                                    quantity_reserved: component.quantity_reserved(),
                                    open_loan_quantity,
                                    lost_awaiting_write_off,
                                })
                        },
                    )
                    .ok()
                    .flatten()
            })
            .collect();

        for d in &discrepancies {
            tracing::error!(
                component_id = %d.component_id,
                part_number = %d.part_number,
                quantity_reserved = d.quantity_reserved,
                open_loan_quantity = d.open_loan_quantity,
                lost_awaiting_write_off = d.lost_awaiting_write_off,
                "reservation count does not match loans"
            );
        }
        discrepancies
    }
}

fn log_rejection(operation: &'static str, err: &DomainError) {
    if err.is_expected() {
        tracing::info!(operation, kind = err.kind(), error = %err, "lending request rejected");
    } else {
        tracing::error!(operation, kind = err.kind(), error = %err, "lending invariant violated");
    }
}
