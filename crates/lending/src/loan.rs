use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labstock_core::{ActorId, Aggregate, AggregateRoot, ComponentId, DomainError, LoanId};
use labstock_events::Event;

/// Loan status lifecycle.
///
/// `Open` may loop on itself through partial returns; `Returned` and `Lost`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Open,
    Returned,
    Lost,
}

/// Aggregate root: Loan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Loan {
    id: LoanId,
    component_id: ComponentId,
    borrower_id: ActorId,
    checked_out_by: ActorId,
    /// Units still out on this loan.
    quantity: i64,
    original_quantity: i64,
    status: LoanStatus,
    checked_out_at: DateTime<Utc>,
    due_at: Option<DateTime<Utc>>,
    returned_at: Option<DateTime<Utc>>,
    lost_at: Option<DateTime<Utc>>,
    version: u64,
    #[serde(skip)]
    created: bool,
}

impl Loan {
    /// Create an empty, not-yet-opened aggregate instance.
    pub fn empty(id: LoanId) -> Self {
        Self {
            id,
            component_id: ComponentId::from_uuid(uuid::Uuid::nil()),
            borrower_id: ActorId::from_uuid(uuid::Uuid::nil()),
            checked_out_by: ActorId::from_uuid(uuid::Uuid::nil()),
            quantity: 0,
            original_quantity: 0,
            status: LoanStatus::Open,
            checked_out_at: DateTime::<Utc>::default(),
            due_at: None,
            returned_at: None,
            lost_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> LoanId {
        self.id
    }

    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    pub fn borrower_id(&self) -> ActorId {
        self.borrower_id
    }

    pub fn checked_out_by(&self) -> ActorId {
        self.checked_out_by
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn original_quantity(&self) -> i64 {
        self.original_quantity
    }

    pub fn status(&self) -> LoanStatus {
        self.status
    }

    pub fn is_open(&self) -> bool {
        self.created && self.status == LoanStatus::Open
    }

    pub fn checked_out_at(&self) -> DateTime<Utc> {
        self.checked_out_at
    }

    pub fn due_at(&self) -> Option<DateTime<Utc>> {
        self.due_at
    }

    pub fn returned_at(&self) -> Option<DateTime<Utc>> {
        self.returned_at
    }

    pub fn lost_at(&self) -> Option<DateTime<Utc>> {
        self.lost_at
    }

    /// Open and past its due date. Informational only: nothing changes state
    /// because of it.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_at.is_some_and(|due| due < now)
    }
}

impl AggregateRoot for Loan {
    type Id = LoanId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenLoan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLoan {
    pub loan_id: LoanId,
    pub component_id: ComponentId,
    pub borrower_id: ActorId,
    pub checked_out_by: ActorId,
    pub quantity: i64,
    pub due_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReturnItems (full or partial).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnItems {
    pub loan_id: LoanId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkLost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkLost {
    pub loan_id: LoanId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanCommand {
    Open(OpenLoan),
    Return(ReturnItems),
    MarkLost(MarkLost),
}

/// Event: LoanOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanOpened {
    pub loan_id: LoanId,
    pub component_id: ComponentId,
    pub borrower_id: ActorId,
    pub checked_out_by: ActorId,
    pub quantity: i64,
    pub due_at: Option<DateTime<Utc>>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ItemsReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsReturned {
    pub loan_id: LoanId,
    pub quantity: i64,
    pub remaining: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LoanLost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanLost {
    pub loan_id: LoanId,
    pub quantity: i64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoanEvent {
    Opened(LoanOpened),
    ItemsReturned(ItemsReturned),
    Lost(LoanLost),
}

impl Event for LoanEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LoanEvent::Opened(_) => "lending.loan.opened",
            LoanEvent::ItemsReturned(e) if e.remaining == 0 => "lending.loan.returned",
            LoanEvent::ItemsReturned(_) => "lending.loan.partially_returned",
            LoanEvent::Lost(_) => "lending.loan.lost",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LoanEvent::Opened(e) => e.occurred_at,
            LoanEvent::ItemsReturned(e) => e.occurred_at,
            LoanEvent::Lost(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Loan {
    type Command = LoanCommand;
    type Event = LoanEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LoanEvent::Opened(e) => {
                self.id = e.loan_id;
                self.component_id = e.component_id;
                self.borrower_id = e.borrower_id;
                self.checked_out_by = e.checked_out_by;
                self.quantity = e.quantity;
                self.original_quantity = e.quantity;
                self.status = LoanStatus::Open;
                self.checked_out_at = e.occurred_at;
                self.due_at = e.due_at;
                self.created = true;
            }
            LoanEvent::ItemsReturned(e) => {
                self.quantity -= e.quantity;
                if self.quantity == 0 {
                    self.status = LoanStatus::Returned;
                    self.returned_at = Some(e.occurred_at);
                }
            }
            LoanEvent::Lost(e) => {
                self.status = LoanStatus::Lost;
                self.lost_at = Some(e.occurred_at);
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            LoanCommand::Open(cmd) => self.handle_open(cmd),
            LoanCommand::Return(cmd) => self.handle_return(cmd),
            LoanCommand::MarkLost(cmd) => self.handle_mark_lost(cmd),
        }
    }
}

impl Loan {
    fn ensure_open(&self, loan_id: LoanId) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("loan {loan_id}")));
        }
        if self.id != loan_id {
            return Err(DomainError::invalid_state("loan_id mismatch"));
        }
        if self.status != LoanStatus::Open {
            return Err(DomainError::invalid_state(format!(
                "loan {loan_id} is {:?}, not open",
                self.status
            )));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenLoan) -> Result<Vec<LoanEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("loan already exists"));
        }
        if cmd.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "checkout quantity must be positive (got {})",
                cmd.quantity
            )));
        }
        if let Some(due_at) = cmd.due_at {
            if due_at <= cmd.occurred_at {
                return Err(DomainError::validation("due_at must be after the checkout time"));
            }
        }

        Ok(vec![LoanEvent::Opened(LoanOpened {
            loan_id: cmd.loan_id,
            component_id: cmd.component_id,
            borrower_id: cmd.borrower_id,
            checked_out_by: cmd.checked_out_by,
            quantity: cmd.quantity,
            due_at: cmd.due_at,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_return(&self, cmd: &ReturnItems) -> Result<Vec<LoanEvent>, DomainError> {
        self.ensure_open(cmd.loan_id)?;

        if cmd.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "returned quantity must be positive (got {})",
                cmd.quantity
            )));
        }
        if cmd.quantity > self.quantity {
            return Err(DomainError::validation(format!(
                "cannot return {} units: only {} out on loan {}",
                cmd.quantity, self.quantity, cmd.loan_id
            )));
        }

        Ok(vec![LoanEvent::ItemsReturned(ItemsReturned {
            loan_id: cmd.loan_id,
            quantity: cmd.quantity,
            remaining: self.quantity - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_mark_lost(&self, cmd: &MarkLost) -> Result<Vec<LoanEvent>, DomainError> {
        self.ensure_open(cmd.loan_id)?;

        Ok(vec![LoanEvent::Lost(LoanLost {
            loan_id: cmd.loan_id,
            quantity: self.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn test_loan_id() -> LoanId {
        LoanId::from_uuid(uuid::Uuid::from_u128(0x2001))
    }

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn open(quantity: i64) -> Loan {
        let mut loan = Loan::empty(test_loan_id());
        let borrower = ActorId::from_uuid(uuid::Uuid::from_u128(0x3001));
        loan.execute(&LoanCommand::Open(OpenLoan {
            loan_id: test_loan_id(),
            component_id: ComponentId::from_uuid(uuid::Uuid::from_u128(0x1001)),
            borrower_id: borrower,
            checked_out_by: borrower,
            quantity,
            due_at: Some(test_time() + Duration::days(14)),
            occurred_at: test_time(),
        }))
        .unwrap();
        loan
    }

    fn return_items(quantity: i64) -> LoanCommand {
        LoanCommand::Return(ReturnItems {
            loan_id: test_loan_id(),
            quantity,
            occurred_at: test_time() + Duration::days(1),
        })
    }

    fn mark_lost() -> LoanCommand {
        LoanCommand::MarkLost(MarkLost {
            loan_id: test_loan_id(),
            occurred_at: test_time() + Duration::days(2),
        })
    }

    #[test]
    fn open_loan_records_quantities() {
        let loan = open(5);
        assert!(loan.is_open());
        assert_eq!(loan.quantity(), 5);
        assert_eq!(loan.original_quantity(), 5);
        assert_eq!(loan.checked_out_at(), test_time());
        assert_eq!(loan.returned_at(), None);
        assert_eq!(loan.version(), 1);
    }

    #[test]
    fn open_rejects_bad_quantity_and_past_due_date() {
        let loan = Loan::empty(test_loan_id());
        let base = OpenLoan {
            loan_id: test_loan_id(),
            component_id: ComponentId::new(),
            borrower_id: ActorId::new(),
            checked_out_by: ActorId::new(),
            quantity: 0,
            due_at: None,
            occurred_at: test_time(),
        };
        assert!(matches!(
            loan.handle(&LoanCommand::Open(base.clone())),
            Err(DomainError::Validation(_))
        ));

        let past_due = OpenLoan {
            quantity: 1,
            due_at: Some(test_time() - Duration::hours(1)),
            ..base
        };
        assert!(matches!(
            loan.handle(&LoanCommand::Open(past_due)),
            Err(DomainError::Validation(_))
        ));
    }

    #[test]
    fn partial_return_keeps_loan_open() {
        let mut loan = open(5);
        loan.execute(&return_items(2)).unwrap();
        assert_eq!(loan.status(), LoanStatus::Open);
        assert_eq!(loan.quantity(), 3);
        assert_eq!(loan.original_quantity(), 5);
        assert_eq!(loan.returned_at(), None);
    }

    #[test]
    fn full_return_closes_loan() {
        let mut loan = open(5);
        loan.execute(&return_items(2)).unwrap();
        let events = loan.execute(&return_items(3)).unwrap();
        assert_eq!(events[0].event_type(), "lending.loan.returned");
        assert_eq!(loan.status(), LoanStatus::Returned);
        assert_eq!(loan.quantity(), 0);
        assert_eq!(loan.returned_at(), Some(test_time() + Duration::days(1)));
    }

    #[test]
    fn returning_more_than_outstanding_is_validation_error() {
        let loan = open(2);
        assert!(matches!(loan.handle(&return_items(3)), Err(DomainError::Validation(_))));
        assert!(matches!(loan.handle(&return_items(0)), Err(DomainError::Validation(_))));
    }

    #[test]
    fn terminal_loans_reject_further_transitions() {
        let mut returned = open(1);
        returned.execute(&return_items(1)).unwrap();
        assert!(matches!(returned.handle(&return_items(1)), Err(DomainError::InvalidState(_))));
        assert!(matches!(returned.handle(&mark_lost()), Err(DomainError::InvalidState(_))));

        let mut lost = open(4);
        lost.execute(&mark_lost()).unwrap();
        assert_eq!(lost.status(), LoanStatus::Lost);
        assert_eq!(lost.quantity(), 4);
        assert!(lost.lost_at().is_some());
        assert!(matches!(lost.handle(&return_items(1)), Err(DomainError::InvalidState(_))));
    }

    #[test]
    fn unopened_loan_is_not_found() {
        let loan = Loan::empty(test_loan_id());
        assert!(matches!(loan.handle(&return_items(1)), Err(DomainError::NotFound(_))));
    }

    #[test]
    fn overdue_is_reported_only_for_open_loans() {
        let mut loan = open(1);
        let later = test_time() + Duration::days(30);
        assert!(!loan.is_overdue(test_time()));
        assert!(loan.is_overdue(later));

        loan.execute(&return_items(1)).unwrap();
        assert!(!loan.is_overdue(later));
    }
}
