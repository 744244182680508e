//! Lending domain module: loans of lab components to borrowers.
//!
//! `loan` is the pure aggregate; `ledger` couples it to the inventory store so
//! a loan and its reservation always commit together.

pub mod ledger;
pub mod loan;

pub use ledger::{CheckOut, Checkout, CheckoutLedger, Discrepancy, LendingPolicy};
pub use loan::{
    ItemsReturned, Loan, LoanCommand, LoanEvent, LoanLost, LoanOpened, LoanStatus, MarkLost,
    OpenLoan, ReturnItems,
};
