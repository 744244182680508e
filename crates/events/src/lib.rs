//! Domain events and the append-only journal that records them.

pub mod envelope;
pub mod event;
pub mod journal;

pub use envelope::EventEnvelope;
pub use event::Event;
pub use journal::{Journal, JournalError};
