//! In-memory append-only journal of domain events, one stream per aggregate.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;
use uuid::Uuid;

use labstock_core::{DomainError, ExpectedVersion};

use crate::{Event, EventEnvelope};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JournalError {
    #[error("concurrency conflict: {0}")]
    Concurrency(String),

    #[error("journal lock poisoned")]
    Poisoned,
}

impl From<JournalError> for DomainError {
    fn from(value: JournalError) -> Self {
        // Streams are only appended while the owning aggregate is locked, so a
        // version mismatch here means the aggregate and its history diverged.
        DomainError::invalid_state(value.to_string())
    }
}

/// Append-only event journal.
///
/// Intended for tests/dev and as the history backing the in-memory stores.
#[derive(Debug)]
pub struct Journal<E> {
    aggregate_type: &'static str,
    streams: RwLock<HashMap<Uuid, Vec<EventEnvelope<E>>>>,
}

impl<E: Event> Journal<E> {
    pub fn new(aggregate_type: &'static str) -> Self {
        Self {
            aggregate_type,
            streams: RwLock::new(HashMap::new()),
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    fn current_version(stream: &[EventEnvelope<E>]) -> u64 {
        stream.last().map(|e| e.sequence_number()).unwrap_or(0)
    }

    /// Append events to a stream, checking the stream's current version first.
    pub fn append(
        &self,
        aggregate_id: Uuid,
        events: Vec<E>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<EventEnvelope<E>>, JournalError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let mut streams = self.streams.write().map_err(|_| JournalError::Poisoned)?;

        let stream = streams.entry(aggregate_id).or_default();
        let current = Self::current_version(stream);

        if !expected_version.matches(current) {
            return Err(JournalError::Concurrency(format!(
                "{} {aggregate_id}: expected {expected_version:?}, found {current}",
                self.aggregate_type
            )));
        }

        let mut next = current + 1;
        let mut committed = Vec::with_capacity(events.len());
        for event in events {
            let envelope = EventEnvelope::new(
                Uuid::now_v7(),
                aggregate_id,
                self.aggregate_type,
                next,
                event.event_type(),
                event.occurred_at(),
                event,
            );
            next += 1;
            stream.push(envelope.clone());
            committed.push(envelope);
        }

        Ok(committed)
    }

    /// Full history of one stream, oldest first.
    pub fn load_stream(&self, aggregate_id: Uuid) -> Result<Vec<EventEnvelope<E>>, JournalError> {
        let streams = self.streams.read().map_err(|_| JournalError::Poisoned)?;
        Ok(streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    /// Number of events recorded across all streams.
    pub fn len(&self) -> Result<usize, JournalError> {
        let streams = self.streams.read().map_err(|_| JournalError::Poisoned)?;
        Ok(streams.values().map(Vec::len).sum())
    }

    pub fn is_empty(&self) -> Result<bool, JournalError> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Counted(u32);

    impl Event for Counted {
        fn event_type(&self) -> &'static str {
            "test.counted"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
        }
    }

    #[test]
    fn append_assigns_consecutive_sequence_numbers() {
        let journal = Journal::new("test.stream");
        let id = Uuid::now_v7();

        journal
            .append(id, vec![Counted(1), Counted(2)], ExpectedVersion::Exact(0))
            .unwrap();
        let committed = journal
            .append(id, vec![Counted(3)], ExpectedVersion::Exact(2))
            .unwrap();

        assert_eq!(committed[0].sequence_number(), 3);
        assert_eq!(committed[0].aggregate_type(), "test.stream");
        assert_eq!(committed[0].event_type(), "test.counted");

        let stream = journal.load_stream(id).unwrap();
        let seqs: Vec<u64> = stream.iter().map(|e| e.sequence_number()).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(journal.len(), Ok(3));
    }

    #[test]
    fn stale_expected_version_is_rejected_without_appending() {
        let journal = Journal::new("test.stream");
        let id = Uuid::now_v7();
        journal
            .append(id, vec![Counted(1)], ExpectedVersion::Exact(0))
            .unwrap();

        let err = journal
            .append(id, vec![Counted(2)], ExpectedVersion::Exact(0))
            .unwrap_err();
        assert!(matches!(err, JournalError::Concurrency(_)));
        assert_eq!(journal.load_stream(id).unwrap().len(), 1);

        let domain: DomainError = err.into();
        assert!(!domain.is_expected());
    }

    #[test]
    fn unknown_stream_is_empty() {
        let journal: Journal<Counted> = Journal::new("test.stream");
        assert!(journal.load_stream(Uuid::now_v7()).unwrap().is_empty());
        assert_eq!(journal.is_empty(), Ok(true));
    }

    #[test]
    fn poisoned_lock_is_reported_by_every_accessor() {
        let journal: Arc<Journal<Counted>> = Arc::new(Journal::new("test.stream"));
        let holder = journal.clone();
        let _ = std::thread::spawn(move || {
            let _guard = holder.streams.write().unwrap();
            panic!("writer died holding the journal lock");
        })
        .join();

        assert_eq!(journal.len(), Err(JournalError::Poisoned));
        assert_eq!(journal.is_empty(), Err(JournalError::Poisoned));
        assert!(matches!(
            journal.load_stream(Uuid::now_v7()),
            Err(JournalError::Poisoned)
        ));
        assert!(matches!(
            journal.append(Uuid::now_v7(), vec![Counted(1)], ExpectedVersion::Any),
            Err(JournalError::Poisoned)
        ));
    }
}
