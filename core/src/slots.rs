//! Write-once, index-addressed outcome storage for one run.
//!
//! Each worker owns exactly one index, so slots are plain `OnceLock` cells
//! rather than entries behind a shared lock. A map is never reset: every run
//! allocates a new one, and workers left over from an earlier run keep
//! writing into the map they were given.

use std::sync::OnceLock;
use std::time::Duration;

use gather_types::NotFoundError;

/// Terminal record for one unit.
#[derive(Debug)]
pub struct Slot<T, E> {
    outcome: Result<T, E>,
    elapsed: Duration,
}

impl<T, E> Slot<T, E> {
    #[must_use]
    pub fn new(outcome: Result<T, E>, elapsed: Duration) -> Self {
        Self { outcome, elapsed }
    }

    #[must_use]
    pub fn outcome(&self) -> &Result<T, E> {
        &self.outcome
    }

    /// Time the unit body spent running.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

#[derive(Debug)]
pub struct SlotMap<T, E> {
    slots: Box<[OnceLock<Slot<T, E>>]>,
}

impl<T, E> SlotMap<T, E> {
    #[must_use]
    pub fn with_len(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| OnceLock::new()).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Write slot `index`. Returns `false` if the index is out of range or
    /// the slot already holds an outcome; the existing outcome is kept.
    pub fn fill(&self, index: usize, slot: Slot<T, E>) -> bool {
        self.slots
            .get(index)
            .is_some_and(|cell| cell.set(slot).is_ok())
    }

    pub fn get(&self, index: usize) -> Result<&Slot<T, E>, NotFoundError> {
        self.slots
            .get(index)
            .and_then(OnceLock::get)
            .ok_or(NotFoundError::new(index))
    }

    /// Indices that have not been written yet, ascending.
    #[must_use]
    pub fn outstanding(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.get().is_none())
            .map(|(index, _)| index)
            .collect()
    }

    /// Every slot in index order, `None` where still outstanding.
    pub fn iter(&self) -> impl Iterator<Item = Option<&Slot<T, E>>> + '_ {
        self.slots.iter().map(OnceLock::get)
    }
}
