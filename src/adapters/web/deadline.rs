//! Request deadlines for store work running on the blocking pool.
//!
//! A request that times out cannot stop its blocking task, so the task is
//! handed a [`CommitGate`] instead. Before each commit the task claims the
//! gate; once the request side has abandoned it, the claim fails and the
//! transaction rolls back.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::domain::error::StsError;
use crate::ports::store_port::{Gateway, StorePort};

const OPEN: u8 = 0;
const COMMITTING: u8 = 1;
const ABANDONED: u8 = 2;

#[derive(Debug, Default)]
pub struct CommitGate(AtomicU8);

impl CommitGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn begin_commit(&self) -> bool {
        self.0
            .compare_exchange(OPEN, COMMITTING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn end_commit(&self) {
        let _ = self
            .0
            .compare_exchange(COMMITTING, OPEN, Ordering::AcqRel, Ordering::Acquire);
    }

    /// Stop any further commit. Fails while a commit is in flight, in which
    /// case the caller has to wait for the work to finish.
    pub fn abandon(&self) -> bool {
        self.0
            .compare_exchange(OPEN, ABANDONED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// A store whose transactions only commit while their gate is open.
pub struct GatedStore {
    inner: Arc<dyn StorePort>,
    gate: Arc<CommitGate>,
}

impl GatedStore {
    pub fn new(inner: Arc<dyn StorePort>, gate: Arc<CommitGate>) -> Self {
        Self { inner, gate }
    }
}

impl StorePort for GatedStore {
    fn atomically(
        &self,
        work: &mut dyn FnMut(&dyn Gateway) -> Result<(), StsError>,
    ) -> Result<(), StsError> {
        let outcome = self.inner.atomically(&mut |gw| {
            work(gw)?;
            if self.gate.begin_commit() {
                Ok(())
            } else {
                Err(StsError::Database {
                    reason: "request abandoned after its deadline; rolled back".into(),
                })
            }
        });
        self.gate.end_commit();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abandon_wins_over_later_commit() {
        let gate = CommitGate::new();
        assert!(gate.abandon());
        assert!(!gate.begin_commit());
    }

    #[test]
    fn abandon_fails_during_commit_then_succeeds_after() {
        let gate = CommitGate::new();
        assert!(gate.begin_commit());
        assert!(!gate.abandon());
        gate.end_commit();
        assert!(gate.abandon());
    }
}
