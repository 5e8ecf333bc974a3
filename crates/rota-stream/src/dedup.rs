//! Snapshot deduplication
//!
//! Identity comes from the solver's solution index when present. Without one,
//! a fingerprint of elapsed solve time and assignment count is used, so a
//! retransmitted payload maps to the same id.

use rota_core::{Fingerprint, Snapshot, SnapshotId, SolveResult};
use std::collections::HashSet;

/// Stable identity of a raw result
#[must_use]
pub fn derive_id(raw: &SolveResult) -> SnapshotId {
    match raw.solution_index {
        Some(index) => SnapshotId::Ordinal(index),
        None => SnapshotId::Fingerprint(Fingerprint::of_fields(&[
            &raw.solve_time_ms.to_le_bytes(),
            &(raw.assignments.len() as u64).to_le_bytes(),
        ])),
    }
}

/// Per-run seen-set
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashSet<SnapshotId>,
    next_sequence: u64,
    duplicates: u64,
}

impl Deduplicator {
    /// Create empty deduplicator
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a raw result, or `None` if its id was already seen this run
    pub fn accept(&mut self, raw: SolveResult) -> Option<Snapshot> {
        let id = derive_id(&raw);
        if !self.seen.insert(id) {
            self.duplicates += 1;
            tracing::debug!("Dropping duplicate snapshot {}", id);
            return None;
        }
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Some(Snapshot::new(id, raw, sequence))
    }

    /// Forget everything (new run)
    pub fn reset(&mut self) {
        self.seen.clear();
        self.next_sequence = 0;
        self.duplicates = 0;
    }

    /// Distinct snapshots accepted this run
    #[inline]
    #[must_use]
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    /// Repeats dropped this run
    #[inline]
    #[must_use]
    pub fn duplicate_count(&self) -> u64 {
        self.duplicates
    }
}
