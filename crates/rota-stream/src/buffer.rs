//! Bounded alternative buffer
//!
//! FIFO with pinning: when over capacity the oldest unpinned snapshot goes.
//! Arrival order is the only signal; nothing is reordered on access.

use crate::error::StreamError;
use rota_core::{Snapshot, SnapshotId};
use std::collections::VecDeque;

/// Capacity-limited, ordered collection of disclosed snapshots
#[derive(Debug)]
pub struct AlternativeBuffer {
    items: VecDeque<Snapshot>,
    capacity: usize,
    pinned: Option<SnapshotId>,
}

impl AlternativeBuffer {
    /// Create buffer with capacity `K` (at least 1)
    #[inline]
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity: capacity.max(1),
            pinned: None,
        }
    }

    /// Append a snapshot and evict if over capacity.
    ///
    /// Returns the evicted snapshots, oldest first.
    pub fn push(&mut self, snapshot: Snapshot) -> Vec<Snapshot> {
        self.items.push_back(snapshot);
        self.evict_if_needed()
    }

    /// Drop the oldest unpinned snapshots until within capacity
    pub fn evict_if_needed(&mut self) -> Vec<Snapshot> {
        let mut evicted = Vec::new();
        while self.items.len() > self.capacity {
            let victim = self
                .items
                .iter()
                .position(|s| Some(s.id()) != self.pinned);
            match victim.and_then(|idx| self.items.remove(idx)) {
                Some(snapshot) => {
                    tracing::debug!("Evicting snapshot {}", snapshot.id());
                    evicted.push(snapshot);
                }
                None => break,
            }
        }
        evicted
    }

    /// Protect a buffered snapshot from eviction
    ///
    /// # Errors
    /// Returns [`StreamError::UnknownSnapshot`] if it is not buffered
    pub fn pin(&mut self, id: SnapshotId) -> Result<(), StreamError> {
        if !self.contains(id) {
            return Err(StreamError::UnknownSnapshot(id));
        }
        self.pinned = Some(id);
        Ok(())
    }

    /// Remove eviction protection
    #[inline]
    pub fn unpin(&mut self) {
        self.pinned = None;
    }

    /// Currently protected snapshot
    #[inline]
    #[must_use]
    pub fn pinned(&self) -> Option<SnapshotId> {
        self.pinned
    }

    /// Look up a buffered snapshot
    #[must_use]
    pub fn get(&self, id: SnapshotId) -> Option<&Snapshot> {
        self.items.iter().find(|s| s.id() == id)
    }

    /// Whether a snapshot is buffered
    #[inline]
    #[must_use]
    pub fn contains(&self, id: SnapshotId) -> bool {
        self.get(id).is_some()
    }

    /// Snapshots in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.items.iter()
    }

    /// Number of buffered snapshots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Capacity `K`
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop everything, including the pin
    pub fn clear(&mut self) {
        self.items.clear();
        self.pinned = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rota_core::{SolveResult, SolveStatus, Summary};

    fn snap(n: u64) -> Snapshot {
        let raw = SolveResult {
            assignments: Vec::new(),
            status: SolveStatus::Feasible,
            solution_index: Some(n),
            solve_time_ms: n,
            objectives: Default::default(),
            summary: Summary::default(),
        };
        Snapshot::new(SnapshotId::Ordinal(n), raw, n)
    }

    fn ids(buffer: &AlternativeBuffer) -> Vec<SnapshotId> {
        buffer.iter().map(Snapshot::id).collect()
    }

    #[test]
    fn keeps_most_recent_k_without_pin() {
        let mut buffer = AlternativeBuffer::new(12);
        for n in 0..17 {
            buffer.push(snap(n));
        }
        let expected: Vec<_> = (5..17).map(SnapshotId::Ordinal).collect();
        assert_eq!(ids(&buffer), expected);
    }

    #[test]
    fn pinned_snapshot_survives() {
        let mut buffer = AlternativeBuffer::new(12);
        for n in 0..3 {
            buffer.push(snap(n));
        }
        buffer.pin(SnapshotId::Ordinal(2)).unwrap();
        for n in 3..17 {
            buffer.push(snap(n));
        }

        assert_eq!(buffer.len(), 12);
        assert!(buffer.contains(SnapshotId::Ordinal(2)));
        // Pinned plus the 11 most recent others
        let mut expected = vec![SnapshotId::Ordinal(2)];
        expected.extend((6..17).map(SnapshotId::Ordinal));
        assert_eq!(ids(&buffer), expected);
    }

    #[test]
    fn pin_requires_membership() {
        let mut buffer = AlternativeBuffer::new(2);
        assert!(matches!(
            buffer.pin(SnapshotId::Ordinal(9)),
            Err(StreamError::UnknownSnapshot(_))
        ));
    }

    #[test]
    fn capacity_one_keeps_only_pinned() {
        let mut buffer = AlternativeBuffer::new(1);
        buffer.push(snap(0));
        buffer.pin(SnapshotId::Ordinal(0)).unwrap();
        let evicted = buffer.push(snap(1));
        assert_eq!(evicted.len(), 1);
        assert_eq!(ids(&buffer), vec![SnapshotId::Ordinal(0)]);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity_and_keeps_pin(
            capacity in 1usize..16,
            count in 0u64..64,
            pin_at in 0u64..64,
        ) {
            let mut buffer = AlternativeBuffer::new(capacity);
            for n in 0..count {
                buffer.push(snap(n));
                if n == pin_at {
                    buffer.pin(SnapshotId::Ordinal(n)).unwrap();
                }
                prop_assert!(buffer.len() <= capacity);
            }
            if pin_at < count {
                prop_assert!(buffer.contains(SnapshotId::Ordinal(pin_at)));
            }
        }
    }
}
