//! Deduplicated solver snapshots

use crate::hash::Fingerprint;
use crate::solve::SolveResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Stable identity of a snapshot within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SnapshotId {
    /// Solver-provided solution index
    Ordinal(u64),
    /// Fingerprint of the result when no index was provided
    Fingerprint(Fingerprint),
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ordinal(n) => write!(f, "#{n}"),
            Self::Fingerprint(fp) => write!(f, "fp:{}", fp.short()),
        }
    }
}

/// Ordering used for the "best" pointer: adjacency score, then scheduled count.
///
/// A missing adjacency score ranks below any reported score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RankKey {
    /// Adjacency score
    pub adjacency: Option<i64>,
    /// Scheduled item count
    pub scheduled: u32,
}

/// A streamed or final result that passed deduplication
#[derive(Debug, Clone)]
pub struct Snapshot {
    id: SnapshotId,
    payload: Arc<SolveResult>,
    received_at: Instant,
    sequence: u64,
}

impl Snapshot {
    /// Wrap an accepted result.
    ///
    /// `sequence` is the arrival position within the run.
    #[inline]
    #[must_use]
    pub fn new(id: SnapshotId, payload: SolveResult, sequence: u64) -> Self {
        Self {
            id,
            payload: Arc::new(payload),
            received_at: Instant::now(),
            sequence,
        }
    }

    /// Snapshot identity
    #[inline]
    #[must_use]
    pub fn id(&self) -> SnapshotId {
        self.id
    }

    /// The solver result
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &SolveResult {
        &self.payload
    }

    /// Monotonic receive time
    #[inline]
    #[must_use]
    pub fn received_at(&self) -> Instant {
        self.received_at
    }

    /// Arrival position within the run
    #[inline]
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Every item placed
    #[inline]
    #[must_use]
    pub fn is_fully_feasible(&self) -> bool {
        self.payload.is_fully_feasible()
    }

    /// Rank for best-pointer comparison
    #[inline]
    #[must_use]
    pub fn rank_key(&self) -> RankKey {
        RankKey {
            adjacency: self.payload.adjacency_score(),
            scheduled: self.payload.summary.scheduled,
        }
    }
}
