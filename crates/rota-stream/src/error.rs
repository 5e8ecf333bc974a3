//! Error types for the streaming pipeline

use crate::lifecycle::RunStatus;
use rota_core::{RunToken, SnapshotId};

/// Streaming pipeline errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// A run is already active
    #[error("a solve run is already active ({0})")]
    RunActive(RunToken),

    /// Operation needs an active run
    #[error("no active solve run")]
    NoActiveRun,

    /// Handle refers to a superseded run
    #[error("{got} is not the current run ({current})")]
    StaleRun { current: RunToken, got: RunToken },

    /// Lifecycle transition not in the table
    #[error("illegal run transition {from:?} -> {to:?}")]
    IllegalTransition { from: RunStatus, to: RunStatus },

    /// Gate is closed
    #[error("disclosure gate is closed")]
    GateClosed,

    /// "Show anyway" with nothing held back
    #[error("no pending snapshots to disclose")]
    NothingPending,

    /// Snapshot is not in the visible buffer
    #[error("snapshot {0} is not in the buffer")]
    UnknownSnapshot(SnapshotId),
}

impl StreamError {
    /// Errors that only mean the caller raced a run change
    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleRun { .. } | Self::NoActiveRun)
    }
}
