//! Error types for the session coordinator
//!
//! Every lower crate's error converts into [`SessionError`]. None of them is
//! fatal: the coordinator turns them into user notices and carries on.

use rota_core::ConfigError;
use rota_edit::EditError;
use rota_repair::RepairError;
use rota_stream::StreamError;

/// Failure reported by the solver or explanation service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SolverError {
    /// Connection dropped or timed out
    #[error("transport failure: {0}")]
    Transport(String),

    /// Service refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The coordinator stopped listening
    #[error("result sink closed")]
    SinkClosed,
}

impl SolverError {
    /// Worth a user-initiated reconnect
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Session-level error
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Streaming pipeline
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Repair staging
    #[error(transparent)]
    Repair(#[from] RepairError),

    /// Optimistic edit rejected
    #[error(transparent)]
    Edit(#[from] EditError),

    /// Configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Solver or explanation service
    #[error(transparent)]
    Solver(#[from] SolverError),

    /// Simulation script did not parse
    #[error("invalid solver script: {0}")]
    Script(#[from] serde_json::Error),

    /// Reconnect requested without a failed stream to retry
    #[error("nothing to reconnect: the last stream did not fail")]
    NothingToReconnect,

    /// Coordinator event loop is gone
    #[error("coordinator has shut down")]
    ChannelClosed,
}

impl SessionError {
    /// Raced a run change; dropped without telling the user
    #[inline]
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stream(e) if e.is_stale())
    }

    /// A retry may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Repair(e) => e.is_retryable(),
            Self::Solver(e) => e.is_transient(),
            _ => false,
        }
    }
}
