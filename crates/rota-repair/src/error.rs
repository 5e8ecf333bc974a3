//! Error types for repair staging

use crate::proposal::ProposalStatus;
use rota_core::ProposalId;

/// Malformed repair token
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Blank token
    #[error("empty repair token")]
    Empty,

    /// Known directive without its argument
    #[error("directive `{directive}` needs an argument")]
    MissingArgument { directive: &'static str },

    /// Date-time field did not parse
    #[error("invalid date-time `{value}` (expected YYYY-MM-DDTHH:MM:00)")]
    InvalidDateTime { value: String },
}

/// Failure reported by the system of record
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store refused the request
    #[error("store rejected request: {0}")]
    Rejected(String),

    /// Referenced record does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// Worth retrying later
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Repair staging errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepairError {
    /// Token did not parse
    #[error("invalid repair token: {0}")]
    Token(#[from] TokenError),

    /// No proposal with that id
    #[error("unknown proposal {0}")]
    UnknownProposal(ProposalId),

    /// Proposal transition not in the table
    #[error("proposal {id}: illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        id: ProposalId,
        from: ProposalStatus,
        to: ProposalStatus,
    },

    /// A forward or compensating side effect failed
    #[error("side effect for proposal {id} failed: {source}")]
    SideEffect {
        id: ProposalId,
        #[source]
        source: StoreError,
    },

    /// Writing the repair token list failed
    #[error("failed to persist repairs: {0}")]
    Persist(#[source] StoreError),

    /// Reading the repair token list failed
    #[error("failed to load repairs: {0}")]
    Load(#[source] StoreError),

    /// Apply requested with nothing confirmed
    #[error("no confirmed repairs to apply")]
    NothingConfirmed,
}

impl RepairError {
    /// Retrying the same operation may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SideEffect { source, .. } | Self::Persist(source) | Self::Load(source) => {
                source.is_transient()
            }
            _ => false,
        }
    }
}
