//! Relaxation proposals and their transition table
//!
//! ```text
//! Proposed <-> Staged <-> Confirmed -> Applied -> Reverted
//!                ^                                   |
//!                +-----------------------------------+
//! ```

use crate::error::RepairError;
use crate::token::RepairToken;
use rota_core::{ItemId, ProposalId, TimeSlot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What a proposal relaxes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalKind {
    /// Enable a disabled room
    EnableRoom,
    /// Bring a room in from the pool
    AddPoolRoom,
    /// Ask a person to become available
    PersonAvailability,
    /// Generic extra room (also used for directives not understood locally)
    ExtraRoomGeneric,
}

/// What a proposal is about
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProposalTarget {
    /// A room by name
    Room { name: String },
    /// A person at a slot
    PersonSlot { person: String, slot: TimeSlot },
    /// Free-form label
    Label { text: String },
}

/// Negotiation status of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Offered, no effects
    Proposed,
    /// Chosen; side effects live, tokens persisted
    Staged,
    /// Eligible for Apply
    Confirmed,
    /// Part of the solved problem
    Applied,
    /// Applied once, then taken back
    Reverted,
}

impl ProposalStatus {
    /// Whether the proposal's side effects and tokens are in force
    #[inline]
    #[must_use]
    pub fn is_in_force(self) -> bool {
        matches!(self, Self::Staged | Self::Confirmed | Self::Applied)
    }
}

/// Transitions reachable from `from`
pub fn allowed_transitions(from: ProposalStatus) -> Vec<ProposalStatus> {
    use ProposalStatus as S;
    match from {
        S::Proposed => vec![S::Staged],
        S::Staged => vec![S::Proposed, S::Confirmed],
        S::Confirmed => vec![S::Staged, S::Applied],
        S::Applied => vec![S::Reverted],
        S::Reverted => vec![S::Staged],
    }
}

/// Checks a proposal transition against the table
pub fn can_transition(from: ProposalStatus, to: ProposalStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

/// A proposed constraint relaxation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaxationProposal {
    /// Unique id
    pub id: ProposalId,
    /// Kind, from the first token
    pub kind: ProposalKind,
    /// Target, from the first token
    pub target: ProposalTarget,
    /// Tokens sent to the solver and the store, verbatim
    pub raw_tokens: Vec<String>,
    /// Current status
    pub status: ProposalStatus,
    /// Blocked items this proposal should unblock
    #[serde(default)]
    pub affected_items: Vec<ItemId>,
    /// Display label
    pub label: String,
}

impl RelaxationProposal {
    /// Create a proposal from one parsed token
    #[must_use]
    pub fn from_token(token: &RepairToken) -> Self {
        let (kind, target) = classify(token);
        Self {
            id: ProposalId::new(),
            kind,
            target,
            raw_tokens: vec![token.to_string()],
            status: ProposalStatus::Proposed,
            affected_items: Vec::new(),
            label: token.describe(),
        }
    }

    /// Create a proposal from raw tokens; kind and target follow the first one.
    ///
    /// Returns `None` when every token is blank.
    #[must_use]
    pub fn from_raw_tokens<I, S>(tokens: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let raw_tokens: Vec<String> = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t| !t.trim().is_empty())
            .collect();
        let first = RepairToken::parse_lenient(raw_tokens.first()?)?;
        let mut proposal = Self::from_token(&first);
        proposal.raw_tokens = raw_tokens;
        Some(proposal)
    }

    /// Attach the items this proposal unblocks
    #[must_use]
    pub fn with_affected_items(mut self, items: Vec<ItemId>) -> Self {
        self.affected_items = items;
        self
    }

    /// Start in a given status (used when reloading from the store)
    #[must_use]
    pub fn with_status(mut self, status: ProposalStatus) -> Self {
        self.status = status;
        self
    }

    /// Parsed tokens; malformed ones come back as [`RepairToken::Unknown`]
    #[must_use]
    pub fn tokens(&self) -> Vec<RepairToken> {
        self.raw_tokens
            .iter()
            .filter_map(|t| RepairToken::parse_lenient(t))
            .collect()
    }

    /// Token set used to detect duplicate proposals
    #[must_use]
    pub fn token_set(&self) -> BTreeSet<&str> {
        self.raw_tokens.iter().map(|t| t.trim()).collect()
    }

    /// Move to `to`
    ///
    /// # Errors
    /// Returns [`RepairError::IllegalTransition`] when not in the table
    pub fn transition(&mut self, to: ProposalStatus) -> Result<(), RepairError> {
        if !can_transition(self.status, to) {
            return Err(RepairError::IllegalTransition {
                id: self.id,
                from: self.status,
                to,
            });
        }
        tracing::debug!("Proposal {}: {:?} -> {:?}", self.id, self.status, to);
        self.status = to;
        Ok(())
    }
}

fn classify(token: &RepairToken) -> (ProposalKind, ProposalTarget) {
    match token {
        RepairToken::EnableRoom { room } => (
            ProposalKind::EnableRoom,
            ProposalTarget::Room { name: room.clone() },
        ),
        RepairToken::AddPoolRoom { room } => (
            ProposalKind::AddPoolRoom,
            ProposalTarget::Room { name: room.clone() },
        ),
        RepairToken::PersonUnavailable { person, at } => (
            ProposalKind::PersonAvailability,
            ProposalTarget::PersonSlot {
                person: person.clone(),
                slot: crate::token::slot_starting(*at),
            },
        ),
        RepairToken::ExtraRoom { label } => (
            ProposalKind::ExtraRoomGeneric,
            ProposalTarget::Label { text: label.clone() },
        ),
        RepairToken::Unknown { raw } => (
            ProposalKind::ExtraRoomGeneric,
            ProposalTarget::Label { text: raw.clone() },
        ),
    }
}
