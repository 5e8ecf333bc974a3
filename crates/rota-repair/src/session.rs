//! Repair session: the ordered proposals for one blocking analysis

use crate::analysis::BlockingAnalysis;
use crate::error::RepairError;
use crate::proposal::{ProposalStatus, RelaxationProposal};
use indexmap::IndexMap;
use rota_core::{ItemId, ProposalId};
use std::collections::BTreeSet;

/// Ordered set of proposals
#[derive(Debug, Clone, Default)]
pub struct RepairSession {
    proposals: IndexMap<ProposalId, RelaxationProposal>,
    analysis: Option<BlockingAnalysis>,
}

impl RepairSession {
    /// Create empty session
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn relax candidates into `Proposed` proposals.
    ///
    /// Candidates whose token set matches an existing proposal are skipped.
    /// Returns the ids of the proposals added.
    pub fn seed(&mut self, analysis: BlockingAnalysis) -> Vec<ProposalId> {
        let blocked = analysis.blocked_items();
        let mut added = Vec::new();

        for candidate in &analysis.relax_candidates {
            let Some(mut proposal) = RelaxationProposal::from_raw_tokens(candidate.tokens.clone())
            else {
                continue;
            };
            if self.contains_tokens(&proposal.token_set()) {
                tracing::debug!("Skipping duplicate candidate {:?}", candidate.tokens);
                continue;
            }
            if !candidate.label.is_empty() {
                proposal.label.clone_from(&candidate.label);
            }
            proposal.affected_items = if candidate.affected_items.is_empty() {
                blocked.clone()
            } else {
                candidate.affected_items.clone()
            };
            added.push(proposal.id);
            self.proposals.insert(proposal.id, proposal);
        }

        tracing::info!(
            "Seeded {} proposal(s) from {} blocked item(s)",
            added.len(),
            blocked.len()
        );
        self.analysis = Some(analysis);
        added
    }

    /// Add a single proposal unless its token set is already present
    pub fn insert(&mut self, proposal: RelaxationProposal) -> Option<ProposalId> {
        if self.contains_tokens(&proposal.token_set()) {
            return None;
        }
        let id = proposal.id;
        self.proposals.insert(id, proposal);
        Some(id)
    }

    fn contains_tokens(&self, tokens: &BTreeSet<&str>) -> bool {
        self.proposals.values().any(|p| &p.token_set() == tokens)
    }

    /// Look up a proposal
    ///
    /// # Errors
    /// Returns [`RepairError::UnknownProposal`] if absent
    pub fn get(&self, id: ProposalId) -> Result<&RelaxationProposal, RepairError> {
        self.proposals
            .get(&id)
            .ok_or(RepairError::UnknownProposal(id))
    }

    /// Look up a proposal mutably
    ///
    /// # Errors
    /// Returns [`RepairError::UnknownProposal`] if absent
    pub fn get_mut(&mut self, id: ProposalId) -> Result<&mut RelaxationProposal, RepairError> {
        self.proposals
            .get_mut(&id)
            .ok_or(RepairError::UnknownProposal(id))
    }

    /// Proposals in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &RelaxationProposal> {
        self.proposals.values()
    }

    /// Ids with a given status, in order
    #[must_use]
    pub fn ids_with(&self, status: ProposalStatus) -> Vec<ProposalId> {
        self.proposals
            .values()
            .filter(|p| p.status == status)
            .map(|p| p.id)
            .collect()
    }

    /// Proposals whose effects and tokens are in force
    #[must_use]
    pub fn in_force(&self) -> BTreeSet<ProposalId> {
        self.proposals
            .values()
            .filter(|p| p.status.is_in_force())
            .map(|p| p.id)
            .collect()
    }

    /// Raw tokens of everything in force, in proposal order
    #[must_use]
    pub fn tokens_in_force(&self) -> Vec<String> {
        self.tokens_where(|s| s.is_in_force())
    }

    /// Raw tokens of applied proposals, in proposal order
    #[must_use]
    pub fn applied_tokens(&self) -> Vec<String> {
        self.tokens_where(|s| s == ProposalStatus::Applied)
    }

    fn tokens_where(&self, keep: impl Fn(ProposalStatus) -> bool) -> Vec<String> {
        self.proposals
            .values()
            .filter(|p| keep(p.status))
            .flat_map(|p| p.raw_tokens.iter().cloned())
            .collect()
    }

    /// Union of affected items for the given proposals, without repeats
    #[must_use]
    pub fn affected_items(&self, ids: &[ProposalId]) -> Vec<ItemId> {
        let mut items = Vec::new();
        for proposal in ids.iter().filter_map(|id| self.proposals.get(id)) {
            for item in &proposal.affected_items {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
        }
        items
    }

    /// The analysis the session was seeded from
    #[inline]
    #[must_use]
    pub fn analysis(&self) -> Option<&BlockingAnalysis> {
        self.analysis.as_ref()
    }

    /// Number of proposals
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    /// Whether the session is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    /// Keep only proposals matching `keep`
    pub fn retain(&mut self, keep: impl Fn(&RelaxationProposal) -> bool) {
        self.proposals.retain(|_, p| keep(p));
        if self.proposals.is_empty() {
            self.analysis = None;
        }
    }

    /// Drop everything
    pub fn clear(&mut self) {
        self.proposals.clear();
        self.analysis = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{BlockingDescriptor, RelaxCandidate};
    use pretty_assertions::assert_eq;

    fn analysis() -> BlockingAnalysis {
        BlockingAnalysis {
            blocking: vec![
                BlockingDescriptor {
                    item: ItemId::from("lecture-1"),
                    reason: "no room".into(),
                },
                BlockingDescriptor {
                    item: ItemId::from("lecture-2"),
                    reason: "lecturer away".into(),
                },
            ],
            relax_candidates: vec![
                RelaxCandidate {
                    label: String::new(),
                    tokens: vec!["enable-room B".into()],
                    affected_items: vec![ItemId::from("lecture-1")],
                },
                RelaxCandidate {
                    label: "Ask Ada".into(),
                    tokens: vec!["person-unavailable Ada 2025-03-04T09:00:00".into()],
                    affected_items: Vec::new(),
                },
                RelaxCandidate {
                    label: "same as first".into(),
                    tokens: vec![" enable-room B".into()],
                    affected_items: Vec::new(),
                },
            ],
        }
    }

    #[test]
    fn seed_skips_duplicate_token_sets() {
        let mut session = RepairSession::new();
        let added = session.seed(analysis());
        assert_eq!(added.len(), 2);

        let first = session.get(added[0]).unwrap();
        assert_eq!(first.label, "Enable room B");
        assert_eq!(first.affected_items, vec![ItemId::from("lecture-1")]);

        let second = session.get(added[1]).unwrap();
        assert_eq!(second.label, "Ask Ada");
        assert_eq!(second.affected_items.len(), 2);

        // Seeding again adds nothing
        assert!(session.seed(analysis()).is_empty());
    }

    #[test]
    fn tokens_follow_status() {
        let mut session = RepairSession::new();
        let added = session.seed(analysis());
        assert!(session.tokens_in_force().is_empty());

        session.get_mut(added[1]).unwrap().status = ProposalStatus::Staged;
        session.get_mut(added[0]).unwrap().status = ProposalStatus::Applied;
        assert_eq!(
            session.tokens_in_force(),
            vec![
                "enable-room B".to_string(),
                "person-unavailable Ada 2025-03-04T09:00:00".to_string()
            ]
        );
        assert_eq!(session.applied_tokens(), vec!["enable-room B".to_string()]);
    }
}
