//! Repair staging and compensation engine
//!
//! Status changes never touch the system of record directly. After every
//! change the engine reconciles: the set of proposals in force is diffed
//! against the set whose effects are actually in place (`in_force`), removed
//! proposals are compensated, added ones run their forward effects once, and
//! the full token list is written in one call.
//!
//! `in_force` only ever records effects that really happened. A reconcile that
//! fails part way leaves it truthful, so the next reconcile converges.

use crate::analysis::BlockingAnalysis;
use crate::collab::{DisplayEntry, RepairDisplay, RepairStore, ResourceToggles};
use crate::effects::{EffectLedger, EffectTarget};
use crate::error::RepairError;
use crate::proposal::{ProposalStatus, RelaxationProposal};
use crate::session::RepairSession;
use crate::token::RepairToken;
use rota_core::{DatasetId, ItemId, ProposalId, SchedulingContext};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// What a reconcile did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffReport {
    /// Proposals whose forward effects ran
    pub added: Vec<ProposalId>,
    /// Proposals that were compensated
    pub removed: Vec<ProposalId>,
    /// Token list written to the store
    pub tokens: Vec<String>,
}

/// A validated Apply batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyPlan {
    /// Confirmed proposals in the batch
    pub proposals: Vec<ProposalId>,
    /// Full token list to persist
    pub tokens: Vec<String>,
    /// Items to reset before the new run
    pub affected_items: Vec<ItemId>,
    display: RepairDisplay,
}

/// Transactional workflow over relaxation proposals
pub struct StagingEngine {
    dataset: DatasetId,
    session: RepairSession,
    in_force: BTreeMap<ProposalId, EffectLedger>,
    store: Arc<dyn RepairStore>,
    toggles: Arc<dyn ResourceToggles>,
    persist_pending: bool,
}

impl std::fmt::Debug for StagingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagingEngine")
            .field("dataset", &self.dataset)
            .field("proposals", &self.session.len())
            .field("in_force", &self.in_force.len())
            .field("persist_pending", &self.persist_pending)
            .finish_non_exhaustive()
    }
}

impl StagingEngine {
    /// Create engine for a dataset
    pub fn new(
        dataset: DatasetId,
        store: Arc<dyn RepairStore>,
        toggles: Arc<dyn ResourceToggles>,
    ) -> Self {
        Self {
            dataset,
            session: RepairSession::new(),
            in_force: BTreeMap::new(),
            store,
            toggles,
            persist_pending: false,
        }
    }

    /// Current proposals
    #[inline]
    #[must_use]
    pub fn session(&self) -> &RepairSession {
        &self.session
    }

    /// Dataset the engine works on
    #[inline]
    #[must_use]
    pub fn dataset(&self) -> &DatasetId {
        &self.dataset
    }

    /// Last token write failed and has not been retried successfully
    #[inline]
    #[must_use]
    pub fn is_persist_pending(&self) -> bool {
        self.persist_pending
    }

    /// Recorded effects of a proposal in force
    #[must_use]
    pub fn ledger(&self, id: ProposalId) -> Option<&EffectLedger> {
        self.in_force.get(&id)
    }

    /// Add proposals from a blocking analysis
    pub fn seed(&mut self, analysis: BlockingAnalysis) -> Vec<ProposalId> {
        self.session.seed(analysis)
    }

    /// Add a hand-built proposal; `None` if its tokens are already proposed
    pub fn propose(&mut self, proposal: RelaxationProposal) -> Option<ProposalId> {
        self.session.insert(proposal.with_status(ProposalStatus::Proposed))
    }

    /// Stage one proposal
    ///
    /// # Errors
    /// - [`RepairError::IllegalTransition`] unless `Proposed` or `Reverted`
    /// - [`RepairError::SideEffect`] when a forward effect failed (rolled back)
    /// - [`RepairError::Persist`] when the token write failed (effects kept)
    pub async fn stage(
        &mut self,
        id: ProposalId,
        context: &mut SchedulingContext,
    ) -> Result<DiffReport, RepairError> {
        self.change(&[(id, ProposalStatus::Staged)], context).await
    }

    /// Unstage one proposal, compensating its effects
    ///
    /// # Errors
    /// See [`Self::stage`]
    pub async fn unstage(
        &mut self,
        id: ProposalId,
        context: &mut SchedulingContext,
    ) -> Result<DiffReport, RepairError> {
        self.change(&[(id, ProposalStatus::Proposed)], context).await
    }

    /// Make `wanted` the staged set.
    ///
    /// Proposed or reverted proposals in `wanted` are staged; staged ones not
    /// in it are unstaged. Confirmed and applied proposals are left alone.
    ///
    /// # Errors
    /// See [`Self::stage`]
    pub async fn set_staged(
        &mut self,
        wanted: &BTreeSet<ProposalId>,
        context: &mut SchedulingContext,
    ) -> Result<DiffReport, RepairError> {
        let changes: Vec<_> = self
            .session
            .iter()
            .filter_map(|p| match p.status {
                ProposalStatus::Proposed | ProposalStatus::Reverted if wanted.contains(&p.id) => {
                    Some((p.id, ProposalStatus::Staged))
                }
                ProposalStatus::Staged if !wanted.contains(&p.id) => {
                    Some((p.id, ProposalStatus::Proposed))
                }
                _ => None,
            })
            .collect();
        self.change(&changes, context).await
    }

    /// Mark a staged proposal eligible for Apply
    ///
    /// # Errors
    /// [`RepairError::IllegalTransition`] unless `Staged`
    pub fn confirm(&mut self, id: ProposalId) -> Result<(), RepairError> {
        self.session.get_mut(id)?.transition(ProposalStatus::Confirmed)
    }

    /// Take a confirmation back
    ///
    /// # Errors
    /// [`RepairError::IllegalTransition`] unless `Confirmed`
    pub fn unconfirm(&mut self, id: ProposalId) -> Result<(), RepairError> {
        self.session.get_mut(id)?.transition(ProposalStatus::Staged)
    }

    /// Revert an applied proposal, compensating its effects
    ///
    /// # Errors
    /// See [`Self::stage`]
    pub async fn revert(
        &mut self,
        id: ProposalId,
        context: &mut SchedulingContext,
    ) -> Result<DiffReport, RepairError> {
        self.change(&[(id, ProposalStatus::Reverted)], context).await
    }

    /// Validate an Apply batch: every confirmed proposal, all or nothing
    ///
    /// # Errors
    /// [`RepairError::NothingConfirmed`] when no proposal is confirmed
    pub fn prepare_apply(&self) -> Result<ApplyPlan, RepairError> {
        let proposals = self.session.ids_with(ProposalStatus::Confirmed);
        if proposals.is_empty() {
            return Err(RepairError::NothingConfirmed);
        }
        Ok(ApplyPlan {
            tokens: self.session.tokens_in_force(),
            affected_items: self.session.affected_items(&proposals),
            display: self.display(|p| {
                if proposals.contains(&p.id) {
                    ProposalStatus::Applied
                } else {
                    p.status
                }
            }),
            proposals,
        })
    }

    /// Write an Apply batch's token list. Nothing changes on failure.
    ///
    /// # Errors
    /// [`RepairError::Persist`] when the store refused the write
    pub async fn persist_apply(&mut self, plan: &ApplyPlan) -> Result<(), RepairError> {
        self.store
            .save_repairs(&self.dataset, &plan.tokens, &plan.display)
            .await
            .map_err(|e| {
                tracing::warn!("Apply persistence failed: {}", e);
                RepairError::Persist(e)
            })?;
        self.persist_pending = false;
        Ok(())
    }

    /// Mark a persisted batch `Applied`; returns the tokens for the new run
    ///
    /// # Errors
    /// [`RepairError::IllegalTransition`] if a proposal left `Confirmed`
    pub fn commit_apply(&mut self, plan: &ApplyPlan) -> Result<Vec<String>, RepairError> {
        for id in &plan.proposals {
            self.session.get_mut(*id)?.transition(ProposalStatus::Applied)?;
        }
        tracing::info!("Applied {} repair(s)", plan.proposals.len());
        Ok(self.session.applied_tokens())
    }

    /// Tokens of applied proposals
    #[must_use]
    pub fn applied_tokens(&self) -> Vec<String> {
        self.session.applied_tokens()
    }

    /// Rebuild applied proposals from the stored token list.
    ///
    /// Tokens already represented by a proposal are skipped. Returns the ids
    /// of the proposals created.
    ///
    /// # Errors
    /// [`RepairError::Load`] when the store could not be read
    pub async fn restore(
        &mut self,
        context: &mut SchedulingContext,
    ) -> Result<Vec<ProposalId>, RepairError> {
        let stored = self
            .store
            .get_repairs(&self.dataset)
            .await
            .map_err(RepairError::Load)?;

        let mut restored = Vec::new();
        for raw in &stored.tokens {
            let Some(token) = RepairToken::parse_lenient(raw) else {
                continue;
            };
            let mut proposal = RelaxationProposal::from_token(&token);
            proposal.raw_tokens = vec![raw.clone()];
            let entry = stored.display.entries.iter().find(|e| &e.token == raw);
            if let Some(entry) = entry {
                proposal.label.clone_from(&entry.label);
            }
            let Some(id) = self
                .session
                .insert(proposal.with_status(ProposalStatus::Applied))
            else {
                continue;
            };
            let recorded = entry.and_then(|e| e.effects.as_deref());
            self.in_force
                .insert(id, EffectLedger::reloaded(&token, recorded, context));
            restored.push(id);
        }

        tracing::info!("Restored {} applied repair(s) for {}", restored.len(), self.dataset);
        Ok(restored)
    }

    /// Withdraw everything not applied and forget the analysis
    ///
    /// # Errors
    /// See [`Self::stage`]
    pub async fn reset(&mut self, context: &mut SchedulingContext) -> Result<(), RepairError> {
        for id in self.session.ids_with(ProposalStatus::Confirmed) {
            self.unconfirm(id)?;
        }
        let keep: BTreeSet<ProposalId> = BTreeSet::new();
        self.set_staged(&keep, context).await?;
        self.session.retain(|p| p.status == ProposalStatus::Applied);
        Ok(())
    }

    /// Forget all proposals and effects without compensation (dataset change)
    pub fn discard(&mut self, dataset: DatasetId) {
        tracing::info!("Discarding repair session for {}", self.dataset);
        self.session.clear();
        self.in_force.clear();
        self.persist_pending = false;
        self.dataset = dataset;
    }

    /// Retry a failed token write
    ///
    /// # Errors
    /// [`RepairError::Persist`] when it fails again
    pub async fn flush(&mut self) -> Result<(), RepairError> {
        if self.persist_pending {
            self.persist().await?;
        }
        Ok(())
    }

    async fn change(
        &mut self,
        changes: &[(ProposalId, ProposalStatus)],
        context: &mut SchedulingContext,
    ) -> Result<DiffReport, RepairError> {
        let mut previous = Vec::with_capacity(changes.len());
        for (id, to) in changes {
            let moved = self.session.get_mut(*id).and_then(|p| {
                let from = p.status;
                p.transition(*to).map(|()| from)
            });
            match moved {
                Ok(from) => previous.push((*id, from)),
                Err(e) => {
                    self.restore_statuses(&previous);
                    return Err(e);
                }
            }
        }

        let mut report = match self.reconcile(context).await {
            Ok(report) => report,
            Err(e) => {
                self.restore_statuses(&previous);
                return Err(e);
            }
        };
        report.tokens = self.persist().await?;
        Ok(report)
    }

    fn restore_statuses(&mut self, previous: &[(ProposalId, ProposalStatus)]) {
        for (id, status) in previous.iter().rev() {
            if let Ok(proposal) = self.session.get_mut(*id) {
                proposal.status = *status;
            }
        }
    }

    async fn reconcile(
        &mut self,
        context: &mut SchedulingContext,
    ) -> Result<DiffReport, RepairError> {
        let wanted = self.session.in_force();
        let current: BTreeSet<ProposalId> = self.in_force.keys().copied().collect();
        let removed: Vec<ProposalId> = current.difference(&wanted).copied().collect();
        let added: Vec<ProposalId> = wanted.difference(&current).copied().collect();

        let mut target = EffectTarget {
            dataset: &self.dataset,
            context,
            toggles: self.toggles.as_ref(),
        };

        for id in &removed {
            let Some(mut ledger) = self.in_force.remove(id) else {
                continue;
            };
            if let Err(source) = ledger.compensate(&mut target).await {
                tracing::warn!("Compensation for {} incomplete: {}", id, source);
                self.in_force.insert(*id, ledger);
                return Err(RepairError::SideEffect { id: *id, source });
            }
            tracing::debug!("Compensated proposal {}", id);
        }

        let mut done: Vec<ProposalId> = Vec::with_capacity(added.len());
        for id in &added {
            let tokens = self.session.get(*id)?.tokens();
            let mut ledger = EffectLedger::new();
            let mut failure = None;
            for token in &tokens {
                if let Err(e) = ledger.forward(token, &mut target).await {
                    failure = Some(e);
                    break;
                }
            }

            let Some(source) = failure else {
                tracing::debug!("Forward effects for {} ({} recorded)", id, ledger.entries().len());
                self.in_force.insert(*id, ledger);
                done.push(*id);
                continue;
            };

            tracing::warn!("Forward effect for {} failed, rolling back: {}", id, source);
            if let Err(e) = ledger.compensate(&mut target).await {
                tracing::warn!("Rollback of {} incomplete: {}", id, e);
                self.in_force.insert(*id, ledger);
            }
            for prev in done.iter().rev() {
                if let Some(mut prev_ledger) = self.in_force.remove(prev) {
                    if let Err(e) = prev_ledger.compensate(&mut target).await {
                        tracing::warn!("Rollback of {} incomplete: {}", prev, e);
                        self.in_force.insert(*prev, prev_ledger);
                    }
                }
            }
            return Err(RepairError::SideEffect { id: *id, source });
        }

        Ok(DiffReport {
            added,
            removed,
            tokens: Vec::new(),
        })
    }

    fn display(&self, status_of: impl Fn(&RelaxationProposal) -> ProposalStatus) -> RepairDisplay {
        let entries = self
            .session
            .iter()
            .filter(|p| p.status.is_in_force())
            .flat_map(|p| {
                let status = status_of(p);
                let ledger = self.in_force.get(&p.id);
                p.raw_tokens.iter().map(move |raw| DisplayEntry {
                    token: raw.clone(),
                    label: p.label.clone(),
                    kind: p.kind,
                    status,
                    effects: RepairToken::parse_lenient(raw)
                        .zip(ledger)
                        .map(|(token, ledger)| ledger.store_effects_of(&token)),
                })
            })
            .collect();
        RepairDisplay { entries }
    }

    async fn persist(&mut self) -> Result<Vec<String>, RepairError> {
        let tokens = self.session.tokens_in_force();
        let result = if tokens.is_empty() {
            self.store.clear_repairs(&self.dataset).await
        } else {
            let display = self.display(|p| p.status);
            self.store.save_repairs(&self.dataset, &tokens, &display).await
        };

        match result {
            Ok(()) => {
                self.persist_pending = false;
                tracing::debug!("Persisted {} repair token(s)", tokens.len());
                Ok(tokens)
            }
            Err(e) => {
                tracing::warn!("Persisting repairs failed: {}", e);
                self.persist_pending = true;
                Err(RepairError::Persist(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{MockRepairStore, MockResourceToggles};
    use crate::error::StoreError;
    use crate::memory::{InMemoryRepairStore, InMemoryToggles};
    use pretty_assertions::assert_eq;
    use rota_core::AvailabilityRequestId;

    fn dataset() -> DatasetId {
        DatasetId::new("test")
    }

    fn proposal(raw: &str) -> RelaxationProposal {
        RelaxationProposal::from_raw_tokens([raw]).unwrap()
    }

    #[tokio::test]
    async fn failed_forward_effect_is_rolled_back() {
        let mut toggles = MockResourceToggles::new();
        toggles.expect_remove_person_unavailable().returning(|_, _, _| Ok(()));
        toggles
            .expect_create_availability_request()
            .returning(|_, _, _| Err(StoreError::Unavailable("down".into())));
        toggles
            .expect_add_person_unavailable()
            .times(1)
            .returning(|_, _, _| Ok(()));
        let mut store = MockRepairStore::new();
        store.expect_save_repairs().never();

        let mut engine = StagingEngine::new(dataset(), Arc::new(store), Arc::new(toggles));
        let p = proposal("person-unavailable Ada 2025-03-04T09:00:00");
        let slot = crate::token::RepairToken::parse_lenient(&p.raw_tokens[0])
            .and_then(|t| t.slot())
            .unwrap();
        let id = engine.propose(p).unwrap();

        let mut context = SchedulingContext::new().with_availability(
            "Ada",
            slot,
            rota_core::Availability::Unavailable,
        );
        let before = context.clone();

        let err = engine.stage(id, &mut context).await.unwrap_err();
        assert!(matches!(err, RepairError::SideEffect { .. }));
        assert!(err.is_retryable());
        assert_eq!(context, before);
        assert_eq!(engine.session().get(id).unwrap().status, ProposalStatus::Proposed);
        assert!(engine.ledger(id).is_none());
    }

    #[tokio::test]
    async fn persist_failure_keeps_effects_and_retries() {
        let toggles = Arc::new(InMemoryToggles::new());
        let mut store = MockRepairStore::new();
        let mut seq = mockall::Sequence::new();
        store
            .expect_save_repairs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Err(StoreError::Unavailable("offline".into())));
        store
            .expect_save_repairs()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));

        let mut engine = StagingEngine::new(dataset(), Arc::new(store), toggles.clone());
        let id = engine.propose(proposal("enable-room B")).unwrap();
        let mut context = SchedulingContext::new();

        assert!(matches!(
            engine.stage(id, &mut context).await,
            Err(RepairError::Persist(_))
        ));
        assert!(engine.is_persist_pending());
        assert!(context.is_room_enabled("B"));
        assert_eq!(engine.session().get(id).unwrap().status, ProposalStatus::Staged);

        engine.flush().await.unwrap();
        assert!(!engine.is_persist_pending());
    }

    #[tokio::test]
    async fn apply_requires_confirmation() {
        let mut engine = StagingEngine::new(
            dataset(),
            Arc::new(InMemoryRepairStore::new()),
            Arc::new(InMemoryToggles::new()),
        );
        let id = engine.propose(proposal("enable-room B")).unwrap();
        let mut context = SchedulingContext::new();
        engine.stage(id, &mut context).await.unwrap();

        assert!(matches!(engine.prepare_apply(), Err(RepairError::NothingConfirmed)));
        engine.confirm(id).unwrap();
        let plan = engine.prepare_apply().unwrap();
        engine.persist_apply(&plan).await.unwrap();
        assert_eq!(engine.commit_apply(&plan).unwrap(), vec!["enable-room B".to_string()]);
    }

    #[tokio::test]
    async fn apply_persist_failure_changes_nothing() {
        let mut store = MockRepairStore::new();
        store.expect_save_repairs().times(1).returning(|_, _, _| Ok(()));
        let mut engine =
            StagingEngine::new(dataset(), Arc::new(store), Arc::new(InMemoryToggles::new()));
        let id = engine.propose(proposal("extra-room seminar")).unwrap();
        let mut context = SchedulingContext::new();
        engine.stage(id, &mut context).await.unwrap();
        engine.confirm(id).unwrap();

        // Swap in a failing store for the Apply write
        let mut failing = MockRepairStore::new();
        failing
            .expect_save_repairs()
            .returning(|_, _, _| Err(StoreError::Rejected("quota".into())));
        engine.store = Arc::new(failing);

        let plan = engine.prepare_apply().unwrap();
        assert!(matches!(
            engine.persist_apply(&plan).await,
            Err(RepairError::Persist(_))
        ));
        assert_eq!(engine.session().get(id).unwrap().status, ProposalStatus::Confirmed);
    }

    #[tokio::test]
    async fn request_deletion_failure_keeps_remaining_effects() {
        let mut toggles = MockResourceToggles::new();
        let request = AvailabilityRequestId::new();
        toggles
            .expect_create_availability_request()
            .returning(move |_, _, _| Ok(request));
        toggles
            .expect_delete_availability_request()
            .returning(|_, _| Err(StoreError::Unavailable("down".into())));
        let mut store = MockRepairStore::new();
        store.expect_save_repairs().returning(|_, _, _| Ok(()));

        let mut engine = StagingEngine::new(dataset(), Arc::new(store), Arc::new(toggles));
        let id = engine
            .propose(proposal("person-unavailable Ada 2025-03-04T09:00:00"))
            .unwrap();
        let mut context = SchedulingContext::new();
        engine.stage(id, &mut context).await.unwrap();

        assert!(matches!(
            engine.unstage(id, &mut context).await,
            Err(RepairError::SideEffect { .. })
        ));
        // Still staged, and the request is still recorded for a retry
        assert_eq!(engine.session().get(id).unwrap().status, ProposalStatus::Staged);
        assert_eq!(engine.ledger(id).unwrap().entries().len(), 2);
    }
}
