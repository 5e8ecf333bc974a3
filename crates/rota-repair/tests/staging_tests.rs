//! Staging engine against the in-memory system of record

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rota_core::{Availability, ProposalId, SchedulingContext};
use rota_repair::{
    InMemoryRepairStore, InMemoryToggles, ProposalKind, ProposalStatus, RelaxationProposal,
    RepairError, RepairStore, SideEffect, StagingEngine, ToggleState,
};
use rota_test_utils::fixtures::{analysis, context, dataset, item, slot};
use rota_test_utils::FlakyStore;
use std::collections::BTreeSet;
use std::sync::Arc;

fn toggle_state() -> ToggleState {
    ToggleState {
        enabled_rooms: ["A", "B"].into_iter().map(String::from).collect(),
        unavailable: [("Ada".to_string(), slot(11))].into_iter().collect(),
        ..ToggleState::default()
    }
}

struct Harness {
    engine: StagingEngine,
    store: Arc<InMemoryRepairStore>,
    toggles: Arc<InMemoryToggles>,
    context: SchedulingContext,
    ids: Vec<ProposalId>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryRepairStore::new());
    let toggles = Arc::new(InMemoryToggles::new().with_state(dataset(), toggle_state()));
    let mut engine = StagingEngine::new(dataset(), store.clone(), toggles.clone());
    let ids = engine.seed(analysis());
    Harness {
        engine,
        store,
        toggles,
        context: context(),
        ids,
    }
}

fn set(ids: &[ProposalId]) -> BTreeSet<ProposalId> {
    ids.iter().copied().collect()
}

#[tokio::test]
async fn staging_then_unstaging_is_symmetric() {
    let mut h = harness();
    assert_eq!(h.ids.len(), 3);

    h.engine
        .set_staged(&set(&h.ids), &mut h.context)
        .await
        .unwrap();

    assert!(h.context.is_room_enabled("C"));
    assert!(h.context.is_pool_room("Annex"));
    assert!(h.context.is_room_enabled("Annex"));
    assert_eq!(
        h.context.availability("Ada", &slot(11)),
        Some(Availability::Requested)
    );
    assert_eq!(
        h.store.tokens(&dataset()),
        vec![
            "enable-room C".to_string(),
            "add-pool-room Annex".to_string(),
            "person-unavailable Ada 2025-03-03T11:00:00".to_string(),
        ]
    );
    let staged = h.toggles.state(&dataset());
    assert!(staged.enabled_rooms.contains("C"));
    assert!(staged.unavailable.is_empty());
    assert_eq!(staged.requests.len(), 1);

    h.engine.set_staged(&BTreeSet::new(), &mut h.context).await.unwrap();

    assert_eq!(h.context, context());
    assert_eq!(h.toggles.state(&dataset()), toggle_state());
    assert!(h.store.tokens(&dataset()).is_empty());
}

#[tokio::test]
async fn set_staged_only_touches_the_difference() {
    let mut h = harness();
    let (a, b, c) = (h.ids[0], h.ids[1], h.ids[2]);

    h.engine.set_staged(&set(&[a, b]), &mut h.context).await.unwrap();
    let report = h.engine.set_staged(&set(&[b, c]), &mut h.context).await.unwrap();

    assert_eq!(report.added, vec![c]);
    assert_eq!(report.removed, vec![a]);
    assert!(!h.context.is_room_enabled("C"));
    assert!(h.context.is_pool_room("Annex"));
    assert_eq!(h.engine.session().get(a).unwrap().status, ProposalStatus::Proposed);
    assert_eq!(h.engine.session().get(c).unwrap().status, ProposalStatus::Staged);
}

#[tokio::test]
async fn already_enabled_room_records_no_effect() {
    let store = Arc::new(InMemoryRepairStore::new());
    let toggles = Arc::new(InMemoryToggles::new());
    let mut engine = StagingEngine::new(dataset(), store, toggles.clone());
    let mut ctx = context();
    let mut candidates = analysis();
    candidates.relax_candidates[0].tokens = vec!["enable-room A".into()];
    let ids = engine.seed(candidates);

    engine.stage(ids[0], &mut ctx).await.unwrap();
    assert!(engine.ledger(ids[0]).unwrap().is_empty());

    engine.unstage(ids[0], &mut ctx).await.unwrap();
    // Room A was enabled before staging and stays enabled
    assert!(ctx.is_room_enabled("A"));
    assert_eq!(toggles.call_count(), 0);
}

#[tokio::test]
async fn failed_write_keeps_effects_until_flushed() {
    let store = Arc::new(FlakyStore::new());
    let toggles = Arc::new(InMemoryToggles::new());
    let mut engine = StagingEngine::new(dataset(), store.clone(), toggles);
    let mut ctx = context();
    let ids = engine.seed(analysis());

    store.set_failing(true);
    let err = engine.stage(ids[0], &mut ctx).await.unwrap_err();
    assert!(matches!(err, RepairError::Persist(_)));
    assert!(err.is_retryable());
    assert!(engine.is_persist_pending());
    assert!(ctx.is_room_enabled("C"));
    assert_eq!(engine.session().get(ids[0]).unwrap().status, ProposalStatus::Staged);

    assert!(engine.flush().await.is_err());

    store.set_failing(false);
    engine.flush().await.unwrap();
    assert!(!engine.is_persist_pending());
    assert_eq!(store.tokens(&dataset()), vec!["enable-room C".to_string()]);
}

#[tokio::test]
async fn apply_then_revert() {
    let mut h = harness();
    let room = h.ids[0];

    assert!(matches!(
        h.engine.prepare_apply(),
        Err(RepairError::NothingConfirmed)
    ));

    h.engine.stage(room, &mut h.context).await.unwrap();
    h.engine.confirm(room).unwrap();
    let plan = h.engine.prepare_apply().unwrap();
    assert_eq!(plan.proposals, vec![room]);
    assert_eq!(plan.affected_items, vec![item(2)]);

    h.engine.persist_apply(&plan).await.unwrap();
    let tokens = h.engine.commit_apply(&plan).unwrap();
    assert_eq!(tokens, vec!["enable-room C".to_string()]);
    assert_eq!(h.engine.session().get(room).unwrap().status, ProposalStatus::Applied);

    // Applied proposals cannot be unstaged, only reverted
    assert!(matches!(
        h.engine.unstage(room, &mut h.context).await,
        Err(RepairError::IllegalTransition { .. })
    ));

    let report = h.engine.revert(room, &mut h.context).await.unwrap();
    assert_eq!(report.removed, vec![room]);
    assert!(!h.context.is_room_enabled("C"));
    assert!(h.store.tokens(&dataset()).is_empty());
    assert!(h.engine.applied_tokens().is_empty());
}

#[tokio::test]
async fn failed_apply_write_changes_nothing() {
    let store = Arc::new(FlakyStore::new());
    let mut engine = StagingEngine::new(dataset(), store.clone(), Arc::new(InMemoryToggles::new()));
    let mut ctx = context();
    let ids = engine.seed(analysis());
    engine.stage(ids[1], &mut ctx).await.unwrap();
    engine.confirm(ids[1]).unwrap();

    let plan = engine.prepare_apply().unwrap();
    store.set_failing(true);
    assert!(engine.persist_apply(&plan).await.is_err());
    assert_eq!(engine.session().get(ids[1]).unwrap().status, ProposalStatus::Confirmed);
    assert!(engine.applied_tokens().is_empty());
}

#[tokio::test]
async fn restore_rebuilds_applied_proposals() {
    let store = Arc::new(InMemoryRepairStore::new().with_tokens(
        dataset(),
        vec!["enable-room C".into(), "  reserve-hall North ".into()],
    ));
    let toggles = Arc::new(InMemoryToggles::new());
    let mut engine = StagingEngine::new(dataset(), store.clone(), toggles.clone());
    let mut ctx = context();

    let restored = engine.restore(&mut ctx).await.unwrap();
    assert_eq!(restored.len(), 2);
    assert!(ctx.is_room_enabled("C"));

    let unknown = engine.session().get(restored[1]).unwrap();
    assert_eq!(unknown.kind, ProposalKind::ExtraRoomGeneric);
    assert_eq!(unknown.raw_tokens, vec!["  reserve-hall North ".to_string()]);
    assert_eq!(unknown.status, ProposalStatus::Applied);

    // Restoring twice does not duplicate
    assert!(engine.restore(&mut ctx).await.unwrap().is_empty());

    engine.revert(restored[0], &mut ctx).await.unwrap();
    assert!(!ctx.is_room_enabled("C"));
    assert_eq!(
        store.tokens(&dataset()),
        vec!["  reserve-hall North ".to_string()]
    );
}

async fn apply_one(engine: &mut StagingEngine, id: ProposalId, ctx: &mut SchedulingContext) {
    engine.stage(id, ctx).await.unwrap();
    engine.confirm(id).unwrap();
    let plan = engine.prepare_apply().unwrap();
    engine.persist_apply(&plan).await.unwrap();
    engine.commit_apply(&plan).unwrap();
}

#[tokio::test]
async fn reverting_reloaded_request_withdraws_only_the_request() {
    let store = Arc::new(InMemoryRepairStore::new());
    let toggles = Arc::new(InMemoryToggles::new());
    let before = toggles.state(&dataset());

    let mut first = StagingEngine::new(dataset(), store.clone(), toggles.clone());
    let bob = RelaxationProposal::from_raw_tokens(["person-unavailable Bob 2025-03-03T09:00:00"])
        .unwrap();
    let id = first.propose(bob).unwrap();
    apply_one(&mut first, id, &mut context()).await;
    assert_eq!(toggles.state(&dataset()).requests.len(), 1);

    let stored = store.get_repairs(&dataset()).await.unwrap();
    let effects = stored.display.entries[0].effects.clone().unwrap();
    assert!(matches!(effects.as_slice(), [SideEffect::RequestCreated { .. }]));

    // A later session reloads the repair and takes it back
    let mut second = StagingEngine::new(dataset(), store.clone(), toggles.clone());
    let mut ctx = context();
    let restored = second.restore(&mut ctx).await.unwrap();
    assert_eq!(ctx.availability("Bob", &slot(9)), Some(Availability::Requested));
    second.revert(restored[0], &mut ctx).await.unwrap();

    assert_eq!(toggles.state(&dataset()), before);
    assert!(store.tokens(&dataset()).is_empty());
    assert_eq!(ctx, context());
}

#[tokio::test]
async fn reverting_reloaded_unavailability_restores_the_record() {
    let mut h = harness();
    let ada = h.ids[2];
    apply_one(&mut h.engine, ada, &mut h.context).await;
    assert!(h.toggles.state(&dataset()).unavailable.is_empty());

    let mut second = StagingEngine::new(dataset(), h.store.clone(), h.toggles.clone());
    let mut ctx = context();
    let restored = second.restore(&mut ctx).await.unwrap();
    second.revert(restored[0], &mut ctx).await.unwrap();

    assert_eq!(h.toggles.state(&dataset()), toggle_state());
    assert_eq!(
        ctx.availability("Ada", &slot(11)),
        Some(Availability::Unavailable)
    );
}

#[tokio::test]
async fn reset_withdraws_everything_not_applied() {
    let mut h = harness();
    let (a, b, c) = (h.ids[0], h.ids[1], h.ids[2]);

    h.engine.stage(a, &mut h.context).await.unwrap();
    h.engine.confirm(a).unwrap();
    let plan = h.engine.prepare_apply().unwrap();
    h.engine.persist_apply(&plan).await.unwrap();
    h.engine.commit_apply(&plan).unwrap();

    h.engine.stage(b, &mut h.context).await.unwrap();
    h.engine.stage(c, &mut h.context).await.unwrap();
    h.engine.confirm(c).unwrap();

    h.engine.reset(&mut h.context).await.unwrap();

    assert_eq!(h.engine.session().len(), 1);
    assert_eq!(h.engine.session().get(a).unwrap().status, ProposalStatus::Applied);
    assert!(h.context.is_room_enabled("C"));
    assert!(!h.context.is_pool_room("Annex"));
    assert_eq!(
        h.context.availability("Ada", &slot(11)),
        Some(Availability::Unavailable)
    );
    assert_eq!(h.store.tokens(&dataset()), vec!["enable-room C".to_string()]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn any_toggle_sequence_keeps_store_in_step(steps in proptest::collection::vec(0usize..3, 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            let mut h = harness();
            let mut staged = BTreeSet::new();

            for step in steps {
                let id = h.ids[step];
                if !staged.remove(&id) {
                    staged.insert(id);
                }
                h.engine.set_staged(&staged, &mut h.context).await.unwrap();
                assert_eq!(
                    h.store.tokens(&dataset()),
                    h.engine.session().tokens_in_force()
                );
            }

            h.engine.set_staged(&BTreeSet::new(), &mut h.context).await.unwrap();
            assert_eq!(h.context, context());
            assert_eq!(h.toggles.state(&dataset()), toggle_state());
        });
    }
}
