//! Coordinator event handling against replayed solver streams

mod common;

use common::{harness, Setup};
use pretty_assertions::assert_eq;
use rota_core::{DatasetId, LiveSchedule, Placement, RunId, SchedulingContext, SnapshotId};
use rota_edit::{Conflict, Mutation};
use rota_session::{
    Command, DatasetSwitch, NoticeLevel, ReplayStep, SessionEvent, SolverMessage, SolverScript,
};
use rota_stream::{GateState, RunHandle, RunStatus, StreamStatus};
use rota_test_utils::fixtures::{feasible, item, partial, slot, unsatisfiable};
use rota_test_utils::ScriptedValidator;
use std::sync::Arc;
use std::time::Duration;

fn snapshot_after(delay_ms: u64, result: rota_core::SolveResult) -> ReplayStep {
    ReplayStep::Snapshot { delay_ms, result }
}

fn current_handle(h: &common::Harness) -> RunHandle {
    let run = h.state().stream().runs().current().unwrap();
    RunHandle::new(run.token())
}

#[tokio::test(start_paused = true)]
async fn streamed_run_discloses_and_adopts_first_feasible() {
    let mut h = harness(vec![SolverScript::streaming([
        partial(0, 1, 3),
        partial(1, 2, 3),
        feasible(2, 3),
    ])]);

    h.send(Command::Solve).await;
    h.settle().await;

    let view = h.view();
    let run = view.run.as_ref().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.id, Some(RunId::new("replay-1")));
    assert_eq!(run.accepted, 3);
    assert_eq!(view.stream_status, StreamStatus::Closed);
    assert_eq!(view.gate, GateState::Open);
    assert_eq!(
        view.alternatives.iter().map(|a| a.id).collect::<Vec<_>>(),
        (0..3).map(SnapshotId::Ordinal).collect::<Vec<_>>()
    );
    assert_eq!(view.selected, Some(SnapshotId::Ordinal(2)));
    assert!(!view.manual_preview);

    // The live schedule follows the auto-selected alternative
    assert_eq!(h.state().schedule().len(), 3);
    assert_eq!(view.placed, 3);
}

#[tokio::test(start_paused = true)]
async fn single_result_is_shown_when_the_run_ends() {
    let mut h = harness(vec![SolverScript::streaming([partial(0, 2, 3)])]);

    h.send(Command::Solve).await;
    h.pump_until(|s| s.stream().gate().pending_len() == 1).await;
    assert_eq!(h.view().gate, GateState::Pending);
    assert!(h.view().alternatives.is_empty());

    h.settle().await;
    let view = h.view();
    assert_eq!(view.gate, GateState::Open);
    assert_eq!(view.alternatives.len(), 1);
    assert_eq!(view.selected, None);
}

#[tokio::test(start_paused = true)]
async fn manual_selection_replaces_live_schedule() {
    let mut h = harness(vec![SolverScript::streaming([
        partial(0, 1, 3),
        partial(1, 2, 3),
    ])]);

    h.send(Command::Solve).await;
    h.settle().await;
    assert_eq!(h.state().schedule().len(), 0);

    h.send(Command::Select(SnapshotId::Ordinal(1))).await;
    let view = h.view();
    assert_eq!(view.selected, Some(SnapshotId::Ordinal(1)));
    assert!(view.manual_preview);
    assert_eq!(view.placed, 2);

    h.send(Command::Select(SnapshotId::Ordinal(9))).await;
    assert_eq!(h.view().selected, Some(SnapshotId::Ordinal(1)));
    assert_eq!(h.state().notices().iter().last().unwrap().level, NoticeLevel::Warning);
}

#[tokio::test(start_paused = true)]
async fn results_after_cancel_are_still_accepted() {
    let script = SolverScript::streaming([partial(0, 1, 3), partial(1, 2, 3)])
        .then(snapshot_after(1_000, feasible(2, 3)));
    let mut h = harness(vec![script]);

    h.send(Command::Solve).await;
    h.pump_until(|s| s.stream().runs().current().is_some_and(|r| r.accepted() == 2))
        .await;

    h.send(Command::Cancel).await;
    assert_eq!(h.view().run.unwrap().status, RunStatus::Cancelling);

    // A straggler produced before the solver saw the cancel
    let handle = current_handle(&h);
    h.inject(SessionEvent::Solver {
        handle,
        message: SolverMessage::Snapshot(Box::new(partial(5, 2, 3))),
    })
    .await;
    assert_eq!(h.view().alternatives.len(), 3);

    h.settle().await;
    let view = h.view();
    assert_eq!(view.run.unwrap().status, RunStatus::Cancelled);
    assert_eq!(view.alternatives.len(), 3);
    assert_eq!(h.solver.cancelled(), vec![RunId::new("replay-1")]);
    assert!(h
        .messages()
        .contains(&"Solve cancelled with a partial result".to_string()));
}

#[tokio::test(start_paused = true)]
async fn cancel_before_run_id_is_sent_once_id_arrives() {
    let script = SolverScript::default().then(snapshot_after(500, partial(0, 1, 3)));
    let mut h = harness(vec![script]);

    h.send(Command::Solve).await;
    h.send(Command::Cancel).await;
    assert!(h.solver.cancelled().is_empty());

    h.settle().await;
    assert_eq!(h.solver.cancelled(), vec![RunId::new("replay-1")]);
    let view = h.view();
    assert_eq!(view.run.unwrap().status, RunStatus::Cancelled);
    assert!(view.alternatives.is_empty());
    assert!(h.messages().contains(&"Solve cancelled".to_string()));
}

#[tokio::test(start_paused = true)]
async fn transport_failure_then_reconnect() {
    let dropped = SolverScript::streaming([partial(0, 1, 3)]).then(ReplayStep::Disconnect {
        delay_ms: 10,
        reason: "socket closed".into(),
    });
    let retry = SolverScript::streaming([feasible(0, 3)]);
    let mut h = harness(vec![dropped, retry]);

    h.send(Command::Solve).await;
    h.settle().await;

    let view = h.view();
    assert_eq!(view.run.as_ref().unwrap().status, RunStatus::Failed);
    assert_eq!(view.stream_status, StreamStatus::Error);
    assert!(view.can_reconnect);
    let failure = view.notices.last().unwrap();
    assert_eq!(failure.level, NoticeLevel::Error);
    assert!(failure.message.contains("socket closed"));

    h.send(Command::Reconnect).await;
    h.settle().await;

    let requests = h.solver.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], requests[1]);
    let view = h.view();
    assert_eq!(view.run.as_ref().unwrap().status, RunStatus::Completed);
    assert_eq!(view.stream_status, StreamStatus::Closed);
    assert!(!view.can_reconnect);

    h.send(Command::Reconnect).await;
    assert_eq!(h.solver.requests().len(), 2);
    assert_eq!(h.view().notices.last().unwrap().level, NoticeLevel::Warning);
}

#[tokio::test(start_paused = true)]
async fn infeasible_result_offers_analysis() {
    let mut h = harness(vec![SolverScript::default().with_final(unsatisfiable(3))]);

    h.send(Command::Solve).await;
    h.settle().await;

    let view = h.view();
    assert!(view.analysis_available);
    assert_eq!(view.notices.last().unwrap().level, NoticeLevel::Warning);
    assert!(view.proposals.is_empty());

    h.send(Command::Explain).await;
    let view = h.view();
    assert_eq!(view.proposals.len(), 3);
    assert!(!view.can_apply);
}

#[tokio::test(start_paused = true)]
async fn second_solve_while_running_is_refused() {
    let script = SolverScript::default().then(snapshot_after(100, feasible(0, 3)));
    let mut h = harness(vec![script]);

    h.send(Command::Solve).await;
    h.send(Command::Solve).await;
    let refused = h.view().notices.last().cloned().unwrap();
    assert_eq!(refused.level, NoticeLevel::Warning);

    h.settle().await;
    assert_eq!(h.solver.requests().len(), 1);
    assert_eq!(h.view().run.unwrap().status, RunStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn events_of_superseded_run_are_dropped_silently() {
    let mut h = harness(vec![
        SolverScript::streaming([feasible(0, 3)]),
        SolverScript::default().then(snapshot_after(1_000, feasible(0, 3))),
    ]);

    h.send(Command::Solve).await;
    h.settle().await;
    let old = current_handle(&h);

    h.send(Command::Solve).await;
    h.pump_until(|s| s.stream().runs().current().is_some_and(|r| r.id().is_some()))
        .await;
    let notices = h.state().notices().len();

    h.inject(SessionEvent::Solver {
        handle: old,
        message: SolverMessage::Snapshot(Box::new(partial(7, 2, 3))),
    })
    .await;
    h.inject(SessionEvent::Solver {
        handle: old,
        message: SolverMessage::Finished(Ok(Box::new(feasible(8, 3)))),
    })
    .await;

    let view = h.view();
    assert!(view.alternatives.is_empty());
    assert_eq!(view.run.unwrap().status, RunStatus::Running);
    assert_eq!(h.state().notices().len(), notices);
}

#[tokio::test(start_paused = true)]
async fn late_validation_of_replaced_edit_is_ignored() {
    let validator = Arc::new(
        ScriptedValidator::new()
            .then(
                Duration::from_millis(200),
                vec![Conflict {
                    item: item(0),
                    message: "room A double-booked".into(),
                }],
            )
            .then(Duration::from_millis(10), Vec::new()),
    );
    let mut h = Setup {
        validator: validator.clone(),
        ..Setup::default()
    }
    .build(Vec::new());

    h.send(Command::Edit(Mutation::Move {
        item: item(0),
        placement: Placement::new("A", slot(9)),
    }))
    .await;
    // Let the first validation reach the service
    tokio::time::sleep(Duration::from_millis(50)).await;

    h.send(Command::Edit(Mutation::Move {
        item: item(0),
        placement: Placement::new("B", slot(10)),
    }))
    .await;
    assert!(h.view().can_undo);

    h.coordinator.pump().await;
    h.coordinator.pump().await;

    assert_eq!(validator.seen().len(), 2);
    assert!(h.view().conflicts.is_empty());
    assert_eq!(
        h.state().schedule().placement(&item(0)),
        Some(&Placement::new("B", slot(10)))
    );
}

#[tokio::test(start_paused = true)]
async fn validation_queued_before_selection_is_ignored() {
    let validator = Arc::new(
        ScriptedValidator::new()
            .then(
                Duration::ZERO,
                vec![Conflict {
                    item: item(0),
                    message: "room A double-booked".into(),
                }],
            )
            .then(Duration::from_millis(10), Vec::new()),
    );
    let mut h = Setup {
        validator: validator.clone(),
        ..Setup::default()
    }
    .build(vec![SolverScript::streaming([
        partial(0, 1, 3),
        partial(1, 2, 3),
    ])]);
    h.send(Command::Solve).await;
    h.settle().await;

    h.send(Command::Edit(Mutation::Move {
        item: item(0),
        placement: Placement::new("A", slot(9)),
    }))
    .await;
    // The first answer is queued but not handled yet
    tokio::time::sleep(Duration::from_millis(5)).await;

    h.send(Command::Select(SnapshotId::Ordinal(1))).await;
    assert!(!h.view().can_undo);
    h.send(Command::Edit(Mutation::Move {
        item: item(0),
        placement: Placement::new("B", slot(10)),
    }))
    .await;

    h.coordinator.pump().await;
    assert!(h.view().conflicts.is_empty());
    h.coordinator.pump().await;

    assert_eq!(validator.seen().len(), 2);
    assert!(h.view().conflicts.is_empty());
    assert_eq!(
        h.state().schedule().placement(&item(0)),
        Some(&Placement::new("B", slot(10)))
    );
}

#[tokio::test(start_paused = true)]
async fn edit_failing_precheck_changes_nothing() {
    let mut h = harness(Vec::new());

    // Ada is unavailable at 11:00
    h.send(Command::Edit(Mutation::Move {
        item: item(0),
        placement: Placement::new("A", slot(11)),
    }))
    .await;

    let view = h.view();
    assert_eq!(view.placed, 0);
    assert!(!view.can_undo);
    assert_eq!(view.notices.last().unwrap().level, NoticeLevel::Warning);
}

#[tokio::test(start_paused = true)]
async fn dataset_switch_resets_the_session() {
    let mut h = harness(vec![SolverScript::streaming([feasible(0, 3)])]);

    h.send(Command::Solve).await;
    h.settle().await;
    h.send(Command::Explain).await;
    let first = h.proposals()[0];
    h.send(Command::Stage(first)).await;
    assert_eq!(h.view().proposals.len(), 3);

    let other = DatasetId::new("other");
    h.send(Command::SwitchDataset(Box::new(DatasetSwitch {
        dataset: other.clone(),
        schedule: LiveSchedule::new(),
        context: SchedulingContext::new().with_rooms(["Z"]),
    })))
    .await;

    let view = h.view();
    assert_eq!(view.dataset, other);
    assert!(view.proposals.is_empty());
    assert!(view.alternatives.is_empty());
    assert_eq!(view.placed, 0);
    assert!(!view.can_undo);
    assert_eq!(h.state().repairs().dataset(), &other);
    assert!(h.state().context().is_room_enabled("Z"));
}

#[tokio::test(start_paused = true)]
async fn event_loop_publishes_views() {
    let h = harness(vec![SolverScript::streaming([
        partial(0, 1, 3),
        feasible(1, 3),
    ])]);
    let mut handle = h.handle.clone();
    let task = tokio::spawn(h.coordinator.run());

    handle.send(Command::Solve).await.unwrap();
    let view = tokio::time::timeout(Duration::from_secs(60), handle.wait_for(|v| v.run_finished()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(view.alternatives.len(), 2);
    assert_eq!(view.selected, Some(SnapshotId::Ordinal(1)));
    assert_eq!(handle.view(), view);

    handle.send(Command::Shutdown).await.unwrap();
    task.await.unwrap();
}
