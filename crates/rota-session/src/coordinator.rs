//! Session coordinator
//!
//! Owns the [`SessionState`] and a single event queue. Solver output,
//! validation answers, user commands and clock ticks all arrive on that
//! queue and are handled one at a time, to completion, in arrival order. The
//! derived view is republished after every event.
//!
//! Background work (solver runs, cancel requests, validations) runs in
//! spawned tasks that only ever talk back through the queue.

use crate::error::SessionError;
use crate::event::{Command, DatasetSwitch, SessionEvent, SolverMessage};
use crate::notice::Notice;
use crate::service::{ExplanationService, SolverService, StreamSink};
use crate::state::SessionState;
use crate::view::{derive_all, DerivedView};
use rota_core::{
    CoordinatorConfig, LiveSchedule, RunId, SchedulingContext, SnapshotId, SolveOptions,
    SolveResult,
};
use rota_edit::{PendingValidation, ValidationOutcome, ValidationReport, Validator};
use rota_repair::{RepairStore, ResourceToggles, StagingEngine};
use rota_stream::{IngestOutcome, RunHandle, RunOutcome, StreamError, StreamStatus};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Capacity of the coordinator's event queue
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// External services the coordinator talks to
#[derive(Clone)]
pub struct Collaborators {
    /// Remote solver
    pub solver: Arc<dyn SolverService>,
    /// Blocking analysis provider
    pub explainer: Arc<dyn ExplanationService>,
    /// Edit validation
    pub validator: Arc<dyn Validator>,
    /// Repair token store
    pub store: Arc<dyn RepairStore>,
    /// Resource switches in the system of record
    pub toggles: Arc<dyn ResourceToggles>,
}

/// Cloneable handle for feeding commands and watching the view
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    events: mpsc::Sender<SessionEvent>,
    view: watch::Receiver<DerivedView>,
}

impl CoordinatorHandle {
    /// Queue a command
    ///
    /// # Errors
    /// [`SessionError::ChannelClosed`] after shutdown
    pub async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.events
            .send(SessionEvent::Command(command))
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }

    /// Latest published view
    #[must_use]
    pub fn view(&self) -> DerivedView {
        self.view.borrow().clone()
    }

    /// Wait until the published view satisfies `done`
    ///
    /// # Errors
    /// [`SessionError::ChannelClosed`] if the coordinator stops first
    pub async fn wait_for(
        &mut self,
        done: impl FnMut(&DerivedView) -> bool,
    ) -> Result<DerivedView, SessionError> {
        self.view
            .wait_for(done)
            .await
            .map(|view| view.clone())
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// The event loop
pub struct Coordinator {
    state: SessionState,
    solver: Arc<dyn SolverService>,
    explainer: Arc<dyn ExplanationService>,
    validator: Arc<dyn Validator>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: mpsc::Receiver<SessionEvent>,
    view_tx: watch::Sender<DerivedView>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator and its handle
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        schedule: LiveSchedule,
        context: SchedulingContext,
        collaborators: Collaborators,
    ) -> (Self, CoordinatorHandle) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let repairs = StagingEngine::new(
            config.dataset_id.clone(),
            collaborators.store,
            collaborators.toggles,
        );
        let state = SessionState::new(config, repairs, schedule, context);
        let (view_tx, view_rx) = watch::channel(derive_all(&state));

        let handle = CoordinatorHandle {
            events: events_tx.clone(),
            view: view_rx,
        };
        let coordinator = Self {
            state,
            solver: collaborators.solver,
            explainer: collaborators.explainer,
            validator: collaborators.validator,
            events_tx,
            events_rx,
            view_tx,
        };
        (coordinator, handle)
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// View of the current state
    #[must_use]
    pub fn view(&self) -> DerivedView {
        derive_all(&self.state)
    }

    /// Process events until [`Command::Shutdown`], with clock ticks in between
    pub async fn run(mut self) {
        let period = Duration::from_millis(self.state.config.tick_interval_ms.max(1));
        let mut ticks = tokio::time::interval(period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Coordinator started for {}", self.state.config.dataset_id);
        loop {
            let event = tokio::select! {
                biased;
                event = self.events_rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
                _ = ticks.tick() => SessionEvent::Tick,
            };
            if matches!(event, SessionEvent::Command(Command::Shutdown)) {
                break;
            }
            self.dispatch(event).await;
        }
        tracing::info!("Coordinator stopped");
    }

    /// Wait for the next queued event and handle it
    pub async fn pump(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.dispatch(event).await;
                true
            }
            None => false,
        }
    }

    /// Handle queued events until `done` holds
    pub async fn pump_until(&mut self, mut done: impl FnMut(&SessionState) -> bool) {
        while !done(&self.state) {
            if !self.pump().await {
                break;
            }
        }
    }

    /// Handle one event to completion and publish the view
    pub async fn dispatch(&mut self, event: SessionEvent) {
        if let Err(e) = self.handle(event).await {
            if e.is_stale() {
                tracing::debug!("Ignoring stale event: {}", e);
            } else {
                tracing::warn!("{}", e);
                self.state.notices.push(Notice::from_error(&e));
            }
        }
        self.view_tx.send_replace(derive_all(&self.state));
    }

    async fn handle(&mut self, event: SessionEvent) -> Result<(), SessionError> {
        match event {
            SessionEvent::Command(command) => self.command(command).await,
            SessionEvent::Solver { handle, message } => self.solver_message(handle, message),
            SessionEvent::Validated(report) => {
                self.validated(report);
                Ok(())
            }
            SessionEvent::Notice(notice) => {
                self.state.notices.push(notice);
                Ok(())
            }
            SessionEvent::Tick => {
                self.tick();
                Ok(())
            }
        }
    }

    async fn command(&mut self, command: Command) -> Result<(), SessionError> {
        let state = &mut self.state;
        match command {
            Command::Solve => {
                let options = self.solve_options(self.state.repairs.applied_tokens());
                self.start(options)?;
            }
            Command::Cancel => {
                if !self.cancel_active() {
                    return Err(StreamError::NoActiveRun.into());
                }
            }
            Command::Reconnect => self.reconnect()?,
            Command::ShowAnyway => {
                state.stream.show_anyway()?;
            }
            Command::Select(id) => {
                state.stream.select(id)?;
                self.adopt(id);
            }
            Command::ClearSelection => state.stream.clear_selection(),
            Command::Dismiss => state.stream.dismiss(),
            Command::Edit(mutation) => {
                let pending =
                    state
                        .edits
                        .submit(mutation, &mut state.schedule, &mut state.context)?;
                self.spawn_validation(pending);
            }
            Command::Undo => {
                let pending = state.edits.undo(&mut state.schedule, &mut state.context)?;
                self.spawn_validation(pending);
            }
            Command::Redo => {
                let pending = state.edits.redo(&mut state.schedule, &mut state.context)?;
                self.spawn_validation(pending);
            }
            Command::Explain => self.explain().await?,
            Command::Stage(id) => {
                state.repairs.stage(id, &mut state.context).await?;
            }
            Command::Unstage(id) => {
                state.repairs.unstage(id, &mut state.context).await?;
            }
            Command::SetStaged(wanted) => {
                state.repairs.set_staged(&wanted, &mut state.context).await?;
            }
            Command::Confirm(id) => state.repairs.confirm(id)?,
            Command::Unconfirm(id) => state.repairs.unconfirm(id)?,
            Command::Apply => self.apply().await?,
            Command::Revert(id) => {
                state.repairs.revert(id, &mut state.context).await?;
            }
            Command::RestoreRepairs => {
                let restored = state.repairs.restore(&mut state.context).await?;
                if !restored.is_empty() {
                    state
                        .notices
                        .push(Notice::info(format!("Restored {} applied repair(s)", restored.len())));
                }
            }
            Command::FlushRepairs => state.repairs.flush().await?,
            Command::ResetRepairs => state.repairs.reset(&mut state.context).await?,
            Command::SwitchDataset(switch) => self.switch_dataset(*switch),
            Command::Shutdown => {}
        }
        Ok(())
    }

    fn solver_message(
        &mut self,
        handle: RunHandle,
        message: SolverMessage,
    ) -> Result<(), SessionError> {
        match message {
            SolverMessage::RunId(id) => {
                if let Some(id) = self.state.stream.on_run_id(handle, id)? {
                    self.send_cancel(id);
                }
            }
            SolverMessage::Snapshot(result) => {
                let outcome = self.state.stream.ingest(handle, *result);
                if let IngestOutcome::Disclosed {
                    auto_selected: Some(id),
                    ..
                } = outcome
                {
                    self.adopt(id);
                }
            }
            SolverMessage::Status(status) => self.state.stream.set_stream_status(handle, status),
            SolverMessage::Finished(result) => self.finished(handle, result.map(|r| *r))?,
        }
        Ok(())
    }

    fn finished(
        &mut self,
        handle: RunHandle,
        result: Result<SolveResult, String>,
    ) -> Result<(), SessionError> {
        let selected_before = self.state.stream.selection().selected();
        let report = self.state.stream.finish(handle, result)?;
        self.tick();

        let state = &mut self.state;
        match &report.outcome {
            RunOutcome::Failed { reason } => {
                state.notices.push(Notice::error(format!(
                    "Solve failed: {reason}. Reconnect to retry."
                )));
            }
            RunOutcome::Cancelled { partial: true } => {
                state
                    .notices
                    .push(Notice::info("Solve cancelled with a partial result"));
            }
            RunOutcome::Cancelled { partial: false } => {
                state.notices.push(Notice::info("Solve cancelled"));
            }
            RunOutcome::Completed if report.infeasible => {
                state.analysis_available = true;
                state.notices.push(Notice::warning(
                    "No schedule places every item. Ask for an explanation to see repair options.",
                ));
            }
            RunOutcome::Completed => {}
        }

        let selected_after = state.stream.selection().selected();
        if let Some(id) = selected_after.filter(|id| Some(*id) != selected_before) {
            self.adopt(id);
        }

        if let Some(options) = self.state.pending_start.take() {
            tracing::info!("Starting deferred run");
            self.start(options)?;
        }
        Ok(())
    }

    fn start(&mut self, options: SolveOptions) -> Result<RunHandle, SessionError> {
        let handle = self.state.stream.start(options.clone())?;
        self.state.elapsed_secs = 0;

        let sink = StreamSink::new(handle, self.events_tx.clone());
        let solver = Arc::clone(&self.solver);
        tokio::spawn(async move {
            let result = solver
                .solve(options, sink.clone())
                .await
                .map_err(|e| e.to_string());
            if sink.finish(result).await.is_err() {
                tracing::debug!("Coordinator gone before {} finished", handle.token());
            }
        });
        Ok(handle)
    }

    fn solve_options(&self, repairs: Vec<String>) -> SolveOptions {
        let options = SolveOptions::new(self.state.config.dataset_id.clone()).with_repairs(repairs);
        if self.state.config.must_fix {
            options.with_must_fix(self.state.schedule.pinned_assignments())
        } else {
            options
        }
    }

    /// Returns whether a run was told to stop
    fn cancel_active(&mut self) -> bool {
        match self.state.stream.cancel_active() {
            Some((_, Some(id))) => {
                self.send_cancel(id);
                true
            }
            // Sent once the solver reports the run id
            Some((_, None)) => true,
            None => false,
        }
    }

    fn send_cancel(&self, id: RunId) {
        let solver = Arc::clone(&self.solver);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = solver.cancel_run(&id).await {
                tracing::warn!("Cancel request for {} failed: {}", id, e);
                let notice = Notice::warning(format!("Could not cancel run {id}: {e}"));
                let _ = events.send(SessionEvent::Notice(notice)).await;
            }
        });
    }

    fn reconnect(&mut self) -> Result<(), SessionError> {
        let runs = self.state.stream.runs();
        if self.state.stream.stream_status() != StreamStatus::Error || runs.is_active() {
            return Err(SessionError::NothingToReconnect);
        }
        let options = runs
            .current()
            .map(|r| r.options().clone())
            .ok_or(SessionError::NothingToReconnect)?;
        tracing::info!("Reconnecting");
        self.start(options)?;
        Ok(())
    }

    /// Make the selected alternative the live schedule
    fn adopt(&mut self, id: SnapshotId) {
        let Some(snapshot) = self.state.stream.buffer().get(id) else {
            return;
        };
        let assignments = snapshot.payload().assignments.clone();
        self.state.schedule.replace_with(&assignments);
        self.state.edits.reset();
        tracing::debug!("Live schedule follows snapshot {}", id);
    }

    fn spawn_validation(&self, pending: PendingValidation) {
        let validator = Arc::clone(&self.validator);
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let report = pending.run(validator).await;
            let _ = events.send(SessionEvent::Validated(report)).await;
        });
    }

    fn validated(&mut self, report: ValidationReport) {
        if let ValidationOutcome::Failed(e) = self.state.edits.on_report(report) {
            self.state
                .notices
                .push(Notice::warning(format!("Edit could not be validated: {e}")));
        }
    }

    async fn explain(&mut self) -> Result<(), SessionError> {
        let dataset = self.state.config.dataset_id.clone();
        let analysis = self.explainer.explain(&dataset).await?;
        let added = self.state.repairs.seed(analysis);
        self.state
            .notices
            .push(Notice::info(format!("{} repair option(s) proposed", added.len())));
        Ok(())
    }

    /// Apply every confirmed proposal and re-solve.
    ///
    /// The active run is cancelled and its alternatives dropped, affected
    /// items are taken off the live schedule, and the token list is written.
    /// If the write fails the live schedule goes back to how it was and no
    /// run is started. If the cancelled run has not ended yet, the new run
    /// starts as soon as it does.
    async fn apply(&mut self) -> Result<(), SessionError> {
        let plan = self.state.repairs.prepare_apply()?;

        self.cancel_active();
        self.state.stream.dismiss();

        let baseline = self.state.schedule.clone();
        let removed = self
            .state
            .schedule
            .unschedule_items(&plan.affected_items, self.state.config.must_fix);
        tracing::debug!("Cleared {} placement(s) before re-solve", removed.len());

        if let Err(e) = self.state.repairs.persist_apply(&plan).await {
            self.state.schedule = baseline;
            return Err(e.into());
        }
        let tokens = self.state.repairs.commit_apply(&plan)?;
        self.state.edits.reset();
        self.state.analysis_available = false;
        self.state.notices.push(Notice::info(format!(
            "Applied {} repair(s), solving again",
            plan.proposals.len()
        )));

        let options = self.solve_options(tokens);
        if self.state.stream.runs().is_active() {
            self.state.pending_start = Some(options);
        } else {
            self.start(options)?;
        }
        Ok(())
    }

    fn switch_dataset(&mut self, switch: DatasetSwitch) {
        let DatasetSwitch {
            dataset,
            schedule,
            context,
        } = switch;
        tracing::info!("Switching to dataset {}", dataset);

        self.cancel_active();
        let state = &mut self.state;
        state.pending_start = None;
        state.stream.dismiss();
        state.repairs.discard(dataset.clone());
        state.edits.reset();
        state.schedule = schedule;
        state.context = context;
        state.config.dataset_id = dataset;
        state.analysis_available = false;
        state.elapsed_secs = 0;
    }

    fn tick(&mut self) {
        if let Some(run) = self.state.stream.runs().current() {
            self.state.elapsed_secs = run.elapsed(Instant::now()).as_secs();
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SolverError;
    use crate::notice::NoticeLevel;
    use crate::replay::PermissiveValidator;
    use crate::service::{MockExplanationService, MockSolverService};
    use rota_repair::{InMemoryRepairStore, InMemoryToggles};
    use rota_stream::RunStatus;

    fn coordinator(solver: MockSolverService, explainer: MockExplanationService) -> Coordinator {
        let collaborators = Collaborators {
            solver: Arc::new(solver),
            explainer: Arc::new(explainer),
            validator: Arc::new(PermissiveValidator),
            store: Arc::new(InMemoryRepairStore::new()),
            toggles: Arc::new(InMemoryToggles::new()),
        };
        let (coordinator, _handle) = Coordinator::new(
            CoordinatorConfig::new(),
            LiveSchedule::new(),
            SchedulingContext::new(),
            collaborators,
        );
        coordinator
    }

    #[tokio::test]
    async fn explanation_failure_becomes_error_notice() {
        let mut explainer = MockExplanationService::new();
        explainer
            .expect_explain()
            .times(1)
            .returning(|_| Err(SolverError::Rejected("no analysis".into())));
        let mut c = coordinator(MockSolverService::new(), explainer);

        c.dispatch(Command::Explain.into()).await;

        let view = c.view();
        assert_eq!(view.notices.len(), 1);
        assert_eq!(view.notices[0].level, NoticeLevel::Error);
        assert!(view.proposals.is_empty());
    }

    #[tokio::test]
    async fn rejected_solve_fails_the_run() {
        let mut solver = MockSolverService::new();
        solver
            .expect_solve()
            .times(1)
            .returning(|_, _| Err(SolverError::Rejected("dataset locked".into())));
        let mut c = coordinator(solver, MockExplanationService::new());

        c.dispatch(Command::Solve.into()).await;
        c.pump_until(|s| {
            s.stream()
                .runs()
                .current()
                .is_some_and(|r| r.status().is_terminal())
        })
        .await;

        let view = c.view();
        assert_eq!(view.run.unwrap().status, RunStatus::Failed);
        assert!(view.notices[0].message.contains("dataset locked"));
        assert!(view.can_reconnect);
    }

    #[tokio::test]
    async fn cancel_without_run_is_silent() {
        let mut c = coordinator(MockSolverService::new(), MockExplanationService::new());
        c.dispatch(Command::Cancel.into()).await;
        assert!(c.state().notices().is_empty());
    }
}
