#![allow(dead_code)]

use rota_core::{CoordinatorConfig, LiveSchedule, ProposalId, SchedulingContext};
use rota_edit::Validator;
use rota_repair::{InMemoryToggles, ToggleState};
use rota_session::{
    Collaborators, Command, Coordinator, CoordinatorHandle, DerivedView, PermissiveValidator,
    ReplaySolver, SessionEvent, SessionState, SolverScript, StaticExplainer,
};
use rota_test_utils::fixtures::{analysis, context, dataset, schedule, slot};
use rota_test_utils::FlakyStore;
use std::sync::Arc;
use std::time::Duration;

pub fn toggle_state() -> ToggleState {
    ToggleState {
        enabled_rooms: ["A", "B"].into_iter().map(String::from).collect(),
        unavailable: [("Ada".to_string(), slot(11))].into_iter().collect(),
        ..ToggleState::default()
    }
}

pub fn config() -> CoordinatorConfig {
    CoordinatorConfig::new().with_dataset(dataset())
}

/// No run, or the latest one ended and nothing is waiting to start
pub fn settled(state: &SessionState) -> bool {
    state.pending_start().is_none()
        && state
            .stream()
            .runs()
            .current()
            .map_or(true, |r| r.status().is_terminal())
}

pub struct Harness {
    pub coordinator: Coordinator,
    pub handle: CoordinatorHandle,
    pub solver: Arc<ReplaySolver>,
    pub store: Arc<FlakyStore>,
    pub toggles: Arc<InMemoryToggles>,
}

pub struct Setup {
    pub config: CoordinatorConfig,
    pub schedule: LiveSchedule,
    pub context: SchedulingContext,
    pub validator: Arc<dyn Validator>,
    pub store: FlakyStore,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            config: config(),
            schedule: schedule(),
            context: context(),
            validator: Arc::new(PermissiveValidator),
            store: FlakyStore::new(),
        }
    }
}

impl Setup {
    pub fn build(self, scripts: Vec<SolverScript>) -> Harness {
        let solver = Arc::new(ReplaySolver::new(scripts));
        let store = Arc::new(self.store);
        let toggles = Arc::new(InMemoryToggles::new().with_state(dataset(), toggle_state()));
        let collaborators = Collaborators {
            solver: solver.clone(),
            explainer: Arc::new(StaticExplainer(analysis())),
            validator: self.validator,
            store: store.clone(),
            toggles: toggles.clone(),
        };
        let (coordinator, handle) =
            Coordinator::new(self.config, self.schedule, self.context, collaborators);
        Harness {
            coordinator,
            handle,
            solver,
            store,
            toggles,
        }
    }
}

pub fn harness(scripts: Vec<SolverScript>) -> Harness {
    Setup::default().build(scripts)
}

impl Harness {
    pub async fn send(&mut self, command: Command) {
        self.coordinator.dispatch(command.into()).await;
    }

    pub async fn inject(&mut self, event: SessionEvent) {
        self.coordinator.dispatch(event).await;
    }

    pub async fn pump_until(&mut self, done: impl FnMut(&SessionState) -> bool) {
        tokio::time::timeout(Duration::from_secs(600), self.coordinator.pump_until(done))
            .await
            .expect("session did not reach the expected state");
    }

    pub async fn settle(&mut self) {
        self.pump_until(settled).await;
    }

    pub fn state(&self) -> &SessionState {
        self.coordinator.state()
    }

    pub fn view(&self) -> DerivedView {
        self.coordinator.view()
    }

    /// Proposal ids in session order
    pub fn proposals(&self) -> Vec<ProposalId> {
        self.state().repairs().session().iter().map(|p| p.id).collect()
    }

    /// Proposal whose label mentions `needle`
    pub fn proposal(&self, needle: &str) -> ProposalId {
        self.state()
            .repairs()
            .session()
            .iter()
            .find(|p| p.label.contains(needle) || p.raw_tokens.iter().any(|t| t.contains(needle)))
            .map(|p| p.id)
            .expect("no such proposal")
    }

    pub fn messages(&self) -> Vec<String> {
        self.state().notices().iter().map(|n| n.message.clone()).collect()
    }
}
