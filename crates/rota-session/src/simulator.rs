//! Offline session simulator
//!
//! Drives a [`Coordinator`] against recorded solver streams: restore stored
//! repairs, solve, and optionally negotiate every proposed repair and solve
//! again. The view after each phase is kept for the report.

use crate::coordinator::{Collaborators, Coordinator};
use crate::error::SessionError;
use crate::event::Command;
use crate::notice::NoticeLevel;
use crate::replay::{PermissiveValidator, ReplaySolver, SolverScript, StaticExplainer};
use crate::state::SessionState;
use crate::view::DerivedView;
use rota_core::{CoordinatorConfig, LiveSchedule, SchedulingContext, SolveOptions};
use rota_repair::{
    BlockingAnalysis, InMemoryRepairStore, InMemoryToggles, ProposalStatus, ToggleState,
};
use rota_stream::RunStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

/// Input of a simulation, usually loaded from JSON
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationScript {
    /// Enabled rooms of the dataset
    pub rooms: Vec<String>,
    /// Token list already in the repair store
    pub stored_repairs: Vec<String>,
    /// One recorded stream per solve, in order
    pub runs: Vec<SolverScript>,
    /// What the explanation service answers
    pub analysis: BlockingAnalysis,
}

impl SimulationScript {
    /// Parse a script
    ///
    /// # Errors
    /// [`SessionError::Script`] for malformed JSON
    pub fn from_json(raw: &str) -> Result<Self, SessionError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read and parse a script file
    ///
    /// # Errors
    /// As [`Self::from_json`]; an unreadable file is reported as a script error
    pub fn load_from(path: &Path) -> Result<Self, SessionError> {
        let raw = std::fs::read_to_string(path).map_err(serde_json::Error::io)?;
        Self::from_json(&raw)
    }
}

/// Simulator switches
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatorConfig {
    /// Negotiate and apply every proposed repair when the solve is infeasible
    pub apply_repairs: bool,
}

/// One finished phase
#[derive(Debug, Clone, Serialize)]
pub struct Phase {
    /// Phase name
    pub name: String,
    /// View when the phase ended
    pub view: DerivedView,
}

/// Outcome of a simulation
#[derive(Debug, Clone, Serialize)]
pub struct SimulatorReport {
    /// Views after each phase
    pub phases: Vec<Phase>,
    /// Options of every solve request
    pub requests: Vec<SolveOptions>,
    /// Scripts left unplayed
    pub unplayed: usize,
}

impl SimulatorReport {
    /// View after the last phase
    #[must_use]
    pub fn final_view(&self) -> Option<&DerivedView> {
        self.phases.last().map(|p| &p.view)
    }

    /// The last run completed and no error notice was raised
    #[must_use]
    pub fn passed(&self) -> bool {
        self.final_view().is_some_and(|view| {
            view.run
                .as_ref()
                .is_some_and(|r| r.status == RunStatus::Completed)
                && view.notices.iter().all(|n| n.level != NoticeLevel::Error)
        })
    }

    /// Human-readable report
    #[must_use]
    pub fn generate_text(&self) -> String {
        let mut report = String::new();

        report.push_str("=== Rota Session Simulation ===\n\n");
        report.push_str(&format!("Solve requests: {}\n", self.requests.len()));
        for (i, options) in self.requests.iter().enumerate() {
            report.push_str(&format!(
                "  {}. repairs={:?} pinned={}\n",
                i + 1,
                options.repair_tokens,
                options.pinned.len()
            ));
        }
        if self.unplayed > 0 {
            report.push_str(&format!("Unplayed scripts: {}\n", self.unplayed));
        }

        for phase in &self.phases {
            let view = &phase.view;
            report.push_str(&format!("\n--- {} ---\n", phase.name));
            if let Some(run) = &view.run {
                report.push_str(&format!(
                    "Run {}: {:?}, {} snapshot(s) accepted\n",
                    run.token, run.status, run.accepted
                ));
            }
            report.push_str(&format!("Stream: {:?}, gate: {:?}\n", view.stream_status, view.gate));
            for alt in &view.alternatives {
                let marks = match (alt.selected, alt.best) {
                    (true, true) => " [selected, best]",
                    (true, false) => " [selected]",
                    (false, true) => " [best]",
                    (false, false) => "",
                };
                report.push_str(&format!(
                    "  {} {}/{} adjacency={}{}\n",
                    alt.id,
                    alt.scheduled,
                    alt.total,
                    alt.adjacency.map_or_else(|| "-".to_string(), |a| a.to_string()),
                    marks
                ));
            }
            for proposal in &view.proposals {
                report.push_str(&format!("  repair {:?}: {}\n", proposal.status, proposal.label));
            }
            for notice in &view.notices {
                report.push_str(&format!("  {:?}: {}\n", notice.level, notice.message));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}

fn settled(state: &SessionState) -> bool {
    state.pending_start().is_none()
        && state
            .stream()
            .runs()
            .current()
            .map_or(true, |r| r.status().is_terminal())
}

/// Run a scripted session
pub async fn run_simulation(
    config: CoordinatorConfig,
    script: SimulationScript,
    sim: SimulatorConfig,
) -> SimulatorReport {
    let dataset = config.dataset_id.clone();
    let solver = Arc::new(ReplaySolver::new(script.runs));
    let toggles = InMemoryToggles::new().with_state(
        dataset.clone(),
        ToggleState {
            enabled_rooms: script.rooms.iter().cloned().collect(),
            ..ToggleState::default()
        },
    );
    let collaborators = Collaborators {
        solver: Arc::clone(&solver) as _,
        explainer: Arc::new(StaticExplainer(script.analysis)),
        validator: Arc::new(PermissiveValidator),
        store: Arc::new(InMemoryRepairStore::new().with_tokens(dataset, script.stored_repairs)),
        toggles: Arc::new(toggles),
    };
    let context = SchedulingContext::new().with_rooms(script.rooms);
    let (mut coordinator, _handle) =
        Coordinator::new(config, LiveSchedule::new(), context, collaborators);

    let mut phases = Vec::new();
    let mut phase = |name: &str, coordinator: &Coordinator| {
        phases.push(Phase {
            name: name.to_string(),
            view: coordinator.view(),
        });
    };

    coordinator.dispatch(Command::RestoreRepairs.into()).await;
    coordinator.dispatch(Command::Solve.into()).await;
    coordinator.pump_until(settled).await;
    phase("solve", &coordinator);

    if sim.apply_repairs && coordinator.state().analysis_available() {
        coordinator.dispatch(Command::Explain.into()).await;
        let proposed: BTreeSet<_> = coordinator
            .state()
            .repairs()
            .session()
            .iter()
            .filter(|p| p.status == ProposalStatus::Proposed)
            .map(|p| p.id)
            .collect();
        coordinator
            .dispatch(Command::SetStaged(proposed.clone()).into())
            .await;
        for id in proposed {
            coordinator.dispatch(Command::Confirm(id).into()).await;
        }
        coordinator.dispatch(Command::Apply.into()).await;
        coordinator.pump_until(settled).await;
        phase("apply", &coordinator);
    }

    SimulatorReport {
        phases,
        requests: solver.requests(),
        unplayed: solver.remaining(),
    }
}
