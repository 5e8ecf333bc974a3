//! Derived view
//!
//! [`derive_all`] is a pure function of [`SessionState`]. The coordinator
//! recomputes it after every event and publishes it; nothing else reads the
//! state directly.

use crate::notice::Notice;
use crate::state::SessionState;
use rota_core::{DatasetId, ProposalId, RunId, RunToken, SnapshotId};
use rota_edit::Conflict;
use rota_repair::{ProposalKind, ProposalStatus};
use rota_stream::{GateState, RunStatus, StreamStatus};
use serde::Serialize;

/// The latest run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunView {
    /// Local generation
    pub token: RunToken,
    /// Remote id, once known
    pub id: Option<RunId>,
    /// Lifecycle status
    pub status: RunStatus,
    /// Snapshots accepted so far
    pub accepted: u64,
}

/// One visible alternative
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlternativeView {
    /// Snapshot identity
    pub id: SnapshotId,
    /// Items placed
    pub scheduled: u32,
    /// Items in the problem
    pub total: u32,
    /// Adjacency score, if reported
    pub adjacency: Option<i64>,
    /// Every item placed
    pub feasible: bool,
    /// Currently selected
    pub selected: bool,
    /// Ranked best of the visible alternatives
    pub best: bool,
}

/// One relaxation proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposalView {
    /// Proposal id
    pub id: ProposalId,
    /// What it relaxes
    pub kind: ProposalKind,
    /// Display label
    pub label: String,
    /// Negotiation status
    pub status: ProposalStatus,
    /// Raw repair tokens
    pub tokens: Vec<String>,
}

/// Everything the rendering side needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedView {
    /// Dataset being worked on
    pub dataset: DatasetId,
    /// Latest run
    pub run: Option<RunView>,
    /// Transport status
    pub stream_status: StreamStatus,
    /// Seconds the latest run has been going
    pub elapsed_secs: u64,
    /// Gate state
    pub gate: GateState,
    /// Snapshots held behind the gate
    pub pending: usize,
    /// Offer "show anyway"
    pub hint_visible: bool,
    /// Visible alternatives, arrival order
    pub alternatives: Vec<AlternativeView>,
    /// Selected alternative
    pub selected: Option<SnapshotId>,
    /// Best visible alternative
    pub best: Option<SnapshotId>,
    /// The selection was picked by hand
    pub manual_preview: bool,
    /// Items placed in the live schedule
    pub placed: usize,
    /// Conflicts from the latest validations
    pub conflicts: Vec<Conflict>,
    /// Undo available
    pub can_undo: bool,
    /// Redo available
    pub can_redo: bool,
    /// Relaxation proposals, in order
    pub proposals: Vec<ProposalView>,
    /// At least one confirmed proposal
    pub can_apply: bool,
    /// Last repair write failed
    pub persist_pending: bool,
    /// Blocking analysis on offer
    pub analysis_available: bool,
    /// Reconnect would restart the last run
    pub can_reconnect: bool,
    /// Queued notices, oldest first
    pub notices: Vec<Notice>,
}

impl DerivedView {
    /// Whether the latest run has ended
    #[must_use]
    pub fn run_finished(&self) -> bool {
        self.run.as_ref().is_some_and(|r| r.status.is_terminal())
    }
}

/// Compute the view from the state
#[must_use]
pub fn derive_all(state: &SessionState) -> DerivedView {
    let stream = state.stream();
    let selection = stream.selection();
    let selected = stream.selected_snapshot().map(rota_core::Snapshot::id);
    let best = selection.best();

    let run = stream.runs().current().map(|r| RunView {
        token: r.token(),
        id: r.id().cloned(),
        status: r.status(),
        accepted: r.accepted(),
    });
    let active = stream.runs().is_active();

    let alternatives = stream
        .buffer()
        .iter()
        .map(|s| {
            let payload = s.payload();
            AlternativeView {
                id: s.id(),
                scheduled: payload.summary.scheduled,
                total: payload.summary.total,
                adjacency: payload.adjacency_score(),
                feasible: s.is_fully_feasible(),
                selected: selected == Some(s.id()),
                best: best == Some(s.id()),
            }
        })
        .collect();

    let session = state.repairs().session();
    let proposals: Vec<ProposalView> = session
        .iter()
        .map(|p| ProposalView {
            id: p.id,
            kind: p.kind,
            label: p.label.clone(),
            status: p.status,
            tokens: p.raw_tokens.clone(),
        })
        .collect();
    let can_apply = proposals
        .iter()
        .any(|p| p.status == ProposalStatus::Confirmed);

    DerivedView {
        dataset: state.config().dataset_id.clone(),
        run,
        stream_status: stream.stream_status(),
        elapsed_secs: state.elapsed_secs(),
        gate: stream.gate().state(),
        pending: stream.gate().pending_len(),
        hint_visible: stream.gate().hint_visible(),
        alternatives,
        selected,
        best,
        manual_preview: selection.manual_preview(),
        placed: state.schedule().len(),
        conflicts: state.edits().conflicts().cloned().collect(),
        can_undo: state.edits().undo_len() > 0,
        can_redo: state.edits().redo_len() > 0,
        proposals,
        can_apply,
        persist_pending: state.repairs().is_persist_pending(),
        analysis_available: state.analysis_available(),
        can_reconnect: stream.stream_status() == StreamStatus::Error && !active,
        notices: state.notices().iter().cloned().collect(),
    }
}
