//! Streaming pipeline
//!
//! Wires the lifecycle controller, deduplicator, gate, buffer and selection
//! into one ingestion path. Every method is a discrete reaction step; the
//! caller feeds events strictly in arrival order.

use crate::buffer::AlternativeBuffer;
use crate::dedup::Deduplicator;
use crate::error::StreamError;
use crate::gate::{DisclosureGate, GateDecision};
use crate::lifecycle::{RunController, RunHandle, RunOutcome, RunStatus};
use crate::selection::{Selection, SelectionChange};
use rota_core::{CoordinatorConfig, RunId, Snapshot, SnapshotId, SolveOptions, SolveResult};
use serde::{Deserialize, Serialize};

/// Transport status of the result stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    /// No stream yet
    Idle,
    /// Receiving
    Open,
    /// Transport failure; reconnect is user-initiated
    Error,
    /// Stream ended
    Closed,
}

/// What happened to an ingested result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Tagged with a superseded or finished run
    Stale,
    /// Solver flagged it invalid
    Invalid,
    /// Already seen this run
    Duplicate,
    /// The user dismissed the results for this run
    Dismissed,
    /// Held behind the gate
    Held { pending: usize },
    /// Now visible
    Disclosed {
        /// Newly visible snapshots, arrival order
        ids: Vec<SnapshotId>,
        /// Snapshot auto-selected by this step
        auto_selected: Option<SnapshotId>,
        /// Snapshots pushed out of the buffer
        evicted: Vec<SnapshotId>,
    },
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishReport {
    /// How the run ended
    pub outcome: RunOutcome,
    /// Final result was unsatisfiable or scheduled nothing
    pub infeasible: bool,
    /// Snapshots made visible while finishing
    pub disclosed: Vec<SnapshotId>,
}

/// Ingestion pipeline for one coordinator
#[derive(Debug)]
pub struct StreamPipeline {
    runs: RunController,
    dedup: Deduplicator,
    buffer: AlternativeBuffer,
    gate: DisclosureGate,
    selection: Selection,
    status: StreamStatus,
}

impl StreamPipeline {
    /// Create idle pipeline
    #[must_use]
    pub fn new(config: &CoordinatorConfig) -> Self {
        Self {
            runs: RunController::new(),
            dedup: Deduplicator::new(),
            buffer: AlternativeBuffer::new(config.buffer_capacity),
            gate: DisclosureGate::new(config.gate),
            selection: Selection::new(),
            status: StreamStatus::Idle,
        }
    }

    /// Start a run, resetting all state of the previous one first
    ///
    /// # Errors
    /// Returns [`StreamError::RunActive`] while another run is active
    pub fn start(&mut self, options: SolveOptions) -> Result<RunHandle, StreamError> {
        let handle = self.runs.start(options)?;
        self.dismiss();
        self.gate.arm();
        self.status = StreamStatus::Open;
        Ok(handle)
    }

    /// Record the remote run id; returns it back if a deferred cancel must be sent
    ///
    /// # Errors
    /// Returns [`StreamError::StaleRun`] for a superseded handle
    pub fn on_run_id(
        &mut self,
        handle: RunHandle,
        id: RunId,
    ) -> Result<Option<RunId>, StreamError> {
        let deferred = self.runs.assign_run_id(handle, id.clone())?;
        Ok(deferred.then_some(id))
    }

    /// Request cancellation of a run
    ///
    /// # Errors
    /// See [`RunController::cancel`]
    pub fn cancel(&mut self, handle: RunHandle) -> Result<Option<RunId>, StreamError> {
        self.runs.cancel(handle)
    }

    /// Cancel whatever run is still running.
    ///
    /// Returns the handle and remote id when a cancel request was issued.
    pub fn cancel_active(&mut self) -> Option<(RunHandle, Option<RunId>)> {
        let run = self.runs.current()?;
        if run.status() != RunStatus::Running {
            return None;
        }
        let handle = RunHandle::new(run.token());
        self.runs.cancel(handle).ok().map(|id| (handle, id))
    }

    /// Update transport status; stale updates are ignored
    pub fn set_stream_status(&mut self, handle: RunHandle, status: StreamStatus) {
        if self.runs.is_current(handle.token()) {
            self.status = status;
        }
    }

    /// Ingest one streamed result
    pub fn ingest(&mut self, handle: RunHandle, raw: SolveResult) -> IngestOutcome {
        let live = self
            .runs
            .current()
            .is_some_and(|r| r.token() == handle.token() && r.status().is_active());
        if !live {
            tracing::warn!("Dropping result from superseded {}", handle.token());
            return IngestOutcome::Stale;
        }
        if raw.status.is_invalid() {
            return IngestOutcome::Invalid;
        }
        let Some(snapshot) = self.dedup.accept(raw) else {
            return IngestOutcome::Duplicate;
        };
        if self.runs.note_accepted(handle).is_err() {
            return IngestOutcome::Stale;
        }

        match self.gate.offer(snapshot) {
            Err(_) => IngestOutcome::Dismissed,
            Ok(GateDecision::Held { pending }) => IngestOutcome::Held { pending },
            Ok(GateDecision::Disclosed(items)) => self.disclose(items),
        }
    }

    /// Ingest the final result (or failure) and end the run
    ///
    /// # Errors
    /// - [`StreamError::StaleRun`] for a superseded handle
    /// - [`StreamError::IllegalTransition`] if the run already ended
    pub fn finish(
        &mut self,
        handle: RunHandle,
        result: Result<SolveResult, String>,
    ) -> Result<FinishReport, StreamError> {
        if !self.runs.is_current(handle.token()) {
            return Err(StreamError::StaleRun {
                current: self.runs.current().map_or(handle.token(), |r| r.token()),
                got: handle.token(),
            });
        }

        let mut disclosed = Vec::new();
        let mut infeasible = false;
        let failure = match result {
            Ok(raw) => {
                infeasible = raw.is_infeasible();
                if let IngestOutcome::Disclosed { ids, .. } = self.ingest(handle, raw) {
                    disclosed.extend(ids);
                }
                None
            }
            Err(reason) => Some(reason),
        };

        let flushed = self.gate.flush_on_finish();
        if !flushed.is_empty() {
            if let IngestOutcome::Disclosed { ids, .. } = self.disclose(flushed) {
                disclosed.extend(ids);
            }
        }

        let outcome = self.runs.finish(handle, failure)?;
        self.status = match outcome {
            RunOutcome::Failed { .. } => StreamStatus::Error,
            _ => StreamStatus::Closed,
        };

        Ok(FinishReport {
            outcome,
            infeasible,
            disclosed,
        })
    }

    /// Force held snapshots visible
    ///
    /// # Errors
    /// See [`DisclosureGate::show_anyway`]
    pub fn show_anyway(&mut self) -> Result<Vec<SnapshotId>, StreamError> {
        let items = self.gate.show_anyway()?;
        match self.disclose(items) {
            IngestOutcome::Disclosed { ids, .. } => Ok(ids),
            _ => Ok(Vec::new()),
        }
    }

    /// Explicit user selection
    ///
    /// # Errors
    /// Returns [`StreamError::UnknownSnapshot`] if it is not visible
    pub fn select(&mut self, id: SnapshotId) -> Result<(), StreamError> {
        self.buffer.pin(id)?;
        self.selection.select_manual(id);
        Ok(())
    }

    /// Drop the selection; auto-selection stays off for this run
    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.buffer.unpin();
    }

    /// Close the gate and drop every buffered snapshot
    pub fn dismiss(&mut self) {
        self.dedup.reset();
        self.gate.close();
        self.buffer.clear();
        self.selection.reset();
    }

    fn disclose(&mut self, items: Vec<Snapshot>) -> IngestOutcome {
        let mut ids = Vec::with_capacity(items.len());
        let mut auto_selected = None;
        let mut evicted = Vec::new();

        for snapshot in items {
            let id = snapshot.id();
            let change = self.selection.observe(&snapshot);
            evicted.extend(self.buffer.push(snapshot).iter().map(Snapshot::id));
            if let SelectionChange::AutoSelected(selected) = change {
                if self.buffer.pin(selected).is_ok() {
                    auto_selected = Some(selected);
                }
            }
            ids.push(id);
        }

        if self
            .selection
            .best()
            .is_some_and(|best| evicted.contains(&best))
        {
            self.selection.recompute_best(self.buffer.iter());
        }

        tracing::debug!("Disclosed {} snapshot(s), evicted {}", ids.len(), evicted.len());
        IngestOutcome::Disclosed {
            ids,
            auto_selected,
            evicted,
        }
    }

    /// Run lifecycle
    #[inline]
    #[must_use]
    pub fn runs(&self) -> &RunController {
        &self.runs
    }

    /// Visible snapshots
    #[inline]
    #[must_use]
    pub fn buffer(&self) -> &AlternativeBuffer {
        &self.buffer
    }

    /// Disclosure gate
    #[inline]
    #[must_use]
    pub fn gate(&self) -> &DisclosureGate {
        &self.gate
    }

    /// Selection pointers
    #[inline]
    #[must_use]
    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Transport status
    #[inline]
    #[must_use]
    pub fn stream_status(&self) -> StreamStatus {
        self.status
    }

    /// Selected snapshot, if still visible
    #[must_use]
    pub fn selected_snapshot(&self) -> Option<&Snapshot> {
        self.selection.selected().and_then(|id| self.buffer.get(id))
    }
}
