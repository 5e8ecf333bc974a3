//! Events processed by the coordinator, in arrival order

use crate::notice::Notice;
use rota_core::{DatasetId, LiveSchedule, ProposalId, RunId, SchedulingContext, SnapshotId, SolveResult};
use rota_edit::{Mutation, ValidationReport};
use rota_stream::{RunHandle, StreamStatus};
use std::collections::BTreeSet;

/// Message from a solver task
#[derive(Debug, Clone)]
pub enum SolverMessage {
    /// Remote run id assigned
    RunId(RunId),
    /// Streamed result
    Snapshot(Box<SolveResult>),
    /// Transport status
    Status(StreamStatus),
    /// Final result, or the reason the solve failed
    Finished(Result<Box<SolveResult>, String>),
}

/// Replacement data for a dataset switch
#[derive(Debug, Clone)]
pub struct DatasetSwitch {
    /// New dataset
    pub dataset: DatasetId,
    /// Its live schedule
    pub schedule: LiveSchedule,
    /// Its scheduling context
    pub context: SchedulingContext,
}

/// User action
#[derive(Debug, Clone)]
pub enum Command {
    /// Start a solve with the applied repairs
    Solve,
    /// Cancel the active run
    Cancel,
    /// Restart the last run after a transport failure
    Reconnect,
    /// Open the gate with whatever is held
    ShowAnyway,
    /// Pick an alternative
    Select(SnapshotId),
    /// Drop the selection
    ClearSelection,
    /// Close the gate and drop all alternatives
    Dismiss,
    /// Direct schedule or context edit
    Edit(Mutation),
    /// Undo the latest edit
    Undo,
    /// Redo the latest undone edit
    Redo,
    /// Ask the explanation service for a blocking analysis
    Explain,
    /// Stage a proposal
    Stage(ProposalId),
    /// Unstage a proposal
    Unstage(ProposalId),
    /// Make this the staged set
    SetStaged(BTreeSet<ProposalId>),
    /// Confirm a staged proposal
    Confirm(ProposalId),
    /// Take a confirmation back
    Unconfirm(ProposalId),
    /// Apply every confirmed proposal and re-solve
    Apply,
    /// Revert an applied proposal
    Revert(ProposalId),
    /// Rebuild applied proposals from the repair store
    RestoreRepairs,
    /// Retry a failed repair write
    FlushRepairs,
    /// Withdraw every proposal that is not applied
    ResetRepairs,
    /// Work on another dataset
    SwitchDataset(Box<DatasetSwitch>),
    /// Stop the event loop
    Shutdown,
}

/// Anything the coordinator reacts to
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// User action
    Command(Command),
    /// Solver output for a run
    Solver {
        /// Run the message belongs to
        handle: RunHandle,
        /// Payload
        message: SolverMessage,
    },
    /// Validation service answered
    Validated(ValidationReport),
    /// Notice raised by a background task
    Notice(Notice),
    /// Clock tick for the elapsed timer
    Tick,
}

impl From<Command> for SessionEvent {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}
