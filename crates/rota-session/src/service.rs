//! Solver and explanation service contracts

use crate::error::{SessionError, SolverError};
use crate::event::{SessionEvent, SolverMessage};
use rota_core::{DatasetId, RunId, SolveOptions, SolveResult};
use rota_repair::BlockingAnalysis;
use rota_stream::{RunHandle, StreamStatus};
use tokio::sync::mpsc;

/// Where a solver pushes streamed results.
///
/// Every message is tagged with the run it belongs to, so results of a
/// superseded run are recognised by the coordinator and dropped.
#[derive(Debug, Clone)]
pub struct StreamSink {
    handle: RunHandle,
    events: mpsc::Sender<SessionEvent>,
}

impl StreamSink {
    /// Sink for one run
    #[must_use]
    pub fn new(handle: RunHandle, events: mpsc::Sender<SessionEvent>) -> Self {
        Self { handle, events }
    }

    /// Run this sink reports for
    #[inline]
    #[must_use]
    pub fn handle(&self) -> RunHandle {
        self.handle
    }

    /// The solver accepted the run under `id`
    ///
    /// # Errors
    /// [`SessionError::ChannelClosed`] once the coordinator is gone
    pub async fn on_run_id(&self, id: RunId) -> Result<(), SessionError> {
        self.emit(SolverMessage::RunId(id)).await
    }

    /// A streamed partial or improved result
    ///
    /// # Errors
    /// [`SessionError::ChannelClosed`] once the coordinator is gone
    pub async fn on_snapshot(&self, result: SolveResult) -> Result<(), SessionError> {
        self.emit(SolverMessage::Snapshot(Box::new(result))).await
    }

    /// Transport status changed
    ///
    /// # Errors
    /// [`SessionError::ChannelClosed`] once the coordinator is gone
    pub async fn on_stream_status(&self, status: StreamStatus) -> Result<(), SessionError> {
        self.emit(SolverMessage::Status(status)).await
    }

    pub(crate) async fn finish(&self, result: Result<SolveResult, String>) -> Result<(), SessionError> {
        self.emit(SolverMessage::Finished(result.map(Box::new))).await
    }

    async fn emit(&self, message: SolverMessage) -> Result<(), SessionError> {
        self.events
            .send(SessionEvent::Solver {
                handle: self.handle,
                message,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)
    }
}

/// Remote solver
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait SolverService: Send + Sync {
    /// Run a solve, streaming intermediate results into `sink`, and return
    /// the final result
    async fn solve(
        &self,
        options: SolveOptions,
        sink: StreamSink,
    ) -> Result<SolveResult, SolverError>;

    /// Ask the solver to stop a run early
    async fn cancel_run(&self, id: &RunId) -> Result<(), SolverError>;
}

/// Explains why items could not be scheduled
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ExplanationService: Send + Sync {
    /// Blocking analysis for the dataset's last solve
    async fn explain(&self, dataset: &DatasetId) -> Result<BlockingAnalysis, SolverError>;
}
