//! Run lifecycle controller
//!
//! Owns at most one active [`SolveRun`]. Re-entry is refused through a plain
//! boolean set synchronously inside [`RunController::start`], so two start
//! requests processed back to back can never both succeed.

use crate::error::StreamError;
use rota_core::{RunId, RunToken, SolveOptions};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Status of a solve run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run requested yet
    Idle,
    /// Streaming results
    Running,
    /// Cancellation requested, results may still arrive
    Cancelling,
    /// Finished normally
    Completed,
    /// Finished after a cancellation request
    Cancelled,
    /// Transport or solver failure
    Failed,
}

impl RunStatus {
    /// Running or cancelling
    #[inline]
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Cancelling)
    }

    /// No further transitions possible
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        allowed_transitions(self).is_empty()
    }
}

/// Transitions reachable from `from`
pub fn allowed_transitions(from: RunStatus) -> Vec<RunStatus> {
    use RunStatus as S;
    match from {
        S::Idle => vec![S::Running, S::Failed],
        S::Running => vec![S::Cancelling, S::Completed, S::Failed],
        S::Cancelling => vec![S::Cancelled],
        S::Completed | S::Cancelled | S::Failed => vec![],
    }
}

/// Validates a run status transition.
///
/// # Errors
/// Returns [`StreamError::IllegalTransition`] when `to` is not reachable
pub fn validate_transition(from: RunStatus, to: RunStatus) -> Result<(), StreamError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StreamError::IllegalTransition { from, to })
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Final result delivered
    Completed,
    /// Cancelled; `partial` when at least one snapshot was accepted
    Cancelled { partial: bool },
    /// Solver or transport error
    Failed { reason: String },
}

/// One solve run
#[derive(Debug, Clone)]
pub struct SolveRun {
    token: RunToken,
    id: Option<RunId>,
    status: RunStatus,
    started_at: Instant,
    finished_at: Option<Instant>,
    options: SolveOptions,
    accepted: u64,
    cancel_pending: bool,
}

impl SolveRun {
    fn new(token: RunToken, options: SolveOptions) -> Self {
        Self {
            token,
            id: None,
            status: RunStatus::Idle,
            started_at: Instant::now(),
            finished_at: None,
            options,
            accepted: 0,
            cancel_pending: false,
        }
    }

    /// Local generation
    #[inline]
    #[must_use]
    pub fn token(&self) -> RunToken {
        self.token
    }

    /// Remote id, once the solver accepted the run
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<&RunId> {
        self.id.as_ref()
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Options the run was started with
    #[inline]
    #[must_use]
    pub fn options(&self) -> &SolveOptions {
        &self.options
    }

    /// Snapshots accepted by the pipeline for this run
    #[inline]
    #[must_use]
    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Wall time since start, frozen once the run finished
    #[must_use]
    pub fn elapsed(&self, now: Instant) -> Duration {
        self.finished_at
            .unwrap_or(now)
            .saturating_duration_since(self.started_at)
    }

    fn transition(&mut self, to: RunStatus) -> Result<(), StreamError> {
        validate_transition(self.status, to)?;
        tracing::debug!("{}: {:?} -> {:?}", self.token, self.status, to);
        self.status = to;
        if to.is_terminal() {
            self.finished_at = Some(Instant::now());
        }
        Ok(())
    }
}

/// Handle given out by [`RunController::start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunHandle {
    token: RunToken,
}

impl RunHandle {
    /// Handle for an existing token
    #[inline]
    #[must_use]
    pub fn new(token: RunToken) -> Self {
        Self { token }
    }

    /// The run's generation
    #[inline]
    #[must_use]
    pub fn token(&self) -> RunToken {
        self.token
    }
}

/// Owner of the single active solve run
#[derive(Debug, Default)]
pub struct RunController {
    current: Option<SolveRun>,
    active: bool,
    last_token: RunToken,
}

impl RunController {
    /// Create idle controller
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a run.
    ///
    /// # Errors
    /// Returns [`StreamError::RunActive`] while another run is active
    pub fn start(&mut self, options: SolveOptions) -> Result<RunHandle, StreamError> {
        if self.active {
            return Err(StreamError::RunActive(self.last_token));
        }
        self.active = true;
        self.last_token = self.last_token.next();

        let mut run = SolveRun::new(self.last_token, options);
        run.transition(RunStatus::Running)?;
        self.current = Some(run);

        tracing::info!("Started solve {}", self.last_token);
        Ok(RunHandle::new(self.last_token))
    }

    /// Whether `token` is the latest run (active or finished)
    #[inline]
    #[must_use]
    pub fn is_current(&self, token: RunToken) -> bool {
        self.current.as_ref().is_some_and(|r| r.token == token)
    }

    /// Whether a run is active
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The latest run
    #[inline]
    #[must_use]
    pub fn current(&self) -> Option<&SolveRun> {
        self.current.as_ref()
    }

    /// Record the remote id.
    ///
    /// Returns `true` when a cancellation was requested before the id was
    /// known; the caller must forward it now.
    ///
    /// # Errors
    /// Returns [`StreamError::StaleRun`] for a superseded handle
    pub fn assign_run_id(&mut self, handle: RunHandle, id: RunId) -> Result<bool, StreamError> {
        let run = self.run_mut(handle)?;
        tracing::debug!("{} accepted as {}", run.token, id);
        run.id = Some(id);
        Ok(std::mem::take(&mut run.cancel_pending))
    }

    /// Request cancellation.
    ///
    /// Returns the remote id to send the cancel request to, or `None` if the
    /// solver has not reported one yet (the request is then deferred to
    /// [`Self::assign_run_id`]).
    ///
    /// # Errors
    /// - [`StreamError::StaleRun`] for a superseded handle
    /// - [`StreamError::IllegalTransition`] if the run is not running
    pub fn cancel(&mut self, handle: RunHandle) -> Result<Option<RunId>, StreamError> {
        let run = self.run_mut(handle)?;
        run.transition(RunStatus::Cancelling)?;
        tracing::info!("Cancelling {}", run.token);
        if run.id.is_none() {
            run.cancel_pending = true;
        }
        Ok(run.id.clone())
    }

    /// Count an accepted snapshot
    ///
    /// # Errors
    /// Returns [`StreamError::StaleRun`] for a superseded handle
    pub fn note_accepted(&mut self, handle: RunHandle) -> Result<(), StreamError> {
        self.run_mut(handle)?.accepted += 1;
        Ok(())
    }

    /// End the run.
    ///
    /// A run that was cancelling always ends `Cancelled`, whether the solver
    /// delivered a final result or an error.
    ///
    /// # Errors
    /// - [`StreamError::StaleRun`] for a superseded handle
    /// - [`StreamError::IllegalTransition`] if the run already ended
    pub fn finish(
        &mut self,
        handle: RunHandle,
        failure: Option<String>,
    ) -> Result<RunOutcome, StreamError> {
        let run = self.run_mut(handle)?;
        let outcome = match (run.status, failure) {
            (RunStatus::Cancelling, _) => {
                run.transition(RunStatus::Cancelled)?;
                RunOutcome::Cancelled {
                    partial: run.accepted > 0,
                }
            }
            (_, None) => {
                run.transition(RunStatus::Completed)?;
                RunOutcome::Completed
            }
            (_, Some(reason)) => {
                run.transition(RunStatus::Failed)?;
                RunOutcome::Failed { reason }
            }
        };
        self.active = false;
        tracing::info!("Solve {} finished: {:?}", handle.token, outcome);
        Ok(outcome)
    }

    fn run_mut(&mut self, handle: RunHandle) -> Result<&mut SolveRun, StreamError> {
        let current_token = self.last_token;
        match self.current.as_mut() {
            Some(run) if run.token == handle.token => Ok(run),
            Some(_) => Err(StreamError::StaleRun {
                current: current_token,
                got: handle.token,
            }),
            None => Err(StreamError::NoActiveRun),
        }
    }
}
