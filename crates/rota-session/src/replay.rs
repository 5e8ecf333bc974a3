//! Scripted services for simulation and tests
//!
//! [`ReplaySolver`] plays back recorded solver streams: each `solve` call
//! takes the next [`SolverScript`] and feeds its steps to the sink with the
//! scripted delays, honouring `cancel_run` between steps.

use crate::error::SolverError;
use crate::service::{ExplanationService, SolverService, StreamSink};
use dashmap::DashMap;
use parking_lot::Mutex;
use rota_core::{DatasetId, LiveSchedule, RunId, SolveOptions, SolveResult};
use rota_edit::{Conflict, Mutation, ValidationError, Validator};
use rota_repair::BlockingAnalysis;
use rota_stream::StreamStatus;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// One step of a recorded stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayStep {
    /// Emit a result after `delay_ms`
    Snapshot {
        /// Wait before emitting
        #[serde(default)]
        delay_ms: u64,
        /// Streamed result
        result: SolveResult,
    },
    /// Drop the connection after `delay_ms`
    Disconnect {
        /// Wait before dropping
        #[serde(default)]
        delay_ms: u64,
        /// Transport error text
        reason: String,
    },
}

impl ReplayStep {
    fn delay(&self) -> Duration {
        match self {
            Self::Snapshot { delay_ms, .. } | Self::Disconnect { delay_ms, .. } => {
                Duration::from_millis(*delay_ms)
            }
        }
    }
}

/// Recorded stream of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SolverScript {
    /// Remote id to report; generated when absent
    #[serde(default)]
    pub run_id: Option<String>,
    /// Streamed steps
    #[serde(default)]
    pub steps: Vec<ReplayStep>,
    /// Final result; the last streamed snapshot when absent
    #[serde(default, rename = "final")]
    pub final_result: Option<SolveResult>,
}

impl SolverScript {
    /// Script streaming `results` back to back
    #[must_use]
    pub fn streaming(results: impl IntoIterator<Item = SolveResult>) -> Self {
        Self {
            steps: results
                .into_iter()
                .map(|result| ReplayStep::Snapshot {
                    delay_ms: 0,
                    result,
                })
                .collect(),
            ..Self::default()
        }
    }

    /// With a step appended
    #[must_use]
    pub fn then(mut self, step: ReplayStep) -> Self {
        self.steps.push(step);
        self
    }

    /// With a remote run id
    #[must_use]
    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = Some(id.into());
        self
    }

    /// With a final result distinct from the streamed ones
    #[must_use]
    pub fn with_final(mut self, result: SolveResult) -> Self {
        self.final_result = Some(result);
        self
    }
}

/// Solver playing back scripts in call order
#[derive(Debug, Default)]
pub struct ReplaySolver {
    scripts: Mutex<VecDeque<SolverScript>>,
    live: DashMap<RunId, CancellationToken>,
    requests: Mutex<Vec<SolveOptions>>,
    cancelled: Mutex<Vec<RunId>>,
    started: AtomicU64,
}

impl ReplaySolver {
    /// Solver with the given scripts
    #[must_use]
    pub fn new(scripts: impl IntoIterator<Item = SolverScript>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
            ..Self::default()
        }
    }

    /// Queue another script
    pub fn push(&self, script: SolverScript) {
        self.scripts.lock().push_back(script);
    }

    /// Options of every solve call so far
    #[must_use]
    pub fn requests(&self) -> Vec<SolveOptions> {
        self.requests.lock().clone()
    }

    /// Run ids passed to `cancel_run`
    #[must_use]
    pub fn cancelled(&self) -> Vec<RunId> {
        self.cancelled.lock().clone()
    }

    /// Scripts not played yet
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.scripts.lock().len()
    }
}

#[async_trait::async_trait]
impl SolverService for ReplaySolver {
    async fn solve(
        &self,
        options: SolveOptions,
        sink: StreamSink,
    ) -> Result<SolveResult, SolverError> {
        self.requests.lock().push(options);
        let n = self.started.fetch_add(1, Ordering::SeqCst) + 1;
        let script = self
            .scripts
            .lock()
            .pop_front()
            .ok_or_else(|| SolverError::Rejected("no scripted run left".into()))?;

        let id = RunId::new(script.run_id.unwrap_or_else(|| format!("replay-{n}")));
        let token = CancellationToken::new();
        self.live.insert(id.clone(), token.clone());
        tracing::debug!("Replaying run {} ({} steps)", id, script.steps.len());

        let closed = |_| SolverError::SinkClosed;
        sink.on_run_id(id.clone()).await.map_err(closed)?;
        sink.on_stream_status(StreamStatus::Open)
            .await
            .map_err(closed)?;

        let mut last = None;
        for step in script.steps {
            let stopped = tokio::select! {
                biased;
                () = token.cancelled() => true,
                () = tokio::time::sleep(step.delay()) => false,
            };
            if stopped {
                tracing::debug!("Run {} stopped early", id);
                self.live.remove(&id);
                return last.ok_or_else(|| SolverError::Rejected("cancelled before any result".into()));
            }

            match step {
                ReplayStep::Snapshot { result, .. } => {
                    sink.on_snapshot(result.clone()).await.map_err(closed)?;
                    last = Some(result);
                }
                ReplayStep::Disconnect { reason, .. } => {
                    self.live.remove(&id);
                    sink.on_stream_status(StreamStatus::Error)
                        .await
                        .map_err(closed)?;
                    return Err(SolverError::Transport(reason));
                }
            }
        }

        self.live.remove(&id);
        sink.on_stream_status(StreamStatus::Closed)
            .await
            .map_err(closed)?;
        script
            .final_result
            .or(last)
            .ok_or_else(|| SolverError::Rejected("script produced no result".into()))
    }

    async fn cancel_run(&self, id: &RunId) -> Result<(), SolverError> {
        self.cancelled.lock().push(id.clone());
        if let Some((_, token)) = self.live.remove(id) {
            token.cancel();
        }
        Ok(())
    }
}

/// Explanation service returning a fixed analysis
#[derive(Debug, Clone, Default)]
pub struct StaticExplainer(pub BlockingAnalysis);

#[async_trait::async_trait]
impl ExplanationService for StaticExplainer {
    async fn explain(&self, _dataset: &DatasetId) -> Result<BlockingAnalysis, SolverError> {
        Ok(self.0.clone())
    }
}

/// Validator accepting every edit
#[derive(Debug, Clone, Copy, Default)]
pub struct PermissiveValidator;

#[async_trait::async_trait]
impl Validator for PermissiveValidator {
    async fn validate(
        &self,
        _schedule: LiveSchedule,
        _mutation: Mutation,
    ) -> Result<Vec<Conflict>, ValidationError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_parses_from_json() {
        let raw = r#"{
            "run_id": "r-1",
            "steps": [
                {"kind": "snapshot", "delay_ms": 5, "result": {
                    "status": "feasible", "solve_time_ms": 10,
                    "summary": {"total": 2, "scheduled": 1, "unscheduled": 1}
                }},
                {"kind": "disconnect", "reason": "socket closed"}
            ]
        }"#;
        let script: SolverScript = serde_json::from_str(raw).unwrap();
        assert_eq!(script.run_id.as_deref(), Some("r-1"));
        assert_eq!(script.steps.len(), 2);
        assert_eq!(script.steps[0].delay(), Duration::from_millis(5));
        assert!(script.final_result.is_none());
    }

    #[test]
    fn unknown_step_kind_is_rejected() {
        let raw = r#"{"steps": [{"kind": "teleport"}]}"#;
        assert!(serde_json::from_str::<SolverScript>(raw).is_err());
    }
}
