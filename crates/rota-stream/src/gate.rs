//! Disclosure gate
//!
//! ```text
//! Closed --arm--> Pending --(held >= open_threshold | show_anyway | divergence)--> Open
//!    ^               |                                                               |
//!    +-----close-----+---------------------------close-------------------------------+
//! ```
//!
//! A single early partial result is not worth surfacing, so snapshots are held
//! while `Pending`. Once `Open`, everything held is released in arrival order
//! and later snapshots pass straight through until the gate is closed again.

use crate::error::StreamError;
use rota_core::{GateConfig, Snapshot};
use serde::{Deserialize, Serialize};

/// Gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// No run; nothing accepted
    Closed,
    /// Run active, snapshots held back
    Pending,
    /// Snapshots visible
    Open,
}

/// Result of offering a snapshot to the gate
#[derive(Debug)]
pub enum GateDecision {
    /// Held back; `pending` snapshots now waiting
    Held { pending: usize },
    /// Released to the consumer, in arrival order
    Disclosed(Vec<Snapshot>),
}

/// Three-state disclosure policy
#[derive(Debug)]
pub struct DisclosureGate {
    state: GateState,
    pending: Vec<Snapshot>,
    config: GateConfig,
    hint_visible: bool,
}

impl DisclosureGate {
    /// Create closed gate
    #[inline]
    #[must_use]
    pub fn new(config: GateConfig) -> Self {
        Self {
            state: GateState::Closed,
            pending: Vec::new(),
            config,
            hint_visible: false,
        }
    }

    /// Current state
    #[inline]
    #[must_use]
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Plenty of results are waiting behind the gate
    #[inline]
    #[must_use]
    pub fn hint_visible(&self) -> bool {
        self.hint_visible
    }

    /// Number of held snapshots
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Held snapshots, oldest first
    #[inline]
    #[must_use]
    pub fn pending(&self) -> &[Snapshot] {
        &self.pending
    }

    /// Reset to `Pending` for a new run
    pub fn arm(&mut self) {
        self.close();
        self.state = GateState::Pending;
        tracing::debug!("Gate armed");
    }

    /// Back to `Closed`, dropping anything held
    pub fn close(&mut self) {
        self.state = GateState::Closed;
        self.pending.clear();
        self.hint_visible = false;
    }

    /// Offer a freshly accepted snapshot
    ///
    /// # Errors
    /// Returns [`StreamError::GateClosed`] when no run armed the gate
    pub fn offer(&mut self, snapshot: Snapshot) -> Result<GateDecision, StreamError> {
        match self.state {
            GateState::Closed => Err(StreamError::GateClosed),
            GateState::Open => Ok(GateDecision::Disclosed(vec![snapshot])),
            GateState::Pending => {
                self.pending.push(snapshot);
                if self.pending.len() >= self.config.hint_threshold {
                    self.hint_visible = true;
                }
                if self.pending.len() >= self.config.open_threshold || self.diverged() {
                    return Ok(GateDecision::Disclosed(self.open()));
                }
                Ok(GateDecision::Held {
                    pending: self.pending.len(),
                })
            }
        }
    }

    /// Force the gate open with whatever is held ("show anyway")
    ///
    /// # Errors
    /// - [`StreamError::GateClosed`] when closed
    /// - [`StreamError::NothingPending`] when pending with nothing held
    pub fn show_anyway(&mut self) -> Result<Vec<Snapshot>, StreamError> {
        match self.state {
            GateState::Closed => Err(StreamError::GateClosed),
            GateState::Open => Ok(Vec::new()),
            GateState::Pending if self.pending.is_empty() => Err(StreamError::NothingPending),
            GateState::Pending => Ok(self.open()),
        }
    }

    /// Release held snapshots when the run ends while still pending
    pub fn flush_on_finish(&mut self) -> Vec<Snapshot> {
        if self.state == GateState::Pending && !self.pending.is_empty() {
            return self.open();
        }
        Vec::new()
    }

    fn open(&mut self) -> Vec<Snapshot> {
        self.state = GateState::Open;
        tracing::debug!("Gate open, releasing {} snapshot(s)", self.pending.len());
        std::mem::take(&mut self.pending)
    }

    fn diverged(&self) -> bool {
        let Some(threshold) = self.config.divergence_threshold else {
            return false;
        };
        let scores: Vec<i64> = self
            .pending
            .iter()
            .filter_map(|s| s.payload().adjacency_score())
            .collect();
        match (scores.iter().min(), scores.iter().max()) {
            (Some(lo), Some(hi)) if scores.len() >= 2 => hi - lo >= threshold,
            _ => false,
        }
    }
}
