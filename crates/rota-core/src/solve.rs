//! Solver wire model
//!
//! Every streamed snapshot and the final result share the same shape.

use crate::ids::{DatasetId, ItemId};
use crate::schedule::{Placement, TimeSlot};
use serde::{Deserialize, Serialize};

/// Status flag reported by the solver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveStatus {
    /// Proven optimal
    Optimal,
    /// Feasible, not proven optimal
    Feasible,
    /// Malformed partial result; never shown
    Invalid,
    /// No feasible schedule exists under current constraints
    Unsatisfiable,
}

impl SolveStatus {
    /// Results the pipeline must drop before deduplication
    #[inline]
    #[must_use]
    pub fn is_invalid(self) -> bool {
        matches!(self, Self::Invalid)
    }
}

/// One item placement inside a solver result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    /// Item being placed
    pub item: ItemId,
    /// Room name
    pub room: String,
    /// Time range
    pub slot: TimeSlot,
    /// Whether the placement was pinned in the request
    #[serde(default)]
    pub pinned: bool,
}

impl Assignment {
    /// Build from a live-schedule placement
    #[inline]
    #[must_use]
    pub fn from_placement(item: ItemId, placement: Placement) -> Self {
        Self {
            item,
            room: placement.room,
            slot: placement.slot,
            pinned: placement.pinned,
        }
    }

    /// The placement part of this assignment
    #[inline]
    #[must_use]
    pub fn placement(&self) -> Placement {
        Placement {
            room: self.room.clone(),
            slot: self.slot,
            pinned: self.pinned,
        }
    }
}

/// Adjacency objective
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjacencyScore {
    /// Achieved score
    pub score: i64,
    /// Best possible score
    pub possible: i64,
}

/// Objective values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objectives {
    /// Adjacency objective, when the solver computes one
    #[serde(default)]
    pub adjacency: Option<AdjacencyScore>,
}

/// Scheduling counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    /// Items in the problem
    pub total: u32,
    /// Items placed
    pub scheduled: u32,
    /// Items left unplaced
    pub unscheduled: u32,
}

/// A streamed or final solver result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolveResult {
    /// Placements
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    /// Status flag
    pub status: SolveStatus,
    /// Ordinal of this solution within the run, when the solver reports one
    #[serde(default)]
    pub solution_index: Option<u64>,
    /// Elapsed solver time when this result was produced
    pub solve_time_ms: u64,
    /// Objective values
    #[serde(default)]
    pub objectives: Objectives,
    /// Counts
    pub summary: Summary,
}

impl SolveResult {
    /// Every item placed
    #[inline]
    #[must_use]
    pub fn is_fully_feasible(&self) -> bool {
        self.summary.scheduled == self.summary.total
    }

    /// Unsatisfiable, or nothing could be placed
    #[inline]
    #[must_use]
    pub fn is_infeasible(&self) -> bool {
        self.status == SolveStatus::Unsatisfiable
            || (self.summary.scheduled == 0 && self.summary.total > 0)
    }

    /// Adjacency score, if reported
    #[inline]
    #[must_use]
    pub fn adjacency_score(&self) -> Option<i64> {
        self.objectives.adjacency.map(|a| a.score)
    }
}

/// Options for starting a solve run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolveOptions {
    /// Dataset to solve
    pub dataset_id: DatasetId,
    /// Respect pinned placements
    #[serde(default)]
    pub must_fix: bool,
    /// Pinned placements to respect when `must_fix` is set
    #[serde(default)]
    pub pinned: Vec<Assignment>,
    /// Repair directives in effect for this run
    #[serde(default)]
    pub repair_tokens: Vec<String>,
}

impl SolveOptions {
    /// Options for a plain solve of a dataset
    #[inline]
    #[must_use]
    pub fn new(dataset_id: DatasetId) -> Self {
        Self {
            dataset_id,
            ..Self::default()
        }
    }

    /// With must-fix mode and the placements to keep
    #[inline]
    #[must_use]
    pub fn with_must_fix(mut self, pinned: Vec<Assignment>) -> Self {
        self.must_fix = true;
        self.pinned = pinned;
        self
    }

    /// With repair directives
    #[inline]
    #[must_use]
    pub fn with_repairs(mut self, tokens: Vec<String>) -> Self {
        self.repair_tokens = tokens;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_solver_wire_format() {
        let json = r#"{
            "assignments": [
                {"item": "math-1", "room": "B-101",
                 "slot": {"day": "2024-03-04", "start": "09:00:00", "end": "10:00:00"}}
            ],
            "status": "feasible",
            "solution_index": 3,
            "solve_time_ms": 1200,
            "objectives": {"adjacency": {"score": 7, "possible": 10}},
            "summary": {"total": 2, "scheduled": 1, "unscheduled": 1}
        }"#;
        let result: SolveResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.status, SolveStatus::Feasible);
        assert_eq!(result.solution_index, Some(3));
        assert_eq!(result.adjacency_score(), Some(7));
        assert!(!result.is_fully_feasible());
        assert!(!result.assignments[0].pinned);
    }

    #[test]
    fn optional_fields_default() {
        let json = r#"{"status": "unsatisfiable", "solve_time_ms": 5,
                       "summary": {"total": 3, "scheduled": 0, "unscheduled": 3}}"#;
        let result: SolveResult = serde_json::from_str(json).unwrap();
        assert!(result.assignments.is_empty());
        assert_eq!(result.solution_index, None);
        assert_eq!(result.adjacency_score(), None);
        assert!(result.is_infeasible());
    }
}
