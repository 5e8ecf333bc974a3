use chrono::{NaiveDate, NaiveTime};
use rota_core::{
    AdjacencyScore, Assignment, Availability, DatasetId, ItemId, LiveSchedule, Objectives,
    SchedulingContext, SolveResult, SolveStatus, Summary, TimeSlot,
};
use rota_repair::{BlockingAnalysis, BlockingDescriptor, RelaxCandidate};

pub fn dataset() -> DatasetId {
    DatasetId::new("test")
}

pub fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
}

/// One-hour slot on [`day`]
pub fn slot(hour: u32) -> TimeSlot {
    TimeSlot::new(
        day(),
        NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        NaiveTime::from_hms_opt(hour + 1, 0, 0).unwrap(),
    )
}

pub fn item(n: u32) -> ItemId {
    ItemId::new(format!("item-{n}"))
}

/// `count` non-colliding assignments for item-0, item-1, ...
pub fn assignments(count: u32) -> Vec<Assignment> {
    (0..count)
        .map(|n| Assignment {
            item: item(n),
            room: if n / 12 == 0 { "A".into() } else { "B".into() },
            slot: slot(8 + n % 12),
            pinned: false,
        })
        .collect()
}

pub fn scored(index: u64, scheduled: u32, total: u32, adjacency: i64) -> SolveResult {
    let mut result = partial(index, scheduled, total);
    result.objectives = Objectives {
        adjacency: Some(AdjacencyScore {
            score: adjacency,
            possible: 10,
        }),
    };
    result
}

pub fn partial(index: u64, scheduled: u32, total: u32) -> SolveResult {
    SolveResult {
        assignments: assignments(scheduled),
        status: SolveStatus::Feasible,
        solution_index: Some(index),
        solve_time_ms: 100 * (index + 1),
        objectives: Objectives::default(),
        summary: Summary {
            total,
            scheduled,
            unscheduled: total - scheduled,
        },
    }
}

pub fn feasible(index: u64, total: u32) -> SolveResult {
    partial(index, total, total)
}

/// Result without a solution index
pub fn unindexed(solve_time_ms: u64, scheduled: u32) -> SolveResult {
    SolveResult {
        solution_index: None,
        solve_time_ms,
        ..partial(0, scheduled, scheduled + 1)
    }
}

pub fn invalid(index: u64) -> SolveResult {
    SolveResult {
        status: SolveStatus::Invalid,
        ..partial(index, 0, 1)
    }
}

pub fn unsatisfiable(total: u32) -> SolveResult {
    SolveResult {
        status: SolveStatus::Unsatisfiable,
        solution_index: None,
        ..partial(0, 0, total)
    }
}

/// Rooms A and B enabled; Ada unavailable at 11:00
pub fn context() -> SchedulingContext {
    SchedulingContext::new()
        .with_rooms(["A", "B"])
        .with_availability("Ada", slot(11), Availability::Unavailable)
}

/// Participants for item-0 (Ada) and item-1 (Alan), nothing placed
pub fn schedule() -> LiveSchedule {
    LiveSchedule::new()
        .with_participants(item(0), ["Ada"])
        .with_participants(item(1), ["Alan"])
}

/// item-2 blocked; three candidates
pub fn analysis() -> BlockingAnalysis {
    BlockingAnalysis {
        blocking: vec![BlockingDescriptor {
            item: item(2),
            reason: "no room and lecturer away".into(),
        }],
        relax_candidates: vec![
            RelaxCandidate {
                label: String::new(),
                tokens: vec!["enable-room C".into()],
                affected_items: Vec::new(),
            },
            RelaxCandidate {
                label: String::new(),
                tokens: vec!["add-pool-room Annex".into()],
                affected_items: Vec::new(),
            },
            RelaxCandidate {
                label: "Ask Ada about Monday 11:00".into(),
                tokens: vec!["person-unavailable Ada 2025-03-03T11:00:00".into()],
                affected_items: vec![item(0), item(2)],
            },
        ],
    }
}
