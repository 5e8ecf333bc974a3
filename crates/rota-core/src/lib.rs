//! Rota Core
//!
//! Shared vocabulary for the coordinator crates:
//! - Identifiers for runs, snapshots, proposals and datasets
//! - The solver result wire model ([`SolveResult`])
//! - Deduplicated [`Snapshot`]s with stable identity
//! - The shared [`SchedulingContext`] and its single update path
//! - The [`LiveSchedule`] edited by the user
//! - [`CoordinatorConfig`] loaded from TOML
//!
//! # Example
//!
//! ```rust,ignore
//! use rota_core::{CoordinatorConfig, ContextUpdate, SchedulingContext};
//!
//! let config = CoordinatorConfig::from_toml_str("buffer_capacity = 8")?;
//! let mut context = SchedulingContext::new();
//! let inverse = context.apply(ContextUpdate::enable_room("B-101"));
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod context;
pub mod error;
pub mod hash;
pub mod ids;
pub mod schedule;
pub mod snapshot;
pub mod solve;

pub use config::{CoordinatorConfig, GateConfig};
pub use context::{Availability, ContextUpdate, SchedulingContext};
pub use error::ConfigError;
pub use hash::Fingerprint;
pub use ids::{AvailabilityRequestId, DatasetId, ItemId, ProposalId, RunId, RunToken};
pub use schedule::{LiveSchedule, Placement, TimeSlot};
pub use snapshot::{RankKey, Snapshot, SnapshotId};
pub use solve::{
    AdjacencyScore, Assignment, Objectives, SolveOptions, SolveResult, SolveStatus, Summary,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
