//! Rota Repair
//!
//! Staged-repair negotiation. The explanation service proposes relaxations
//! for blocked items; the user stages, confirms and applies them, and can take
//! them back at any point with exact compensation of their side effects.
//!
//! ```text
//! BlockingAnalysis --seed--> RepairSession --stage/unstage--> reconcile
//!                                                               |
//!                      SchedulingContext <--effects--+----------+
//!                      ResourceToggles   <-----------+
//!                      RepairStore       <--one write per diff--+
//! ```

#![warn(unreachable_pub)]

pub mod analysis;
pub mod collab;
pub mod effects;
pub mod engine;
pub mod error;
pub mod memory;
pub mod proposal;
pub mod session;
pub mod token;

pub use analysis::{BlockingAnalysis, BlockingDescriptor, RelaxCandidate};
pub use collab::{DisplayEntry, RepairDisplay, RepairStore, ResourceToggles, StoredRepairs};
pub use effects::{EffectLedger, EffectTarget, SideEffect};
pub use engine::{ApplyPlan, DiffReport, StagingEngine};
pub use error::{RepairError, StoreError, TokenError};
pub use memory::{InMemoryRepairStore, InMemoryToggles, ToggleState};
pub use proposal::{
    allowed_transitions, can_transition, ProposalKind, ProposalStatus, ProposalTarget,
    RelaxationProposal,
};
pub use session::RepairSession;
pub use token::{slot_starting, RepairToken, PERSON_SLOT_MINUTES};
