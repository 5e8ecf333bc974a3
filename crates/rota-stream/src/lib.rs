//! Rota Stream
//!
//! Ingestion side of the coordinator. A solve run streams zero or more partial
//! results followed by a final one; each passes through:
//!
//! 1. [`RunController`]: drops anything tagged with a superseded run
//! 2. [`Deduplicator`]: drops repeats of an already seen snapshot
//! 3. [`DisclosureGate`]: holds early results back until two are available
//! 4. [`AlternativeBuffer`]: bounded FIFO that never evicts the selection
//! 5. [`Selection`]: auto-pins the first fully feasible result, tracks "best"
//!
//! [`StreamPipeline`] wires the stages together and is the only type the
//! session needs to drive.

#![warn(unreachable_pub)]

pub mod buffer;
pub mod dedup;
pub mod error;
pub mod gate;
pub mod lifecycle;
pub mod pipeline;
pub mod selection;

pub use buffer::AlternativeBuffer;
pub use dedup::{derive_id, Deduplicator};
pub use error::StreamError;
pub use gate::{DisclosureGate, GateDecision, GateState};
pub use lifecycle::{
    allowed_transitions, validate_transition, RunController, RunHandle, RunOutcome, RunStatus,
    SolveRun,
};
pub use pipeline::{FinishReport, IngestOutcome, StreamPipeline, StreamStatus};
pub use selection::{Selection, SelectionChange};
