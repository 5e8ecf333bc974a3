//! Rota Edit
//!
//! Direct user edits are applied to the live schedule immediately, validated
//! remotely afterwards, and never wait on the solver. A validation that comes
//! back after a newer edit of the same class is discarded.

#![warn(unreachable_pub)]

pub mod error;
pub mod history;
pub mod mutation;
pub mod pipeline;
pub mod validation;

pub use error::{EditError, ValidationError};
pub use history::{UndoHistory, DEFAULT_HISTORY_LIMIT};
pub use mutation::{Inverse, Mutation, MutationClass};
pub use pipeline::{EditPipeline, ValidationOutcome};
pub use validation::{Conflict, PendingValidation, ValidationReport, Validator};
