//! Testing utilities for the Rota workspace
//!
//! Shared fixtures for solver results and scheduling state, plus fakes for
//! the collaborators that sit outside the coordinator.

#![allow(missing_docs)]

pub mod fakes;
pub mod fixtures;

pub use fakes::{FlakyStore, ScriptedValidator};
