//! Rota Session
//!
//! The coordinator that ties the workspace together. It owns one
//! [`SessionState`] and processes events strictly one at a time:
//!
//! - solver output, tagged with the run it belongs to
//! - validation answers for optimistic edits
//! - user commands (solve, cancel, select, stage, confirm, apply, ...)
//! - clock ticks for the elapsed timer
//!
//! After every event the [`DerivedView`] is recomputed with [`derive_all`]
//! and published on a watch channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use rota_session::{Collaborators, Command, Coordinator};
//!
//! # async fn example(collaborators: Collaborators) {
//! let (coordinator, mut handle) = Coordinator::new(
//!     CoordinatorConfig::new(),
//!     LiveSchedule::new(),
//!     SchedulingContext::new(),
//!     collaborators,
//! );
//! tokio::spawn(coordinator.run());
//!
//! handle.send(Command::Solve).await?;
//! let view = handle.wait_for(|v| v.run_finished()).await?;
//! println!("{} alternatives", view.alternatives.len());
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod coordinator;
pub mod error;
pub mod event;
pub mod notice;
pub mod replay;
pub mod service;
pub mod simulator;
pub mod state;
pub mod view;

pub use coordinator::{Collaborators, Coordinator, CoordinatorHandle, EVENT_QUEUE_CAPACITY};
pub use error::{SessionError, SolverError};
pub use event::{Command, DatasetSwitch, SessionEvent, SolverMessage};
pub use notice::{Notice, NoticeLevel, Notices};
pub use replay::{PermissiveValidator, ReplaySolver, ReplayStep, SolverScript, StaticExplainer};
pub use service::{ExplanationService, SolverService, StreamSink};
pub use simulator::{run_simulation, Phase, SimulationScript, SimulatorConfig, SimulatorReport};
pub use state::SessionState;
pub use view::{derive_all, AlternativeView, DerivedView, ProposalView, RunView};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
