//! The one owned mutable session object

use crate::notice::Notices;
use rota_core::{CoordinatorConfig, LiveSchedule, SchedulingContext, SolveOptions};
use rota_edit::EditPipeline;
use rota_repair::StagingEngine;
use rota_stream::StreamPipeline;

/// Everything the coordinator knows.
///
/// Handlers receive it mutably one event at a time; [`crate::derive_all`]
/// reads it to produce the view.
#[derive(Debug)]
pub struct SessionState {
    pub(crate) config: CoordinatorConfig,
    pub(crate) stream: StreamPipeline,
    pub(crate) repairs: StagingEngine,
    pub(crate) edits: EditPipeline,
    pub(crate) schedule: LiveSchedule,
    pub(crate) context: SchedulingContext,
    pub(crate) notices: Notices,
    pub(crate) pending_start: Option<SolveOptions>,
    pub(crate) elapsed_secs: u64,
    pub(crate) analysis_available: bool,
}

impl SessionState {
    /// Fresh state for a dataset
    #[must_use]
    pub fn new(
        config: CoordinatorConfig,
        repairs: StagingEngine,
        schedule: LiveSchedule,
        context: SchedulingContext,
    ) -> Self {
        Self {
            stream: StreamPipeline::new(&config),
            notices: Notices::new(config.notice_capacity),
            edits: EditPipeline::new(),
            pending_start: None,
            elapsed_secs: 0,
            analysis_available: false,
            config,
            repairs,
            schedule,
            context,
        }
    }

    /// Configuration in effect
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Streaming pipeline
    #[inline]
    #[must_use]
    pub fn stream(&self) -> &StreamPipeline {
        &self.stream
    }

    /// Repair staging engine
    #[inline]
    #[must_use]
    pub fn repairs(&self) -> &StagingEngine {
        &self.repairs
    }

    /// Optimistic edit pipeline
    #[inline]
    #[must_use]
    pub fn edits(&self) -> &EditPipeline {
        &self.edits
    }

    /// Live schedule
    #[inline]
    #[must_use]
    pub fn schedule(&self) -> &LiveSchedule {
        &self.schedule
    }

    /// Shared scheduling context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &SchedulingContext {
        &self.context
    }

    /// Queued notices
    #[inline]
    #[must_use]
    pub fn notices(&self) -> &Notices {
        &self.notices
    }

    /// Run waiting for the previous one to wind down
    #[inline]
    #[must_use]
    pub fn pending_start(&self) -> Option<&SolveOptions> {
        self.pending_start.as_ref()
    }

    /// Seconds the latest run has been going
    #[inline]
    #[must_use]
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    /// Last final result was infeasible; blocking analysis is on offer
    #[inline]
    #[must_use]
    pub fn analysis_available(&self) -> bool {
        self.analysis_available
    }
}
