//! Optimistic mutation pipeline
//!
//! 1. Synchronous pre-check, rejecting immediately
//! 2. Apply locally and record the inverse for undo
//! 3. Hand back a [`PendingValidation`] for the caller to run
//! 4. Apply a returned report only if it is the latest of its class

use crate::error::{EditError, ValidationError};
use crate::history::UndoHistory;
use crate::mutation::{Mutation, MutationClass};
use crate::validation::{Conflict, PendingValidation, ValidationReport};
use rota_core::{LiveSchedule, SchedulingContext};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// What happened to a validation report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    /// Conflicts of the class replaced by this report's
    Applied { conflicts: usize },
    /// A newer edit of the class was issued; report dropped
    Stale,
    /// Request was cancelled before it returned
    Cancelled,
    /// Service failed; existing conflicts kept
    Failed(ValidationError),
}

#[derive(Debug)]
struct ClassState {
    generation: u64,
    token: CancellationToken,
}

/// Optimistic edit coordinator
#[derive(Debug, Default)]
pub struct EditPipeline {
    history: UndoHistory,
    classes: BTreeMap<MutationClass, ClassState>,
    conflicts: BTreeMap<MutationClass, Vec<Conflict>>,
}

impl EditPipeline {
    /// Create pipeline with default history size
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create pipeline keeping `limit` undoable edits
    #[must_use]
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            history: UndoHistory::new(limit),
            ..Self::default()
        }
    }

    /// Pre-check, apply and issue validation for an edit
    ///
    /// # Errors
    /// The pre-check rejection; state is untouched
    pub fn submit(
        &mut self,
        mutation: Mutation,
        schedule: &mut LiveSchedule,
        context: &mut SchedulingContext,
    ) -> Result<PendingValidation, EditError> {
        mutation.precheck(schedule, context)?;
        let inverse = mutation.clone().apply(schedule, context)?;
        self.history.record(inverse);
        tracing::debug!("Applied {:?} optimistically", mutation);
        Ok(self.issue(mutation, schedule))
    }

    /// Undo the latest edit; its pending validation is abandoned
    ///
    /// # Errors
    /// [`EditError::NothingToUndo`] on empty history
    pub fn undo(
        &mut self,
        schedule: &mut LiveSchedule,
        context: &mut SchedulingContext,
    ) -> Result<PendingValidation, EditError> {
        let inverse = self.history.pop_undo().ok_or(EditError::NothingToUndo)?;
        let mutation = inverse.as_mutation();
        let redo = inverse.apply(schedule, context);
        self.history.push_redo(redo);
        Ok(self.issue(mutation, schedule))
    }

    /// Redo the latest undone edit
    ///
    /// # Errors
    /// [`EditError::NothingToRedo`] on empty redo stack
    pub fn redo(
        &mut self,
        schedule: &mut LiveSchedule,
        context: &mut SchedulingContext,
    ) -> Result<PendingValidation, EditError> {
        let inverse = self.history.pop_redo().ok_or(EditError::NothingToRedo)?;
        let mutation = inverse.as_mutation();
        let undo = inverse.apply(schedule, context);
        self.history.push_undo(undo);
        Ok(self.issue(mutation, schedule))
    }

    fn issue(&mut self, mutation: Mutation, schedule: &LiveSchedule) -> PendingValidation {
        let class = mutation.class();
        let token = CancellationToken::new();
        let generation = match self.classes.get_mut(&class) {
            Some(state) => {
                state.token.cancel();
                state.generation += 1;
                state.token = token.clone();
                state.generation
            }
            None => {
                self.classes.insert(
                    class,
                    ClassState {
                        generation: 1,
                        token: token.clone(),
                    },
                );
                1
            }
        };

        PendingValidation {
            class,
            generation,
            token,
            schedule: schedule.clone(),
            mutation,
        }
    }

    /// Accept a validation report
    pub fn on_report(&mut self, report: ValidationReport) -> ValidationOutcome {
        let current = self.classes.get(&report.class);
        if current.map_or(true, |s| s.generation != report.generation) {
            tracing::debug!(
                "Dropping stale validation {:?}#{}",
                report.class,
                report.generation
            );
            return ValidationOutcome::Stale;
        }

        match report.result {
            None => ValidationOutcome::Cancelled,
            Some(Err(e)) => {
                tracing::warn!("Validation failed: {}", e);
                ValidationOutcome::Failed(e)
            }
            Some(Ok(conflicts)) => {
                let count = conflicts.len();
                self.conflicts.insert(report.class, conflicts);
                ValidationOutcome::Applied { conflicts: count }
            }
        }
    }

    /// Conflicts from the latest validation of each class
    pub fn conflicts(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.values().flatten()
    }

    /// Latest generation issued for a class
    #[must_use]
    pub fn generation(&self, class: MutationClass) -> u64 {
        self.classes.get(&class).map_or(0, |s| s.generation)
    }

    /// Undoable edits
    #[inline]
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.history.undo_len()
    }

    /// Redoable edits
    #[inline]
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.history.redo_len()
    }

    /// Cancel everything in flight and forget history and conflicts.
    ///
    /// Generations keep counting up, so a report issued before the reset
    /// never matches an edit made after it.
    pub fn reset(&mut self) {
        for state in self.classes.values_mut() {
            state.token.cancel();
            state.generation += 1;
        }
        self.conflicts.clear();
        self.history.clear();
    }
}
