//! Asynchronous validation against the system of record
//!
//! Every issued validation carries the generation of its mutation class and a
//! [`CancellationToken`]. Issuing a newer edit of the same class cancels the
//! older token; a response is only applied when its generation is still the
//! latest one for its class.

use crate::error::ValidationError;
use crate::mutation::{Mutation, MutationClass};
use rota_core::{ItemId, LiveSchedule};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A conflict reported by the validation service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Item in conflict
    pub item: ItemId,
    /// Explanation for the user
    pub message: String,
}

/// Remote validation of an edit
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Validator: Send + Sync {
    /// Validate `mutation` as applied to `schedule`
    async fn validate(
        &self,
        schedule: LiveSchedule,
        mutation: Mutation,
    ) -> Result<Vec<Conflict>, ValidationError>;
}

/// A validation request ready to be sent
#[derive(Debug, Clone)]
pub struct PendingValidation {
    /// Class of the edit
    pub class: MutationClass,
    /// Generation within the class
    pub generation: u64,
    /// Cancelled when a newer edit of the class is issued
    pub token: CancellationToken,
    /// Schedule after the edit
    pub schedule: LiveSchedule,
    /// The edit itself
    pub mutation: Mutation,
}

/// Response of a validation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// Class of the edit
    pub class: MutationClass,
    /// Generation within the class
    pub generation: u64,
    /// `None` when the request was cancelled before it returned
    pub result: Option<Result<Vec<Conflict>, ValidationError>>,
}

impl PendingValidation {
    /// Call the validator, giving up as soon as the token is cancelled
    pub async fn run(self, validator: Arc<dyn Validator>) -> ValidationReport {
        let Self {
            class,
            generation,
            token,
            schedule,
            mutation,
        } = self;

        let result = tokio::select! {
            biased;
            () = token.cancelled() => None,
            r = validator.validate(schedule, mutation) => Some(r),
        };
        if result.is_none() {
            tracing::debug!("Validation {:?}#{} cancelled", class, generation);
        }
        ValidationReport {
            class,
            generation,
            result,
        }
    }
}
