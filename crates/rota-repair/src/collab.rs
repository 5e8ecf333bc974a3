//! Contracts with the system of record
//!
//! Both traits are called from the staging engine only. Every call is a
//! discrete, idempotent request; the engine never batches toggles.

use crate::effects::SideEffect;
use crate::error::StoreError;
use crate::proposal::{ProposalKind, ProposalStatus};
use rota_core::{AvailabilityRequestId, DatasetId, TimeSlot};
use serde::{Deserialize, Serialize};

/// Display metadata for one stored token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayEntry {
    /// Raw token
    pub token: String,
    /// Human-readable label
    pub label: String,
    /// Proposal kind
    pub kind: ProposalKind,
    /// Proposal status when written
    pub status: ProposalStatus,
    /// Store effects the token caused; absent in lists written without them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Vec<SideEffect>>,
}

/// Display metadata stored alongside the token list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairDisplay {
    /// One entry per token, in token order
    pub entries: Vec<DisplayEntry>,
}

/// Repair list as read back from the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRepairs {
    /// Raw tokens
    pub tokens: Vec<String>,
    /// Display metadata
    #[serde(default)]
    pub display: RepairDisplay,
}

/// Persistent repair token list per dataset
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RepairStore: Send + Sync {
    /// Replace the stored token list in one write
    async fn save_repairs(
        &self,
        dataset: &DatasetId,
        tokens: &[String],
        display: &RepairDisplay,
    ) -> Result<(), StoreError>;

    /// Remove every stored repair
    async fn clear_repairs(&self, dataset: &DatasetId) -> Result<(), StoreError>;

    /// Read the stored token list
    async fn get_repairs(&self, dataset: &DatasetId) -> Result<StoredRepairs, StoreError>;
}

/// Resource switches in the system of record
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ResourceToggles: Send + Sync {
    /// Mark a room usable
    async fn enable_room(&self, dataset: &DatasetId, room: &str) -> Result<(), StoreError>;

    /// Mark a room unusable
    async fn disable_room(&self, dataset: &DatasetId, room: &str) -> Result<(), StoreError>;

    /// Take a room from the shared pool
    async fn add_pool_room(&self, dataset: &DatasetId, room: &str) -> Result<(), StoreError>;

    /// Return a room to the shared pool
    async fn remove_pool_room(&self, dataset: &DatasetId, room: &str) -> Result<(), StoreError>;

    /// Record that a person cannot attend a slot
    async fn add_person_unavailable(
        &self,
        dataset: &DatasetId,
        person: &str,
        slot: &TimeSlot,
    ) -> Result<(), StoreError>;

    /// Drop a person's unavailability record for a slot
    async fn remove_person_unavailable(
        &self,
        dataset: &DatasetId,
        person: &str,
        slot: &TimeSlot,
    ) -> Result<(), StoreError>;

    /// Ask a person to become available for a slot
    async fn create_availability_request(
        &self,
        dataset: &DatasetId,
        person: &str,
        slot: &TimeSlot,
    ) -> Result<AvailabilityRequestId, StoreError>;

    /// Withdraw an availability request
    async fn delete_availability_request(
        &self,
        dataset: &DatasetId,
        request: AvailabilityRequestId,
    ) -> Result<(), StoreError>;
}
