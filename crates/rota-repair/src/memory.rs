//! In-memory system of record
//!
//! Backs the simulator and tests. Both types are cheap to clone behind an
//! `Arc` and safe to share between tasks.

use crate::collab::{RepairDisplay, RepairStore, ResourceToggles, StoredRepairs};
use crate::error::StoreError;
use dashmap::DashMap;
use parking_lot::Mutex;
use rota_core::{AvailabilityRequestId, DatasetId, TimeSlot};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Repair token lists keyed by dataset
#[derive(Debug, Default)]
pub struct InMemoryRepairStore {
    repairs: DashMap<DatasetId, StoredRepairs>,
    writes: AtomicUsize,
}

impl InMemoryRepairStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a dataset's token list
    #[must_use]
    pub fn with_tokens(self, dataset: DatasetId, tokens: Vec<String>) -> Self {
        self.repairs.insert(
            dataset,
            StoredRepairs {
                tokens,
                display: RepairDisplay::default(),
            },
        );
        self
    }

    /// Stored tokens (empty when nothing is stored)
    #[must_use]
    pub fn tokens(&self, dataset: &DatasetId) -> Vec<String> {
        self.repairs
            .get(dataset)
            .map(|r| r.value().tokens.clone())
            .unwrap_or_default()
    }

    /// Number of save and clear calls so far
    #[inline]
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RepairStore for InMemoryRepairStore {
    async fn save_repairs(
        &self,
        dataset: &DatasetId,
        tokens: &[String],
        display: &RepairDisplay,
    ) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.repairs.insert(
            dataset.clone(),
            StoredRepairs {
                tokens: tokens.to_vec(),
                display: display.clone(),
            },
        );
        Ok(())
    }

    async fn clear_repairs(&self, dataset: &DatasetId) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.repairs.remove(dataset);
        Ok(())
    }

    async fn get_repairs(&self, dataset: &DatasetId) -> Result<StoredRepairs, StoreError> {
        Ok(self
            .repairs
            .get(dataset)
            .map(|r| r.value().clone())
            .unwrap_or_default())
    }
}

/// Resource state of one dataset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToggleState {
    /// Enabled rooms
    pub enabled_rooms: BTreeSet<String>,
    /// Rooms taken from the pool
    pub pool_rooms: BTreeSet<String>,
    /// Unavailability records
    pub unavailable: BTreeSet<(String, TimeSlot)>,
    /// Open availability requests
    pub requests: HashMap<AvailabilityRequestId, (String, TimeSlot)>,
}

/// Resource switches keyed by dataset
#[derive(Debug, Default)]
pub struct InMemoryToggles {
    state: Mutex<HashMap<DatasetId, ToggleState>>,
    calls: AtomicUsize,
}

impl InMemoryToggles {
    /// Create empty toggles
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a dataset
    #[must_use]
    pub fn with_state(self, dataset: DatasetId, state: ToggleState) -> Self {
        self.state.lock().insert(dataset, state);
        self
    }

    /// Copy of a dataset's state
    #[must_use]
    pub fn state(&self, dataset: &DatasetId) -> ToggleState {
        self.state.lock().get(dataset).cloned().unwrap_or_default()
    }

    /// Number of calls so far
    #[inline]
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn update<R>(&self, dataset: &DatasetId, f: impl FnOnce(&mut ToggleState) -> R) -> R {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut guard = self.state.lock();
        f(guard.entry(dataset.clone()).or_default())
    }
}

#[async_trait::async_trait]
impl ResourceToggles for InMemoryToggles {
    async fn enable_room(&self, dataset: &DatasetId, room: &str) -> Result<(), StoreError> {
        self.update(dataset, |s| s.enabled_rooms.insert(room.to_string()));
        Ok(())
    }

    async fn disable_room(&self, dataset: &DatasetId, room: &str) -> Result<(), StoreError> {
        self.update(dataset, |s| s.enabled_rooms.remove(room));
        Ok(())
    }

    async fn add_pool_room(&self, dataset: &DatasetId, room: &str) -> Result<(), StoreError> {
        self.update(dataset, |s| s.pool_rooms.insert(room.to_string()));
        Ok(())
    }

    async fn remove_pool_room(&self, dataset: &DatasetId, room: &str) -> Result<(), StoreError> {
        self.update(dataset, |s| s.pool_rooms.remove(room));
        Ok(())
    }

    async fn add_person_unavailable(
        &self,
        dataset: &DatasetId,
        person: &str,
        slot: &TimeSlot,
    ) -> Result<(), StoreError> {
        self.update(dataset, |s| s.unavailable.insert((person.to_string(), *slot)));
        Ok(())
    }

    async fn remove_person_unavailable(
        &self,
        dataset: &DatasetId,
        person: &str,
        slot: &TimeSlot,
    ) -> Result<(), StoreError> {
        self.update(dataset, |s| s.unavailable.remove(&(person.to_string(), *slot)));
        Ok(())
    }

    async fn create_availability_request(
        &self,
        dataset: &DatasetId,
        person: &str,
        slot: &TimeSlot,
    ) -> Result<AvailabilityRequestId, StoreError> {
        let id = AvailabilityRequestId::new();
        self.update(dataset, |s| s.requests.insert(id, (person.to_string(), *slot)));
        Ok(id)
    }

    async fn delete_availability_request(
        &self,
        dataset: &DatasetId,
        request: AvailabilityRequestId,
    ) -> Result<(), StoreError> {
        self.update(dataset, |s| s.requests.remove(&request))
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("availability request {request}")))
    }
}
